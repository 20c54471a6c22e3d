//! Per-object-type permission support
//!
//! A [`PermissionSupport`] knows how to list the objects of the types it
//! claims, fetch their ACLs for the inventory, decide whether a stored ACL
//! mentions a migrating group, and build the task that grants the same access
//! to a destination group.

use crate::error::{PermissionError, Result};
use regroup_framework::{SnapshotRow, Task};
use regroup_groups::{Destination, GroupMigrationState};
use regroup_sdk::{AccessControlRequest, AccessControlResponse};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stored ACL of one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    /// Object id within its type
    pub object_id: String,
    /// Object type name
    pub object_type: String,
    /// Serialized ACL in the support's own format
    pub raw: String,
}

impl Permissions {
    /// Wrap a serialized ACL
    #[must_use]
    pub fn new(
        object_type: impl Into<String>,
        object_id: impl Into<String>,
        raw: impl Into<String>,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            object_type: object_type.into(),
            raw: raw.into(),
        }
    }

    /// Serialize `acl` as the payload
    ///
    /// # Errors
    /// [`PermissionError::Payload`] if `acl` cannot be encoded.
    pub fn encode<T: Serialize>(
        object_type: impl Into<String>,
        object_id: impl Into<String>,
        acl: &T,
    ) -> Result<Self> {
        let object_type = object_type.into();
        let raw = serde_json::to_string(acl).map_err(|e| PermissionError::payload(&object_type, e))?;
        Ok(Self::new(object_type, object_id, raw))
    }

    /// Decode the payload
    ///
    /// # Errors
    /// [`PermissionError::Payload`] if the payload is not a `T`.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_str(&self.raw).map_err(|e| PermissionError::payload(&self.object_type, e))
    }

    /// Successful inventory row, if `row` is one
    #[must_use]
    pub fn from_row(row: &SnapshotRow) -> Option<Self> {
        row.success
            .then(|| Self::new(&row.object_type, &row.object_id, &row.payload))
    }

    /// Inventory row for this ACL
    #[must_use]
    pub fn to_row(&self) -> SnapshotRow {
        SnapshotRow::fetched(&self.object_type, &self.object_id, &self.raw)
    }
}

type FetchFn = Box<dyn FnOnce() -> Result<Option<Permissions>> + Send>;

/// Deferred fetch of one object's ACL
pub struct CrawlTask {
    object_type: String,
    object_id: String,
    fetch: FetchFn,
}

impl CrawlTask {
    /// Task fetching `object_type` `object_id` with `fetch`
    pub fn new<F>(object_type: impl Into<String>, object_id: impl Into<String>, fetch: F) -> Self
    where
        F: FnOnce() -> Result<Option<Permissions>> + Send + 'static,
    {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
            fetch: Box::new(fetch),
        }
    }

    /// Object type being fetched
    #[inline]
    #[must_use]
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Object id being fetched
    #[inline]
    #[must_use]
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// Fetch the ACL; `Ok(None)` if the object vanished since listing
    ///
    /// # Errors
    /// The fetch failed after retries.
    pub fn run(self) -> Result<Option<Permissions>> {
        (self.fetch)()
    }
}

impl fmt::Debug for CrawlTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlTask")
            .field("object_type", &self.object_type)
            .field("object_id", &self.object_id)
            .finish_non_exhaustive()
    }
}

/// Grants access to a destination group; `Ok(None)` if nothing was done
pub type ApplyTask = Task<(), PermissionError>;

/// Task that does nothing
#[must_use]
pub fn noop_task() -> ApplyTask {
    Box::new(|| Ok(None))
}

/// Capabilities of one family of object types
pub trait PermissionSupport: Send + Sync {
    /// Object type names this support handles
    fn object_types(&self) -> Vec<String>;

    /// One fetch task per listed object
    ///
    /// # Errors
    /// Listing the objects failed.
    fn crawler_tasks(&self) -> Result<Vec<CrawlTask>>;

    /// Current ACL as principal name to permission level
    ///
    /// A principal holding several levels maps to the last one listed.
    ///
    /// # Errors
    /// Fetching the ACL failed.
    fn load_as_dict(&self, object_type: &str, object_id: &str) -> Result<BTreeMap<String, String>>;

    /// Check if `item` grants anything to a migrating workspace group
    ///
    /// # Errors
    /// [`PermissionError::Payload`] if the stored payload is malformed.
    fn is_item_relevant(&self, item: &Permissions, state: &GroupMigrationState) -> Result<bool>;

    /// Task granting the `destination` groups what the workspace groups hold
    ///
    /// # Errors
    /// The payload is malformed or the state lacks a target.
    fn build_apply_task(
        &self,
        item: &Permissions,
        state: &GroupMigrationState,
        destination: Destination,
    ) -> Result<ApplyTask>;

    /// [`PermissionSupport::build_apply_task`], or a no-op for irrelevant items
    ///
    /// # Errors
    /// See [`PermissionSupport::build_apply_task`].
    fn get_apply_task(
        &self,
        item: &Permissions,
        state: &GroupMigrationState,
        destination: Destination,
    ) -> Result<ApplyTask> {
        if !self.is_item_relevant(item, state)? {
            return Ok(noop_task());
        }
        self.build_apply_task(item, state, destination)
    }
}

/// Flatten ACL responses into requests, one per granted level, in order
#[must_use]
pub fn response_to_request(acl: &[AccessControlResponse]) -> Vec<AccessControlRequest> {
    acl.iter()
        .flat_map(|entry| {
            entry
                .all_permissions
                .iter()
                .map(|permission| {
                    AccessControlRequest::new(entry.principal.clone(), permission.permission_level)
                })
        })
        .collect()
}

/// Target display name for `group` or a [`PermissionError::MissingTarget`]
pub(crate) fn target_principal<'a>(
    state: &'a GroupMigrationState,
    group: &str,
    destination: Destination,
) -> Result<&'a str> {
    state
        .get_target_principal(group, destination)
        .ok_or_else(|| PermissionError::MissingTarget {
            group: group.to_string(),
            destination,
        })
}
