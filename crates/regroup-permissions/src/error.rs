//! Error types for permission crawling and application

use regroup_framework::{InventoryError, Transient};
use regroup_groups::Destination;
use regroup_sdk::ApiError;
use thiserror::Error;

/// Errors raised by permission supports and the manager
#[derive(Debug, Error)]
pub enum PermissionError {
    /// Remote call failed
    #[error("platform error: {0}")]
    Api(#[from] ApiError),

    /// Inventory read or write failed
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Snapshot payload could not be encoded or decoded
    #[error("invalid {object_type} payload: {source}")]
    Payload {
        /// Object type of the payload
        object_type: String,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// Two supports claim the same object type
    #[error("object type {0} is already registered")]
    DuplicateObjectType(String),

    /// No support handles an object type
    #[error("no permission support for object type {0}")]
    UnknownObjectType(String),

    /// Migration state has no target for a group
    #[error("no {destination} principal for group {group}")]
    MissingTarget {
        /// Workspace group name
        group: String,
        /// Requested destination
        destination: Destination,
    },

    /// Applied permission did not show up on read-back
    #[error("{object_type} {object_id} does not grant {principal} yet")]
    NotApplied {
        /// Object type
        object_type: String,
        /// Object id
        object_id: String,
        /// Principal expected in the ACL
        principal: String,
    },
}

impl PermissionError {
    pub(crate) fn payload(object_type: &str, source: serde_json::Error) -> Self {
        Self::Payload {
            object_type: object_type.to_string(),
            source,
        }
    }
}

impl Transient for PermissionError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Api(e) => e.is_transient(),
            // eventual consistency on the permissions endpoints
            Self::NotApplied { .. } => true,
            _ => false,
        }
    }
}

/// Result alias for permission operations
pub type Result<T> = std::result::Result<T, PermissionError>;
