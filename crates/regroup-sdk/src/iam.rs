//! SCIM identity models
//!
//! Groups exist in two namespaces: workspace-level groups, scoped to a single
//! workspace, and account-level groups that become usable inside a workspace
//! once reflected into it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// SCIM attributes requested when listing groups
pub const SCIM_ATTRIBUTES: &str = "id,displayName,meta,members,entitlements,roles";

/// `meta.resourceType` carried by workspace-local groups
pub const WORKSPACE_GROUP_RESOURCE_TYPE: &str = "WorkspaceGroup";

/// Namespace a group lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupLevel {
    /// Scoped to the current workspace
    Workspace,
    /// Scoped to the whole account
    Account,
}

impl GroupLevel {
    /// Lowercase name used in logs
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::Account => "account",
        }
    }
}

impl fmt::Display for GroupLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SCIM resource metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    /// `WorkspaceGroup` for workspace-local groups, `Group` otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
}

impl ResourceMeta {
    /// Metadata for a workspace-local group
    #[inline]
    #[must_use]
    pub fn workspace_group() -> Self {
        Self {
            resource_type: Some(WORKSPACE_GROUP_RESOURCE_TYPE.to_string()),
        }
    }
}

/// SCIM multi-valued attribute entry (member, entitlement, role)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComplexValue {
    /// Human-readable label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    /// Referenced id or entitlement value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ComplexValue {
    /// Entry carrying only a value
    #[inline]
    #[must_use]
    pub fn value(value: impl Into<String>) -> Self {
        Self {
            display: None,
            value: Some(value.into()),
        }
    }

    /// Entry carrying a display label and a value
    #[inline]
    #[must_use]
    pub fn with_display(display: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            display: Some(display.into()),
            value: Some(value.into()),
        }
    }
}

/// Identity group as returned by SCIM
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Platform-assigned id
    pub id: String,
    /// Display name, unique within its namespace
    pub display_name: String,
    /// Resource metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResourceMeta>,
    /// Member references
    #[serde(default)]
    pub members: Vec<ComplexValue>,
    /// Workspace entitlements
    #[serde(default)]
    pub entitlements: Vec<ComplexValue>,
    /// Instance-profile roles
    #[serde(default)]
    pub roles: Vec<ComplexValue>,
}

impl Group {
    /// Group with id and name only
    #[must_use]
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            ..Self::default()
        }
    }

    /// Set resource metadata
    #[inline]
    #[must_use]
    pub fn with_meta(mut self, meta: ResourceMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Set members
    #[inline]
    #[must_use]
    pub fn with_members(mut self, members: Vec<ComplexValue>) -> Self {
        self.members = members;
        self
    }

    /// Set entitlements
    #[inline]
    #[must_use]
    pub fn with_entitlements(mut self, entitlements: Vec<ComplexValue>) -> Self {
        self.entitlements = entitlements;
        self
    }

    /// Set roles
    #[inline]
    #[must_use]
    pub fn with_roles(mut self, roles: Vec<ComplexValue>) -> Self {
        self.roles = roles;
        self
    }

    /// `meta.resourceType`, if present
    #[inline]
    #[must_use]
    pub fn resource_type(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|m| m.resource_type.as_deref())
    }

    /// Check if this is a workspace-local group
    #[inline]
    #[must_use]
    pub fn is_workspace_group(&self) -> bool {
        self.resource_type() == Some(WORKSPACE_GROUP_RESOURCE_TYPE)
    }

    /// Sorted member values, for membership comparisons
    #[must_use]
    pub fn member_values(&self) -> Vec<String> {
        let mut values: Vec<String> = self.members.iter().filter_map(|m| m.value.clone()).collect();
        values.sort();
        values
    }
}

/// Request body for creating a workspace group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroup {
    /// Name of the new group
    pub display_name: String,
    /// Metadata copied from the source group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResourceMeta>,
    /// Entitlements copied from the source group
    #[serde(default)]
    pub entitlements: Vec<ComplexValue>,
    /// Roles copied from the source group
    #[serde(default)]
    pub roles: Vec<ComplexValue>,
    /// Members copied from the source group
    #[serde(default)]
    pub members: Vec<ComplexValue>,
}

impl CreateGroup {
    /// Duplicate `source` under a new name
    #[must_use]
    pub fn copy_of(display_name: impl Into<String>, source: &Group) -> Self {
        Self {
            display_name: display_name.into(),
            meta: source.meta.clone(),
            entitlements: source.entitlements.clone(),
            roles: source.roles.clone(),
            members: source.members.clone(),
        }
    }
}

/// SCIM patch operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOpKind {
    /// Add values
    Add,
    /// Remove values
    Remove,
    /// Replace values
    Replace,
}

/// SCIM patch operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOp {
    /// Operation kind
    pub op: PatchOpKind,
    /// Attribute path, e.g. `entitlements`
    pub path: String,
    /// Values to apply
    pub value: Vec<ComplexValue>,
}

impl PatchOp {
    /// `add` operation on `path`
    #[must_use]
    pub fn add(path: impl Into<String>, value: Vec<ComplexValue>) -> Self {
        Self {
            op: PatchOpKind::Add,
            path: path.into(),
            value,
        }
    }
}

/// Permission set granted when binding a principal into a workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkspacePermission {
    /// Regular workspace access
    User,
    /// Workspace administration
    Admin,
}
