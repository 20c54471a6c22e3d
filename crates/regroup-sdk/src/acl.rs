//! Object access-control lists
//!
//! The platform answers permission reads with one [`AccessControlResponse`]
//! per principal, each listing every level that principal holds. Writes take a
//! flat list of [`AccessControlRequest`]s, one per (principal, level).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Permission level on a platform object
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionLevel {
    CanAttachTo,
    CanBind,
    CanEdit,
    CanEditMetadata,
    CanManage,
    CanManageProductionVersions,
    CanManageRun,
    CanManageStagingVersions,
    CanQuery,
    CanRead,
    CanRestart,
    CanRun,
    CanUse,
    CanView,
    CanViewMetadata,
    IsOwner,
}

impl PermissionLevel {
    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CanAttachTo => "CAN_ATTACH_TO",
            Self::CanBind => "CAN_BIND",
            Self::CanEdit => "CAN_EDIT",
            Self::CanEditMetadata => "CAN_EDIT_METADATA",
            Self::CanManage => "CAN_MANAGE",
            Self::CanManageProductionVersions => "CAN_MANAGE_PRODUCTION_VERSIONS",
            Self::CanManageRun => "CAN_MANAGE_RUN",
            Self::CanManageStagingVersions => "CAN_MANAGE_STAGING_VERSIONS",
            Self::CanQuery => "CAN_QUERY",
            Self::CanRead => "CAN_READ",
            Self::CanRestart => "CAN_RESTART",
            Self::CanRun => "CAN_RUN",
            Self::CanUse => "CAN_USE",
            Self::CanView => "CAN_VIEW",
            Self::CanViewMetadata => "CAN_VIEW_METADATA",
            Self::IsOwner => "IS_OWNER",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Principal an ACL entry refers to, keyed the way the wire format keys it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Principal {
    /// A user, by user name
    #[serde(rename = "user_name")]
    User(String),
    /// A group, by display name
    #[serde(rename = "group_name")]
    Group(String),
    /// A service principal, by application name
    #[serde(rename = "service_principal_name")]
    ServicePrincipal(String),
}

impl Principal {
    /// Name regardless of principal kind
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::User(name) | Self::Group(name) | Self::ServicePrincipal(name) => name,
        }
    }

    /// Group name, if this is a group principal
    #[inline]
    #[must_use]
    pub fn group_name(&self) -> Option<&str> {
        match self {
            Self::Group(name) => Some(name),
            _ => None,
        }
    }
}

/// One granted level, possibly inherited from a parent object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Granted level
    pub permission_level: PermissionLevel,
    /// Whether the level comes from a parent object
    #[serde(default)]
    pub inherited: bool,
    /// Parent objects the level is inherited from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inherited_from_object: Vec<String>,
}

impl Permission {
    /// Directly granted level
    #[inline]
    #[must_use]
    pub fn direct(permission_level: PermissionLevel) -> Self {
        Self {
            permission_level,
            inherited: false,
            inherited_from_object: Vec::new(),
        }
    }

    /// Level inherited from `parent`
    #[must_use]
    pub fn inherited_from(permission_level: PermissionLevel, parent: impl Into<String>) -> Self {
        Self {
            permission_level,
            inherited: true,
            inherited_from_object: vec![parent.into()],
        }
    }
}

/// Per-principal ACL entry as read from the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlResponse {
    /// Principal the entry belongs to
    #[serde(flatten)]
    pub principal: Principal,
    /// Every level the principal holds
    #[serde(default)]
    pub all_permissions: Vec<Permission>,
}

impl AccessControlResponse {
    /// Entry for `principal` with `permissions`
    #[must_use]
    pub fn new(principal: Principal, all_permissions: Vec<Permission>) -> Self {
        Self {
            principal,
            all_permissions,
        }
    }
}

/// Single (principal, level) pair as written to the platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessControlRequest {
    /// Principal to grant
    #[serde(flatten)]
    pub principal: Principal,
    /// Level to grant
    pub permission_level: PermissionLevel,
}

impl AccessControlRequest {
    /// Request granting `level` to `principal`
    #[inline]
    #[must_use]
    pub fn new(principal: Principal, permission_level: PermissionLevel) -> Self {
        Self {
            principal,
            permission_level,
        }
    }

    /// Request granting `level` to the group `name`
    #[inline]
    #[must_use]
    pub fn group(name: impl Into<String>, permission_level: PermissionLevel) -> Self {
        Self::new(Principal::Group(name.into()), permission_level)
    }
}

/// Full ACL of one object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectPermissions {
    /// Object id
    #[serde(default)]
    pub object_id: String,
    /// Object type as named by the permissions endpoint
    #[serde(default)]
    pub object_type: String,
    /// Per-principal entries
    #[serde(default)]
    pub access_control_list: Vec<AccessControlResponse>,
}

impl ObjectPermissions {
    /// Group names mentioned anywhere in the ACL
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.access_control_list
            .iter()
            .filter_map(|entry| entry.principal.group_name())
    }

    /// Check if `principal` holds `level`
    #[must_use]
    pub fn grants(&self, principal: &Principal, level: PermissionLevel) -> bool {
        self.access_control_list.iter().any(|entry| {
            &entry.principal == principal
                && entry
                    .all_permissions
                    .iter()
                    .any(|p| p.permission_level == level)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn response_uses_flat_principal_keys() {
        let raw = r#"{
            "object_id": "/cluster-policies/ABC",
            "object_type": "cluster-policy",
            "access_control_list": [
                {"group_name": "data-eng", "all_permissions": [{"permission_level": "CAN_USE"}]},
                {"user_name": "ann@example.com", "all_permissions": [
                    {"permission_level": "CAN_MANAGE", "inherited": true, "inherited_from_object": ["/root"]}
                ]},
                {"service_principal_name": "sp1", "all_permissions": []}
            ]
        }"#;
        let acl: ObjectPermissions = serde_json::from_str(raw).unwrap();

        assert_eq!(acl.access_control_list.len(), 3);
        assert_eq!(
            acl.access_control_list[0].principal,
            Principal::Group("data-eng".into())
        );
        assert_eq!(
            acl.access_control_list[1].all_permissions[0],
            Permission::inherited_from(PermissionLevel::CanManage, "/root")
        );
        assert_eq!(
            acl.access_control_list[2].principal,
            Principal::ServicePrincipal("sp1".into())
        );
        assert_eq!(acl.group_names().collect::<Vec<_>>(), vec!["data-eng"]);
        assert!(acl.grants(&Principal::Group("data-eng".into()), PermissionLevel::CanUse));
    }

    #[test]
    fn request_serializes_flat() {
        let request = AccessControlRequest::group("db-temp-data-eng", PermissionLevel::CanUse);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"group_name": "db-temp-data-eng", "permission_level": "CAN_USE"})
        );
    }
}
