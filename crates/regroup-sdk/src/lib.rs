//! regroup SDK surface
//!
//! Models and blocking collaborator traits for the data-platform APIs that the
//! group migration consumes:
//! - SCIM groups at workspace and account level ([`GroupsApi`])
//! - Workspace permission assignments used to reflect account groups
//!   ([`PermissionAssignmentsApi`])
//! - Object access-control lists ([`ObjectPermissionsApi`])
//! - Secret scope ACLs ([`SecretsApi`]) and table grants ([`GrantsApi`])
//!
//! Transport, authentication and pagination live behind these traits; the
//! migration core never sees them.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod acl;
pub mod api;
pub mod error;
pub mod grants;
pub mod iam;
pub mod secrets;

pub use acl::{
    AccessControlRequest, AccessControlResponse, ObjectPermissions, Permission, PermissionLevel,
    Principal,
};
pub use api::{
    GrantsApi, GroupsApi, ObjectPermissionsApi, PermissionAssignmentsApi, SecretsApi,
};
pub use error::ApiError;
pub use grants::{Grant, Securable, SecurableKind};
pub use iam::{
    ComplexValue, CreateGroup, Group, GroupLevel, PatchOp, PatchOpKind, ResourceMeta,
    WorkspacePermission, SCIM_ATTRIBUTES, WORKSPACE_GROUP_RESOURCE_TYPE,
};
pub use secrets::{AclItem, AclPermission, SecretScope};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
