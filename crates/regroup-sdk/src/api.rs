//! Blocking collaborator traits
//!
//! Every call blocks the calling worker thread until the platform answers or
//! the transport gives up. Implementations must be shareable across the
//! worker pool.

use crate::acl::{AccessControlRequest, ObjectPermissions};
use crate::error::ApiError;
use crate::grants::{Grant, Securable};
use crate::iam::{CreateGroup, Group, PatchOp, WorkspacePermission};
use crate::secrets::{AclItem, AclPermission, SecretScope};

/// SCIM group operations
pub trait GroupsApi: Send + Sync {
    /// Groups visible from the workspace, with the requested attributes
    fn list(&self, attributes: &str) -> Result<Vec<Group>, ApiError>;

    /// Account-level groups, including ones not yet bound to this workspace
    fn list_account(&self, attributes: &str) -> Result<Vec<Group>, ApiError>;

    /// Fetch one group
    fn get(&self, id: &str) -> Result<Group, ApiError>;

    /// Create a workspace group
    fn create(&self, request: &CreateGroup) -> Result<Group, ApiError>;

    /// Delete a workspace group
    fn delete(&self, id: &str) -> Result<(), ApiError>;

    /// Patch attributes of a group
    fn patch(&self, id: &str, operations: &[PatchOp]) -> Result<(), ApiError>;
}

/// Workspace permission assignments
pub trait PermissionAssignmentsApi: Send + Sync {
    /// Bind `principal_id` into the current workspace; idempotent
    fn assign(
        &self,
        principal_id: &str,
        permissions: &[WorkspacePermission],
    ) -> Result<(), ApiError>;
}

/// Generic object permissions endpoint
pub trait ObjectPermissionsApi: Send + Sync {
    /// Read the ACL of an object
    fn get(&self, object_type: &str, object_id: &str) -> Result<ObjectPermissions, ApiError>;

    /// Merge `acl` into the object's ACL and return the resulting ACL
    fn update(
        &self,
        object_type: &str,
        object_id: &str,
        acl: &[AccessControlRequest],
    ) -> Result<ObjectPermissions, ApiError>;
}

/// Secret scope ACLs
pub trait SecretsApi: Send + Sync {
    /// All scopes in the workspace
    fn list_scopes(&self) -> Result<Vec<SecretScope>, ApiError>;

    /// ACL of a scope
    fn list_acls(&self, scope: &str) -> Result<Vec<AclItem>, ApiError>;

    /// Create or overwrite the entry for `principal`
    fn put_acl(
        &self,
        scope: &str,
        principal: &str,
        permission: AclPermission,
    ) -> Result<(), ApiError>;
}

/// Table ACL grants
pub trait GrantsApi: Send + Sync {
    /// Every securable that carries grants
    fn list_securables(&self) -> Result<Vec<Securable>, ApiError>;

    /// Grants on one securable
    fn grants(&self, securable: &Securable) -> Result<Vec<Grant>, ApiError>;

    /// `GRANT action_type ON securable TO principal`
    fn grant(&self, securable: &Securable, principal: &str, action_type: &str)
        -> Result<(), ApiError>;
}
