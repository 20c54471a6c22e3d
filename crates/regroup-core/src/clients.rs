//! Platform collaborators and the default permission support set

use regroup_framework::{Hardened, MigrationConfig, RateLimiter};
use regroup_permissions::{
    EntitlementsSupport, GenericPermissionsSupport, Listing, SecretScopesSupport,
    SupportRegistry, TableGrantsSupport,
};
use regroup_sdk::{
    GrantsApi, GroupsApi, ObjectPermissionsApi, PermissionAssignmentsApi, SecretsApi,
};
use std::fmt;
use std::sync::Arc;

/// Everything the workflow talks to
#[derive(Clone)]
pub struct WorkspaceClients {
    /// SCIM groups at both levels
    pub groups: Arc<dyn GroupsApi>,
    /// Workspace permission assignments
    pub assignments: Arc<dyn PermissionAssignmentsApi>,
    /// Generic object permissions endpoint
    pub object_permissions: Arc<dyn ObjectPermissionsApi>,
    /// Secret scope ACLs
    pub secrets: Arc<dyn SecretsApi>,
    /// Table ACL grants
    pub grants: Arc<dyn GrantsApi>,
    /// Object listings crawled through `object_permissions`
    pub listings: Vec<Listing>,
}

impl fmt::Debug for WorkspaceClients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceClients")
            .field("listings", &self.listings)
            .finish_non_exhaustive()
    }
}

impl WorkspaceClients {
    /// Clients all served by `workspace`
    pub fn from_workspace<W>(workspace: &Arc<W>) -> Self
    where
        W: GroupsApi
            + PermissionAssignmentsApi
            + ObjectPermissionsApi
            + SecretsApi
            + GrantsApi
            + 'static,
    {
        Self {
            groups: Arc::clone(workspace) as Arc<dyn GroupsApi>,
            assignments: Arc::clone(workspace) as Arc<dyn PermissionAssignmentsApi>,
            object_permissions: Arc::clone(workspace) as Arc<dyn ObjectPermissionsApi>,
            secrets: Arc::clone(workspace) as Arc<dyn SecretsApi>,
            grants: Arc::clone(workspace) as Arc<dyn GrantsApi>,
            listings: Vec::new(),
        }
    }

    /// With an object listing for the generic permissions support
    #[inline]
    #[must_use]
    pub fn with_listing(mut self, listing: Listing) -> Self {
        self.listings.push(listing);
        self
    }

    /// Generic, secret scope, table grant and entitlement supports
    ///
    /// All of them share one in-flight gate for ACL updates.
    ///
    /// # Errors
    /// Two listings name the same object type.
    pub fn default_registry(
        &self,
        config: &MigrationConfig,
    ) -> regroup_permissions::Result<SupportRegistry> {
        let retry = config.retry.to_retry_config();
        let updates = Hardened::new(
            retry.clone(),
            RateLimiter::new("permissions", config.rate_limits.permissions),
        );
        SupportRegistry::new()
            .with(Arc::new(GenericPermissionsSupport::new(
                Arc::clone(&self.object_permissions),
                self.listings.clone(),
                retry.clone(),
                updates.clone(),
            )))?
            .with(Arc::new(SecretScopesSupport::new(
                Arc::clone(&self.secrets),
                retry.clone(),
                updates.clone(),
            )))?
            .with(Arc::new(TableGrantsSupport::new(
                Arc::clone(&self.grants),
                retry.clone(),
                updates.clone(),
            )))?
            .with(Arc::new(EntitlementsSupport::new(
                Arc::clone(&self.groups),
                retry,
                updates,
            )))
    }
}
