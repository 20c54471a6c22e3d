//! Table ACL grants
//!
//! Rows use the securable kind as object type (`TABLE`, `DATABASE`, ...) and
//! the securable key as object id.

use crate::error::{PermissionError, Result};
use crate::support::{
    noop_task, target_principal, ApplyTask, CrawlTask, PermissionSupport, Permissions,
};
use regroup_framework::{retried, Hardened, RetryConfig};
use regroup_groups::{Destination, GroupMigrationState};
use regroup_sdk::{Grant, GrantsApi, Securable, SecurableKind};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Support for table ACL grants
pub struct TableGrantsSupport {
    api: Arc<dyn GrantsApi>,
    retry: RetryConfig,
    updates: Hardened,
}

impl fmt::Debug for TableGrantsSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableGrantsSupport").finish_non_exhaustive()
    }
}

impl TableGrantsSupport {
    /// Support issuing grants through `updates`
    #[must_use]
    pub fn new(api: Arc<dyn GrantsApi>, retry: RetryConfig, updates: Hardened) -> Self {
        Self { api, retry, updates }
    }
}

fn securable(object_type: &str, object_id: &str) -> Result<Securable> {
    SecurableKind::parse(object_type)
        .map(|kind| Securable::new(kind, object_id))
        .ok_or_else(|| PermissionError::UnknownObjectType(object_type.to_string()))
}

fn grant_and_verify(api: &dyn GrantsApi, securable: &Securable, grant: &Grant) -> Result<()> {
    api.grant(securable, &grant.principal, &grant.action_type)?;
    if api.grants(securable)?.contains(grant) {
        Ok(())
    } else {
        Err(PermissionError::NotApplied {
            object_type: securable.kind.to_string(),
            object_id: securable.key.clone(),
            principal: grant.principal.clone(),
        })
    }
}

impl PermissionSupport for TableGrantsSupport {
    fn object_types(&self) -> Vec<String> {
        SecurableKind::ALL
            .iter()
            .map(|kind| kind.as_str().to_string())
            .collect()
    }

    fn crawler_tasks(&self) -> Result<Vec<CrawlTask>> {
        let securables = retried(&self.retry, "list securables", || self.api.list_securables())?;
        Ok(securables
            .into_iter()
            .map(|securable| {
                let api = Arc::clone(&self.api);
                let retry = self.retry.clone();
                CrawlTask::new(
                    securable.kind.as_str(),
                    securable.key.clone(),
                    move || match retried(&retry, "list grants", || api.grants(&securable)) {
                        Ok(grants) => {
                            Permissions::encode(securable.kind.as_str(), &securable.key, &grants)
                                .map(Some)
                        }
                        Err(e) if e.is_not_found() => Ok(None),
                        Err(e) => Err(e.into()),
                    },
                )
            })
            .collect())
    }

    fn load_as_dict(&self, object_type: &str, object_id: &str) -> Result<BTreeMap<String, String>> {
        let securable = securable(object_type, object_id)?;
        let grants = retried(&self.retry, "list grants", || self.api.grants(&securable))?;
        Ok(grants
            .into_iter()
            .map(|grant| (grant.principal, grant.action_type))
            .collect())
    }

    fn is_item_relevant(&self, item: &Permissions, state: &GroupMigrationState) -> Result<bool> {
        let grants: Vec<Grant> = item.decode()?;
        Ok(grants.iter().any(|g| state.is_workspace_group_name(&g.principal)))
    }

    fn build_apply_task(
        &self,
        item: &Permissions,
        state: &GroupMigrationState,
        destination: Destination,
    ) -> Result<ApplyTask> {
        let securable = securable(&item.object_type, &item.object_id)?;
        let grants: Vec<Grant> = item.decode()?;
        let mut pending = Vec::new();
        for grant in grants.iter().filter(|g| state.is_workspace_group_name(&g.principal)) {
            let target = target_principal(state, &grant.principal, destination)?;
            pending.push(Grant::new(target, &grant.action_type));
        }
        if pending.is_empty() {
            return Ok(noop_task());
        }

        let api = Arc::clone(&self.api);
        let updates = self.updates.clone();
        Ok(Box::new(move || {
            for grant in &pending {
                updates.call("grant privilege", || {
                    grant_and_verify(api.as_ref(), &securable, grant)
                })?;
            }
            debug!(%securable, grants = pending.len(), "applied table grants");
            Ok(Some(()))
        }))
    }
}
