//! Secret scope ACLs

use crate::error::{PermissionError, Result};
use crate::support::{
    noop_task, target_principal, ApplyTask, CrawlTask, PermissionSupport, Permissions,
};
use regroup_framework::{retried, Hardened, RetryConfig};
use regroup_groups::{Destination, GroupMigrationState};
use regroup_sdk::{AclItem, AclPermission, SecretsApi};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Object type of secret scope rows
pub const SECRETS: &str = "secrets";

/// Support for secret scope ACLs
pub struct SecretScopesSupport {
    api: Arc<dyn SecretsApi>,
    retry: RetryConfig,
    updates: Hardened,
}

impl fmt::Debug for SecretScopesSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretScopesSupport").finish_non_exhaustive()
    }
}

impl SecretScopesSupport {
    /// Support writing ACLs through `updates`
    #[must_use]
    pub fn new(api: Arc<dyn SecretsApi>, retry: RetryConfig, updates: Hardened) -> Self {
        Self { api, retry, updates }
    }
}

fn put_and_verify(
    api: &dyn SecretsApi,
    scope: &str,
    principal: &str,
    permission: AclPermission,
) -> Result<()> {
    api.put_acl(scope, principal, permission)?;
    let granted = api
        .list_acls(scope)?
        .iter()
        .any(|item| item.principal == principal && item.permission == permission);
    if granted {
        Ok(())
    } else {
        Err(PermissionError::NotApplied {
            object_type: SECRETS.to_string(),
            object_id: scope.to_string(),
            principal: principal.to_string(),
        })
    }
}

impl PermissionSupport for SecretScopesSupport {
    fn object_types(&self) -> Vec<String> {
        vec![SECRETS.to_string()]
    }

    fn crawler_tasks(&self) -> Result<Vec<CrawlTask>> {
        let scopes = retried(&self.retry, "list secret scopes", || self.api.list_scopes())?;
        Ok(scopes
            .into_iter()
            .map(|scope| {
                let api = Arc::clone(&self.api);
                let retry = self.retry.clone();
                CrawlTask::new(SECRETS, scope.name.clone(), move || {
                    match retried(&retry, "list secret acls", || api.list_acls(&scope.name)) {
                        Ok(acls) => Permissions::encode(SECRETS, &scope.name, &acls).map(Some),
                        Err(e) if e.is_not_found() => Ok(None),
                        Err(e) => Err(e.into()),
                    }
                })
            })
            .collect())
    }

    fn load_as_dict(&self, _object_type: &str, object_id: &str) -> Result<BTreeMap<String, String>> {
        let acls = retried(&self.retry, "list secret acls", || self.api.list_acls(object_id))?;
        Ok(acls
            .into_iter()
            .map(|item| (item.principal, item.permission.as_str().to_string()))
            .collect())
    }

    fn is_item_relevant(&self, item: &Permissions, state: &GroupMigrationState) -> Result<bool> {
        let acls: Vec<AclItem> = item.decode()?;
        Ok(acls.iter().any(|a| state.is_workspace_group_name(&a.principal)))
    }

    fn build_apply_task(
        &self,
        item: &Permissions,
        state: &GroupMigrationState,
        destination: Destination,
    ) -> Result<ApplyTask> {
        let acls: Vec<AclItem> = item.decode()?;
        let mut grants = Vec::new();
        for acl in acls.iter().filter(|a| state.is_workspace_group_name(&a.principal)) {
            let target = target_principal(state, &acl.principal, destination)?;
            grants.push(AclItem::new(target, acl.permission));
        }
        if grants.is_empty() {
            return Ok(noop_task());
        }

        let api = Arc::clone(&self.api);
        let updates = self.updates.clone();
        let scope = item.object_id.clone();
        Ok(Box::new(move || {
            for grant in &grants {
                updates.call("put secret acl", || {
                    put_and_verify(api.as_ref(), &scope, &grant.principal, grant.permission)
                })?;
            }
            debug!(%scope, grants = grants.len(), "applied secret scope acls");
            Ok(Some(()))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use regroup_framework::RateLimiter;
    use regroup_groups::MigrationGroupInfo;
    use regroup_test_utils::FakeWorkspace;

    #[test]
    fn scope_acl_is_copied_to_destination() {
        let ws = Arc::new(FakeWorkspace::new());
        let workspace = ws.add_workspace_group("data-eng", Vec::new());
        let account = ws.add_account_group("data-eng", Vec::new());
        let backup = ws.add_workspace_group("db-temp-data-eng", Vec::new());
        ws.add_scope(
            "etl",
            vec![
                AclItem::new("data-eng", AclPermission::Write),
                AclItem::new("someone@example.com", AclPermission::Manage),
            ],
        );
        ws.add_scope("unrelated", vec![AclItem::new("ops", AclPermission::Read)]);

        let mut state = GroupMigrationState::new();
        state
            .add(MigrationGroupInfo {
                workspace,
                backup,
                account,
            })
            .unwrap();
        let support = SecretScopesSupport::new(
            Arc::clone(&ws) as Arc<dyn SecretsApi>,
            RetryConfig::fast(3),
            Hardened::new(RetryConfig::fast(3), RateLimiter::new("permissions", 30)),
        );

        let items: Vec<Permissions> = support
            .crawler_tasks()
            .unwrap()
            .into_iter()
            .filter_map(|task| task.run().unwrap())
            .collect();
        assert_eq!(items.len(), 2);
        let relevant: Vec<_> = items
            .iter()
            .filter(|item| support.is_item_relevant(item, &state).unwrap())
            .collect();
        assert_eq!(relevant.len(), 1);

        support
            .get_apply_task(relevant[0], &state, Destination::Backup)
            .unwrap()()
        .unwrap();

        assert_eq!(ws.scope_acl("etl", "db-temp-data-eng"), Some(AclPermission::Write));
        let dict = support.load_as_dict(SECRETS, "etl").unwrap();
        assert_eq!(dict.get("data-eng").map(String::as_str), Some("WRITE"));
    }
}
