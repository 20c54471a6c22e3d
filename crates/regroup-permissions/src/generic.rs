//! ACLs served by the generic object permissions endpoint

use crate::error::{PermissionError, Result};
use crate::support::{
    noop_task, target_principal, ApplyTask, CrawlTask, PermissionSupport, Permissions,
};
use regroup_framework::{retried, Hardened, RetryConfig};
use regroup_groups::{Destination, GroupMigrationState};
use regroup_sdk::{AccessControlRequest, ApiError, ObjectPermissions, ObjectPermissionsApi};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Object type names as the permissions endpoint spells them
pub mod object_types {
    #![allow(missing_docs)]

    pub const CLUSTER_POLICIES: &str = "cluster-policies";
    pub const CLUSTERS: &str = "clusters";
    pub const INSTANCE_POOLS: &str = "instance-pools";
    pub const JOBS: &str = "jobs";
    pub const PIPELINES: &str = "pipelines";
    pub const EXPERIMENTS: &str = "experiments";
    pub const REGISTERED_MODELS: &str = "registered-models";
    pub const SQL_WAREHOUSES: &str = "sql/warehouses";
    pub const TOKENS: &str = "authorization";
}

type ListFn = dyn Fn() -> std::result::Result<Vec<String>, ApiError> + Send + Sync;

/// Source of object ids for one object type
#[derive(Clone)]
pub struct Listing {
    object_type: String,
    list: Arc<ListFn>,
}

impl Listing {
    /// Listing of `object_type` ids produced by `list`
    pub fn new<F>(object_type: impl Into<String>, list: F) -> Self
    where
        F: Fn() -> std::result::Result<Vec<String>, ApiError> + Send + Sync + 'static,
    {
        Self {
            object_type: object_type.into(),
            list: Arc::new(list),
        }
    }

    /// Object type name
    #[inline]
    #[must_use]
    pub fn object_type(&self) -> &str {
        &self.object_type
    }
}

impl fmt::Debug for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listing")
            .field("object_type", &self.object_type)
            .finish_non_exhaustive()
    }
}

/// Support for every object type behind [`ObjectPermissionsApi`]
pub struct GenericPermissionsSupport {
    api: Arc<dyn ObjectPermissionsApi>,
    listings: Vec<Listing>,
    retry: RetryConfig,
    updates: Hardened,
}

impl fmt::Debug for GenericPermissionsSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericPermissionsSupport")
            .field("listings", &self.listings)
            .finish_non_exhaustive()
    }
}

impl GenericPermissionsSupport {
    /// Support over `listings`; ACL updates go through `updates`
    #[must_use]
    pub fn new(
        api: Arc<dyn ObjectPermissionsApi>,
        listings: Vec<Listing>,
        retry: RetryConfig,
        updates: Hardened,
    ) -> Self {
        Self {
            api,
            listings,
            retry,
            updates,
        }
    }
}

fn fetch(
    api: &dyn ObjectPermissionsApi,
    retry: &RetryConfig,
    object_type: &str,
    object_id: &str,
) -> Result<Option<Permissions>> {
    match retried(retry, "get permissions", || api.get(object_type, object_id)) {
        Ok(acl) => Permissions::encode(object_type, object_id, &acl).map(Some),
        Err(e) if e.is_not_found() => {
            debug!(object_type, object_id, "object vanished before its ACL was read");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Requests granting each migrating group's direct levels to its target
fn destination_requests(
    acl: &ObjectPermissions,
    state: &GroupMigrationState,
    destination: Destination,
) -> Result<Vec<AccessControlRequest>> {
    let mut requests = Vec::new();
    for entry in &acl.access_control_list {
        let Some(group) = entry.principal.group_name() else {
            continue;
        };
        if !state.is_workspace_group_name(group) {
            continue;
        }
        let target = target_principal(state, group, destination)?;
        for permission in entry.all_permissions.iter().filter(|p| !p.inherited) {
            requests.push(AccessControlRequest::group(target, permission.permission_level));
        }
    }
    Ok(requests)
}

impl PermissionSupport for GenericPermissionsSupport {
    fn object_types(&self) -> Vec<String> {
        self.listings
            .iter()
            .map(|listing| listing.object_type.clone())
            .collect()
    }

    fn crawler_tasks(&self) -> Result<Vec<CrawlTask>> {
        let mut tasks: Vec<CrawlTask> = Vec::new();
        for listing in &self.listings {
            let ids = retried(&self.retry, "list objects", || (listing.list)())?;
            debug!(object_type = %listing.object_type, count = ids.len(), "listed objects");
            for object_id in ids {
                let api = Arc::clone(&self.api);
                let retry = self.retry.clone();
                let object_type = listing.object_type.clone();
                tasks.push(CrawlTask::new(
                    object_type.clone(),
                    object_id.clone(),
                    move || fetch(api.as_ref(), &retry, &object_type, &object_id),
                ));
            }
        }
        Ok(tasks)
    }

    fn load_as_dict(&self, object_type: &str, object_id: &str) -> Result<BTreeMap<String, String>> {
        let acl = retried(&self.retry, "get permissions", || {
            self.api.get(object_type, object_id)
        })?;
        let mut levels = BTreeMap::new();
        for entry in &acl.access_control_list {
            for permission in &entry.all_permissions {
                levels.insert(
                    entry.principal.name().to_string(),
                    permission.permission_level.to_string(),
                );
            }
        }
        Ok(levels)
    }

    fn is_item_relevant(&self, item: &Permissions, state: &GroupMigrationState) -> Result<bool> {
        let acl: ObjectPermissions = item.decode()?;
        let relevant = acl.group_names().any(|name| state.is_workspace_group_name(name));
        Ok(relevant)
    }

    fn build_apply_task(
        &self,
        item: &Permissions,
        state: &GroupMigrationState,
        destination: Destination,
    ) -> Result<ApplyTask> {
        let acl: ObjectPermissions = item.decode()?;
        let requests = destination_requests(&acl, state, destination)?;
        if requests.is_empty() {
            return Ok(noop_task());
        }

        let api = Arc::clone(&self.api);
        let updates = self.updates.clone();
        let object_type = item.object_type.clone();
        let object_id = item.object_id.clone();
        Ok(Box::new(move || {
            updates.call("update permissions", || {
                let updated = api.update(&object_type, &object_id, &requests)?;
                verify(&updated, &object_type, &object_id, &requests)
            })?;
            debug!(%object_type, %object_id, requests = requests.len(), "applied permissions");
            Ok(Some(()))
        }))
    }
}

fn verify(
    updated: &ObjectPermissions,
    object_type: &str,
    object_id: &str,
    requests: &[AccessControlRequest],
) -> Result<()> {
    match requests
        .iter()
        .find(|r| !updated.grants(&r.principal, r.permission_level))
    {
        None => Ok(()),
        Some(missing) => Err(PermissionError::NotApplied {
            object_type: object_type.to_string(),
            object_id: object_id.to_string(),
            principal: missing.principal.name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use regroup_framework::RateLimiter;
    use regroup_groups::MigrationGroupInfo;
    use regroup_sdk::{AccessControlResponse, Group, Permission, PermissionLevel, Principal};
    use regroup_test_utils::{
        data_eng_workspace, group_entry, FakeWorkspace, Operation, CLUSTER_POLICIES,
    };

    fn support(ws: &Arc<FakeWorkspace>) -> GenericPermissionsSupport {
        let lister = Arc::clone(ws);
        GenericPermissionsSupport::new(
            Arc::clone(ws) as Arc<dyn ObjectPermissionsApi>,
            vec![Listing::new(CLUSTER_POLICIES, move || {
                Ok(lister.object_ids(CLUSTER_POLICIES))
            })],
            RetryConfig::fast(3),
            Hardened::new(RetryConfig::fast(3), RateLimiter::new("permissions", 30)),
        )
    }

    fn state_for(ws: &FakeWorkspace, name: &str) -> GroupMigrationState {
        let backup = ws.add_workspace_group(&format!("db-temp-{name}"), Vec::new());
        let mut state = GroupMigrationState::new();
        state
            .add(MigrationGroupInfo {
                workspace: ws.workspace_group_named(name).unwrap(),
                backup,
                account: ws.account_group_named(name).unwrap(),
            })
            .unwrap();
        state
    }

    fn crawl(support: &GenericPermissionsSupport) -> Vec<Permissions> {
        support
            .crawler_tasks()
            .unwrap()
            .into_iter()
            .filter_map(|task| task.run().unwrap())
            .collect()
    }

    #[test]
    fn crawl_reads_every_listed_object() {
        let ws = Arc::new(data_eng_workspace());
        ws.add_object(CLUSTER_POLICIES, "policy-2", vec![]);

        let items = crawl(&support(&ws));
        let ids: Vec<&str> = items.iter().map(|p| p.object_id.as_str()).collect();
        assert_eq!(ids, vec!["policy-1", "policy-2"]);
        assert_eq!(items[0].object_type, CLUSTER_POLICIES);
    }

    #[test]
    fn relevance_follows_group_principals() {
        let ws = Arc::new(data_eng_workspace());
        ws.add_object(
            CLUSTER_POLICIES,
            "policy-2",
            vec![group_entry("other", PermissionLevel::CanUse)],
        );
        let state = state_for(&ws, "data-eng");
        let support = support(&ws);

        let relevant: Vec<bool> = crawl(&support)
            .iter()
            .map(|item| support.is_item_relevant(item, &state).unwrap())
            .collect();
        assert_eq!(relevant, vec![true, false]);
        let garbled = Permissions::new(CLUSTER_POLICIES, "x", "not json");
        assert!(matches!(
            support.is_item_relevant(&garbled, &state),
            Err(PermissionError::Payload { .. })
        ));
    }

    #[test]
    fn apply_grants_the_backup_the_same_level() {
        let ws = Arc::new(data_eng_workspace());
        let state = state_for(&ws, "data-eng");
        let support = support(&ws);
        let item = crawl(&support).remove(0);

        let task = support.get_apply_task(&item, &state, Destination::Backup).unwrap();
        assert!(matches!(task(), Ok(Some(()))));

        let levels = support.load_as_dict(CLUSTER_POLICIES, "policy-1").unwrap();
        assert_eq!(levels.get("db-temp-data-eng").map(String::as_str), Some("CAN_USE"));
        assert_eq!(levels.get("data-eng").map(String::as_str), Some("CAN_USE"));
        assert_eq!(levels.get("owner@example.com").map(String::as_str), Some("CAN_MANAGE"));
    }

    #[test]
    fn inherited_levels_are_not_reapplied() {
        let ws = Arc::new(data_eng_workspace());
        ws.add_object(
            CLUSTER_POLICIES,
            "policy-1",
            vec![AccessControlResponse::new(
                Principal::Group("data-eng".into()),
                vec![
                    Permission::inherited_from(PermissionLevel::CanManage, "/directories/1"),
                    Permission::direct(PermissionLevel::CanUse),
                ],
            )],
        );
        let state = state_for(&ws, "data-eng");
        let support = support(&ws);
        let item = crawl(&support).remove(0);

        support.get_apply_task(&item, &state, Destination::Backup).unwrap()().unwrap();

        assert_eq!(
            ws.object_levels(CLUSTER_POLICIES, "policy-1", &Principal::Group("db-temp-data-eng".into())),
            vec!["CAN_USE".to_string()]
        );
    }

    #[test]
    fn vanished_objects_are_skipped() {
        let ws = Arc::new(data_eng_workspace());
        let support = support(&ws);
        let tasks = support.crawler_tasks().unwrap();
        ws.fail_next(Operation::GetPermissions, ApiError::NotFound("policy-1".into()));

        let fetched: Vec<_> = tasks.into_iter().map(|task| task.run().unwrap()).collect();
        assert_eq!(fetched, vec![None]);
    }

    #[test]
    fn unknown_target_principal_fails_the_task() {
        let ws = Arc::new(data_eng_workspace());
        let mut state = GroupMigrationState::new();
        state
            .add(MigrationGroupInfo {
                workspace: ws.workspace_group_named("data-eng").unwrap(),
                backup: Group::new("404", "db-temp-data-eng"),
                account: ws.account_group_named("data-eng").unwrap(),
            })
            .unwrap();
        let support = support(&ws);
        let item = crawl(&support).remove(0);

        let task = support.get_apply_task(&item, &state, Destination::Backup).unwrap();
        let err = task().unwrap_err();
        assert!(matches!(err, PermissionError::Api(ApiError::InvalidParameter(_))));
        assert_eq!(ws.calls(Operation::UpdatePermissions), 1);
    }
}
