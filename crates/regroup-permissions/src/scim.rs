//! Group entitlements and roles
//!
//! These live on the group itself rather than on an object ACL, so a row's
//! object id is the workspace group id and applying means patching the
//! destination group.

use crate::error::{PermissionError, Result};
use crate::support::{noop_task, ApplyTask, CrawlTask, PermissionSupport, Permissions};
use regroup_framework::{retried, Hardened, RetryConfig};
use regroup_groups::{is_system_group, Destination, GroupMigrationState, GroupRole};
use regroup_sdk::{ComplexValue, Group, GroupsApi, PatchOp, SCIM_ATTRIBUTES};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Object type of entitlement rows
pub const ENTITLEMENTS: &str = "entitlements";
/// Object type of role rows
pub const ROLES: &str = "roles";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ScimSnapshot {
    group_name: String,
    values: Vec<ComplexValue>,
}

fn values_of<'a>(group: &'a Group, object_type: &str) -> &'a [ComplexValue] {
    if object_type == ROLES {
        &group.roles
    } else {
        &group.entitlements
    }
}

/// Support copying entitlements and roles between groups
pub struct EntitlementsSupport {
    api: Arc<dyn GroupsApi>,
    retry: RetryConfig,
    updates: Hardened,
}

impl fmt::Debug for EntitlementsSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitlementsSupport").finish_non_exhaustive()
    }
}

impl EntitlementsSupport {
    /// Support patching groups through `updates`
    #[must_use]
    pub fn new(api: Arc<dyn GroupsApi>, retry: RetryConfig, updates: Hardened) -> Self {
        Self { api, retry, updates }
    }
}

fn snapshot(group: &Group, object_type: &str) -> Result<Option<Permissions>> {
    let values = values_of(group, object_type);
    if values.is_empty() {
        return Ok(None);
    }
    let snapshot = ScimSnapshot {
        group_name: group.display_name.clone(),
        values: values.to_vec(),
    };
    Permissions::encode(object_type, &group.id, &snapshot).map(Some)
}

fn patch_and_verify(
    api: &dyn GroupsApi,
    group_id: &str,
    object_type: &str,
    values: &[ComplexValue],
) -> Result<()> {
    api.patch(group_id, &[PatchOp::add(object_type, values.to_vec())])?;
    let group = api.get(group_id)?;
    let present = values_of(&group, object_type);
    match values
        .iter()
        .find(|v| !present.iter().any(|p| p.value == v.value))
    {
        None => Ok(()),
        Some(_) => Err(PermissionError::NotApplied {
            object_type: object_type.to_string(),
            object_id: group_id.to_string(),
            principal: group.display_name,
        }),
    }
}

impl PermissionSupport for EntitlementsSupport {
    fn object_types(&self) -> Vec<String> {
        vec![ENTITLEMENTS.to_string(), ROLES.to_string()]
    }

    /// One task per non-empty attribute of each listed group
    ///
    /// The listing already carries the attributes, so no group is fetched
    /// again.
    fn crawler_tasks(&self) -> Result<Vec<CrawlTask>> {
        let groups = retried(&self.retry, "list groups", || self.api.list(SCIM_ATTRIBUTES))?;
        let mut tasks: Vec<CrawlTask> = Vec::new();
        for group in groups
            .into_iter()
            .filter(|g| g.is_workspace_group() && !is_system_group(&g.display_name))
            .map(Arc::new)
        {
            for object_type in [ENTITLEMENTS, ROLES] {
                if values_of(&group, object_type).is_empty() {
                    continue;
                }
                let group = Arc::clone(&group);
                tasks.push(CrawlTask::new(object_type, group.id.clone(), move || {
                    snapshot(&group, object_type)
                }));
            }
        }
        Ok(tasks)
    }

    /// Attribute value to the name of the group holding it
    fn load_as_dict(&self, object_type: &str, object_id: &str) -> Result<BTreeMap<String, String>> {
        let group = retried(&self.retry, "get group", || self.api.get(object_id))?;
        Ok(values_of(&group, object_type)
            .iter()
            .filter_map(|v| v.value.clone())
            .map(|value| (value, group.display_name.clone()))
            .collect())
    }

    fn is_item_relevant(&self, item: &Permissions, state: &GroupMigrationState) -> Result<bool> {
        let snapshot: ScimSnapshot = item.decode()?;
        Ok(state.is_in_scope(GroupRole::Workspace, &item.object_id)
            || state.is_workspace_group_name(&snapshot.group_name))
    }

    fn build_apply_task(
        &self,
        item: &Permissions,
        state: &GroupMigrationState,
        destination: Destination,
    ) -> Result<ApplyTask> {
        let snapshot: ScimSnapshot = item.decode()?;
        if snapshot.values.is_empty() {
            return Ok(noop_task());
        }
        let info = state
            .get_by_workspace_group_name(&snapshot.group_name)
            .ok_or_else(|| PermissionError::MissingTarget {
                group: snapshot.group_name.clone(),
                destination,
            })?;
        let target = match destination {
            Destination::Backup => info.backup.id.clone(),
            Destination::Account => info.account.id.clone(),
        };

        let api = Arc::clone(&self.api);
        let updates = self.updates.clone();
        let object_type = item.object_type.clone();
        Ok(Box::new(move || {
            updates.call("patch group", || {
                patch_and_verify(api.as_ref(), &target, &object_type, &snapshot.values)
            })?;
            debug!(group = %snapshot.group_name, %object_type, %destination, "copied group attributes");
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
    use regroup_test_utils::{FakeWorkspace, Operation};

    #[test]
    fn entitlements_follow_the_group() {
        let ws = Arc::new(FakeWorkspace::new());
        let workspace = ws
            .add_workspace_group("data-eng", Vec::new())
            .with_entitlements(vec![ComplexValue::value("allow-cluster-create")]);
        ws.put_workspace_group(workspace.clone());
        let account = ws.add_account_group("data-eng", Vec::new());
        let backup = ws.add_workspace_group("db-temp-data-eng", Vec::new());

        let mut state = GroupMigrationState::new();
        state
            .add(MigrationGroupInfo {
                workspace: workspace.clone(),
                backup: backup.clone(),
                account,
            })
            .unwrap();
        let support = EntitlementsSupport::new(
            Arc::clone(&ws) as Arc<dyn GroupsApi>,
            RetryConfig::fast(3),
            Hardened::new(RetryConfig::fast(3), RateLimiter::new("permissions", 30)),
        );

        let items: Vec<Permissions> = support
            .crawler_tasks()
            .unwrap()
            .into_iter()
            .filter_map(|task| task.run().unwrap())
            .collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].object_type, ENTITLEMENTS);
        assert_eq!(items[0].object_id, workspace.id);
        assert!(support.is_item_relevant(&items[0], &state).unwrap());

        support
            .get_apply_task(&items[0], &state, Destination::Backup)
            .unwrap()()
        .unwrap();

        let dict = support.load_as_dict(ENTITLEMENTS, &backup.id).unwrap();
        assert_eq!(
            dict.get("allow-cluster-create").map(String::as_str),
            Some("db-temp-data-eng")
        );
    }

    #[test]
    fn crawl_lists_groups_once_and_keeps_every_value() {
        let ws = Arc::new(FakeWorkspace::new());
        let group = ws
            .add_workspace_group("data-eng", Vec::new())
            .with_entitlements(vec![
                ComplexValue::value("allow-cluster-create"),
                ComplexValue::value("workspace-access"),
            ])
            .with_roles(vec![ComplexValue::value("arn:aws:iam::1:instance-profile/etl")]);
        ws.put_workspace_group(group.clone());
        let support = EntitlementsSupport::new(
            Arc::clone(&ws) as Arc<dyn GroupsApi>,
            RetryConfig::fast(3),
            Hardened::new(RetryConfig::fast(3), RateLimiter::new("permissions", 30)),
        );

        let types: Vec<String> = support
            .crawler_tasks()
            .unwrap()
            .into_iter()
            .filter_map(|task| task.run().unwrap())
            .map(|item| item.object_type)
            .collect();
        assert_eq!(types, vec![ENTITLEMENTS.to_string(), ROLES.to_string()]);
        assert_eq!(ws.calls(Operation::GetGroup), 0);

        let dict = support.load_as_dict(ENTITLEMENTS, &group.id).unwrap();
        assert_eq!(dict.len(), 2);
        assert!(dict.values().all(|name| name == "data-eng"));
    }
}
