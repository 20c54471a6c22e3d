//! Cached index of workspace and account groups
//!
//! Groups are listed once and kept in one index per level. Backup creation and
//! workspace group deletion run on worker threads, so every read and write goes
//! through a `RwLock`.

use indexmap::IndexMap;
use parking_lot::RwLock;
use regroup_sdk::{ApiError, Group, GroupLevel, GroupsApi, SCIM_ATTRIBUTES};
use std::collections::HashMap;
use tracing::{debug, info};

/// Built-in groups that are never migrated
pub const SYSTEM_GROUPS: [&str; 3] = ["users", "admins", "account users"];

/// Check if `name` is a built-in group
#[inline]
#[must_use]
pub fn is_system_group(name: &str) -> bool {
    SYSTEM_GROUPS.contains(&name)
}

/// Groups keyed by id with a secondary name index
#[derive(Debug, Default)]
struct GroupIndex {
    by_id: IndexMap<String, Group>,
    by_name: HashMap<String, String>,
}

impl GroupIndex {
    fn from_groups(groups: impl IntoIterator<Item = Group>) -> Self {
        let mut index = Self::default();
        for group in groups {
            index.insert(group);
        }
        index
    }

    fn insert(&mut self, group: Group) {
        if let Some(previous) = self.by_name.insert(group.display_name.clone(), group.id.clone()) {
            if previous != group.id {
                self.by_id.shift_remove(&previous);
            }
        }
        self.by_id.insert(group.id.clone(), group);
    }

    fn remove(&mut self, id: &str) -> Option<Group> {
        let group = self.by_id.shift_remove(id)?;
        if self.by_name.get(&group.display_name).is_some_and(|known| known == id) {
            self.by_name.remove(&group.display_name);
        }
        Some(group)
    }

    fn find(&self, name: &str) -> Option<&Group> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    fn sorted(&self) -> Vec<Group> {
        let mut groups: Vec<Group> = self.by_id.values().cloned().collect();
        groups.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        groups
    }
}

/// Synchronized view of both group namespaces
#[derive(Debug, Default)]
pub struct GroupDirectory {
    workspace: RwLock<GroupIndex>,
    account: RwLock<GroupIndex>,
}

impl GroupDirectory {
    /// List both levels from the platform
    ///
    /// # Errors
    /// Propagates the first failed listing.
    pub fn load(api: &dyn GroupsApi) -> Result<Self, ApiError> {
        let workspace = api.list(SCIM_ATTRIBUTES)?;
        let account = api.list_account(SCIM_ATTRIBUTES)?;
        let directory = Self::from_groups(workspace, account);
        info!(
            workspace_groups = directory.workspace.read().by_id.len(),
            account_groups = directory.account.read().by_id.len(),
            "loaded group directory"
        );
        Ok(directory)
    }

    /// Directory over already-listed groups
    ///
    /// Workspace entries that are not workspace-local (reflected account
    /// groups) and system groups are dropped.
    #[must_use]
    pub fn from_groups(workspace: Vec<Group>, account: Vec<Group>) -> Self {
        let workspace = workspace
            .into_iter()
            .filter(|g| g.is_workspace_group() && !is_system_group(&g.display_name));
        let account = account
            .into_iter()
            .filter(|g| !is_system_group(&g.display_name));
        Self {
            workspace: RwLock::new(GroupIndex::from_groups(workspace)),
            account: RwLock::new(GroupIndex::from_groups(account)),
        }
    }

    /// Non-system workspace groups, sorted by name
    #[must_use]
    pub fn list_workspace_groups(&self) -> Vec<Group> {
        self.workspace.read().sorted()
    }

    /// Non-system account groups, sorted by name
    #[must_use]
    pub fn list_account_groups(&self) -> Vec<Group> {
        self.account.read().sorted()
    }

    /// Look up a group by display name
    #[must_use]
    pub fn find(&self, name: &str, level: GroupLevel) -> Option<Group> {
        let index = match level {
            GroupLevel::Workspace => self.workspace.read(),
            GroupLevel::Account => self.account.read(),
        };
        index.find(name).cloned()
    }

    /// Record a workspace group created by this process
    pub fn register_workspace_group(&self, group: Group) {
        debug!(group = %group.display_name, id = %group.id, "registered workspace group");
        self.workspace.write().insert(group);
    }

    /// Forget a deleted workspace group
    pub fn remove_workspace_group(&self, id: &str) -> Option<Group> {
        let removed = self.workspace.write().remove(id);
        if let Some(group) = &removed {
            debug!(group = %group.display_name, id, "removed workspace group");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use regroup_sdk::ResourceMeta;
    use regroup_test_utils::{members, FakeWorkspace};
    use std::sync::Arc;

    fn names(groups: &[Group]) -> Vec<&str> {
        groups.iter().map(|g| g.display_name.as_str()).collect()
    }

    #[test]
    fn load_filters_system_and_reflected_groups() {
        let ws = FakeWorkspace::new();
        ws.add_workspace_group("zeta", members(&["u-1"]));
        ws.add_workspace_group("alpha", Vec::new());
        ws.add_account_group("beta", Vec::new());

        let directory = GroupDirectory::load(&ws).unwrap();

        assert_eq!(names(&directory.list_workspace_groups()), vec!["alpha", "zeta"]);
        assert_eq!(names(&directory.list_account_groups()), vec!["beta"]);
        assert!(directory.find("admins", GroupLevel::Workspace).is_none());
        assert!(directory.find("account users", GroupLevel::Account).is_none());
    }

    #[test]
    fn from_groups_skips_account_groups_listed_in_workspace() {
        let reflected = Group::new("7", "ops").with_meta(ResourceMeta {
            resource_type: Some("Group".into()),
        });
        let directory = GroupDirectory::from_groups(vec![reflected.clone()], vec![reflected]);

        assert!(directory.find("ops", GroupLevel::Workspace).is_none());
        assert!(directory.find("ops", GroupLevel::Account).is_some());
    }

    #[test]
    fn mutations_are_visible_to_reads() {
        let directory = GroupDirectory::default();
        let group = Group::new("1", "db-temp-ops").with_meta(ResourceMeta::workspace_group());

        directory.register_workspace_group(group.clone());
        assert_eq!(directory.find("db-temp-ops", GroupLevel::Workspace), Some(group));

        assert!(directory.remove_workspace_group("1").is_some());
        assert!(directory.find("db-temp-ops", GroupLevel::Workspace).is_none());
        assert!(directory.list_workspace_groups().is_empty());
        assert!(directory.remove_workspace_group("1").is_none());
    }

    #[test]
    fn concurrent_register_and_remove_lose_nothing() {
        let directory = Arc::new(GroupDirectory::default());
        for i in 0..50 {
            directory.register_workspace_group(Group::new(format!("old-{i}"), format!("old-{i}")));
        }

        std::thread::scope(|s| {
            for i in 0..50 {
                let directory = Arc::clone(&directory);
                s.spawn(move || {
                    directory.register_workspace_group(Group::new(format!("new-{i}"), format!("new-{i}")));
                    directory.remove_workspace_group(&format!("old-{i}"));
                });
            }
        });

        let listed = directory.list_workspace_groups();
        assert_eq!(listed.len(), 50);
        assert!(listed.iter().all(|g| g.display_name.starts_with("new-")));
    }
}
