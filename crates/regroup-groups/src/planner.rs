//! Resolves requested group names into migration triples
//!
//! Planning never fails for a single group. Names that cannot be migrated are
//! skipped with a [`SkipReason`], and groups that fail while being resolved are
//! reported next to the state built from the rest.

use crate::directory::{is_system_group, GroupDirectory};
use crate::error::{GroupFailure, GroupsError, Result};
use crate::state::{GroupMigrationState, MigrationGroupInfo};
use dashmap::DashMap;
use parking_lot::Mutex;
use regroup_framework::{retried, Hardened, RetryConfig, Task, Threads};
use regroup_sdk::{ApiError, CreateGroup, Group, GroupLevel, GroupsApi, SCIM_ATTRIBUTES};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Why a requested name was left out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Built-in group
    SystemGroup,
    /// No workspace group with that name
    MissingInWorkspace,
    /// No account group with that name
    MissingInAccount,
    /// Workspace group already swapped for its account group
    AlreadyReplaced,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SystemGroup => "system group",
            Self::MissingInWorkspace => "not found at workspace level",
            Self::MissingInAccount => "not found at account level",
            Self::AlreadyReplaced => "already replaced by its account group",
        })
    }
}

/// A name dropped during resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedGroup {
    /// Requested name
    pub name: String,
    /// Why it was dropped
    pub reason: SkipReason,
}

/// Outcome of name resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Names present at both levels
    pub names: Vec<String>,
    /// Names dropped with their reason
    pub skipped: Vec<SkippedGroup>,
    /// Names whose workspace group is gone while backup and account remain
    pub replaced: Vec<String>,
}

/// Outcome of planning
#[derive(Debug, Default)]
pub struct PlanningReport {
    /// Groups ready to migrate
    pub state: GroupMigrationState,
    /// Names dropped before planning
    pub skipped: Vec<SkippedGroup>,
    /// Groups that failed while being resolved
    pub failed: Vec<GroupFailure>,
    /// Groups an earlier run already replaced, rebuilt from their backups
    pub replaced: GroupMigrationState,
}

/// Builds [`GroupMigrationState`] from the directory
#[derive(Clone)]
pub struct MigrationPlanner {
    api: Arc<dyn GroupsApi>,
    directory: Arc<GroupDirectory>,
    backup_prefix: String,
    creates: Hardened,
    list_retry: RetryConfig,
    threads: Threads,
    creation_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl fmt::Debug for MigrationPlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationPlanner")
            .field("backup_prefix", &self.backup_prefix)
            .field("threads", &self.threads)
            .finish_non_exhaustive()
    }
}

impl MigrationPlanner {
    /// Planner creating backups named `backup_prefix + name`
    ///
    /// `creates` wraps backup creation; `list_retry` covers the re-listing done
    /// when a create reports the group already exists.
    #[must_use]
    pub fn new(
        api: Arc<dyn GroupsApi>,
        directory: Arc<GroupDirectory>,
        backup_prefix: impl Into<String>,
        creates: Hardened,
        list_retry: RetryConfig,
        threads: Threads,
    ) -> Self {
        Self {
            api,
            directory,
            backup_prefix: backup_prefix.into(),
            creates,
            list_retry,
            threads,
            creation_locks: Arc::new(DashMap::new()),
        }
    }

    /// Backup name for `group_name`
    #[must_use]
    pub fn backup_name(&self, group_name: &str) -> String {
        format!("{}{group_name}", self.backup_prefix)
    }

    /// Validate explicit names, or discover names present at both levels
    #[must_use]
    pub fn resolve_target_group_names(&self, selected: Option<&[String]>) -> Resolution {
        let Some(selected) = selected else {
            let workspace: BTreeSet<String> = self
                .directory
                .list_workspace_groups()
                .into_iter()
                .map(|g| g.display_name)
                .collect();
            let account: BTreeSet<String> = self
                .directory
                .list_account_groups()
                .into_iter()
                .map(|g| g.display_name)
                .collect();
            let (names, missing): (Vec<String>, Vec<String>) = account
                .into_iter()
                .partition(|name| workspace.contains(name));
            let replaced: Vec<String> = missing
                .into_iter()
                .filter(|name| workspace.contains(&self.backup_name(name)))
                .collect();
            info!(
                count = names.len(),
                replaced = replaced.len(),
                "discovered groups present at both levels"
            );
            return Resolution {
                names,
                skipped: Vec::new(),
                replaced,
            };
        };

        let mut resolution = Resolution::default();
        let mut seen = HashSet::new();
        for name in selected {
            if !seen.insert(name.as_str()) {
                continue;
            }
            let reason = if is_system_group(name) {
                Some(SkipReason::SystemGroup)
            } else if self.directory.find(name, GroupLevel::Workspace).is_none() {
                Some(SkipReason::MissingInWorkspace)
            } else if self.directory.find(name, GroupLevel::Account).is_none() {
                Some(SkipReason::MissingInAccount)
            } else {
                None
            };
            match reason {
                Some(SkipReason::MissingInWorkspace) if self.is_replaced(name) => {
                    resolution.replaced.push(name.clone());
                }
                Some(reason) => {
                    warn!(group = %name, %reason, "skipping group");
                    resolution.skipped.push(SkippedGroup {
                        name: name.clone(),
                        reason,
                    });
                }
                None => resolution.names.push(name.clone()),
            }
        }
        resolution
    }

    fn is_replaced(&self, name: &str) -> bool {
        self.directory.find(name, GroupLevel::Account).is_some()
            && self
                .directory
                .find(&self.backup_name(name), GroupLevel::Workspace)
                .is_some()
    }

    /// Triple for a group whose workspace group an earlier run deleted
    ///
    /// The deleted group is known by name only; its id is left empty and its
    /// members are taken from the backup copy.
    ///
    /// # Errors
    /// [`GroupsError::GroupNotFound`] if the backup or account group is gone.
    pub fn restore_replaced_group(&self, name: &str) -> Result<MigrationGroupInfo> {
        let backup_name = self.backup_name(name);
        let backup = self
            .directory
            .find(&backup_name, GroupLevel::Workspace)
            .ok_or_else(|| GroupsError::GroupNotFound {
                name: backup_name,
                level: GroupLevel::Workspace,
            })?;
        let account = self
            .directory
            .find(name, GroupLevel::Account)
            .ok_or_else(|| GroupsError::GroupNotFound {
                name: name.to_string(),
                level: GroupLevel::Account,
            })?;
        let workspace = Group::new(String::new(), name).with_members(backup.members.clone());
        info!(group = %name, backup = %backup.display_name, "restored replaced group");
        Ok(MigrationGroupInfo {
            workspace,
            backup,
            account,
        })
    }

    /// Existing backup of `workspace_group`, or a freshly created copy
    ///
    /// Calls for the same backup name are serialized, so a backup is created
    /// at most once per process.
    ///
    /// # Errors
    /// The create failing after retries, or the group vanishing after create
    /// reported it already exists.
    pub fn ensure_backup_group(&self, workspace_group: &Group) -> Result<Group> {
        let name = self.backup_name(&workspace_group.display_name);
        let lock = Arc::clone(&self.creation_locks.entry(name.clone()).or_default());
        let _guard = lock.lock();

        if let Some(existing) = self.directory.find(&name, GroupLevel::Workspace) {
            info!(group = %workspace_group.display_name, backup = %name, "backup group exists");
            return Ok(existing);
        }

        let request = CreateGroup::copy_of(&name, workspace_group);
        match self
            .creates
            .call("create backup group", || self.api.create(&request))
        {
            Ok(created) => {
                info!(
                    group = %workspace_group.display_name,
                    backup = %name,
                    id = %created.id,
                    "created backup group"
                );
                self.directory.register_workspace_group(created.clone());
                Ok(created)
            }
            Err(ApiError::AlreadyExists(_)) => self.adopt_existing(&name),
            Err(e) => Err(e.into()),
        }
    }

    fn adopt_existing(&self, name: &str) -> Result<Group> {
        warn!(backup = %name, "backup group already exists remotely, re-listing");
        let listed = retried(&self.list_retry, "list workspace groups", || {
            self.api.list(SCIM_ATTRIBUTES)
        })?;
        let group = listed
            .into_iter()
            .find(|g| g.is_workspace_group() && g.display_name == name)
            .ok_or_else(|| GroupsError::GroupNotFound {
                name: name.to_string(),
                level: GroupLevel::Workspace,
            })?;
        self.directory.register_workspace_group(group.clone());
        Ok(group)
    }

    fn plan_group(&self, name: &str) -> Result<MigrationGroupInfo> {
        let missing = |level| GroupsError::GroupNotFound {
            name: name.to_string(),
            level,
        };
        let workspace = self
            .directory
            .find(name, GroupLevel::Workspace)
            .ok_or_else(|| missing(GroupLevel::Workspace))?;
        let account = self
            .directory
            .find(name, GroupLevel::Account)
            .ok_or_else(|| missing(GroupLevel::Account))?;
        let backup = self.ensure_backup_group(&workspace)?;
        Ok(MigrationGroupInfo {
            workspace,
            backup,
            account,
        })
    }

    /// Resolve every name into a triple on the worker pool
    ///
    /// # Errors
    /// [`GroupsError::AllGroupsFailed`] when names were given and none of
    /// them could be planned.
    pub fn build_migration_state(&self, names: &[String]) -> Result<PlanningReport> {
        let tasks: Vec<Task<MigrationGroupInfo, GroupFailure>> = names
            .iter()
            .map(|name| {
                let planner = self.clone();
                let name = name.clone();
                Box::new(move || {
                    planner
                        .plan_group(&name)
                        .map(Some)
                        .map_err(|e| GroupFailure::new(name, e))
                }) as Task<_, _>
            })
            .collect();

        let gathered = self.threads.gather("plan groups", tasks);
        let mut report = PlanningReport {
            failed: gathered.errors,
            ..PlanningReport::default()
        };
        for panicked in gathered.panicked {
            report.failed.push(GroupFailure::new(
                names[panicked.index].clone(),
                GroupsError::Panicked(panicked.message),
            ));
        }
        for info in gathered.results {
            let name = info.name().to_string();
            if let Err(e) = report.state.add(info) {
                report.failed.push(GroupFailure::new(name, e));
            }
        }

        if !names.is_empty() && report.state.is_empty() {
            error!(count = report.failed.len(), "no group could be planned");
            return Err(GroupsError::AllGroupsFailed {
                count: report.failed.len(),
            });
        }
        if !report.failed.is_empty() {
            error!(
                planned = report.state.len(),
                failed = report.failed.len(),
                "some groups could not be planned"
            );
        }
        info!(planned = report.state.len(), "migration state built");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use regroup_framework::RateLimiter;
    use regroup_test_utils::{members, FakeWorkspace, Operation};

    fn planner(ws: &Arc<FakeWorkspace>) -> MigrationPlanner {
        let directory = Arc::new(GroupDirectory::load(ws.as_ref()).unwrap());
        MigrationPlanner::new(
            Arc::clone(ws) as Arc<dyn GroupsApi>,
            directory,
            "db-temp-",
            Hardened::new(RetryConfig::fast(3), RateLimiter::new("create", 5)),
            RetryConfig::fast(3),
            Threads::new(4),
        )
    }

    fn both_levels(ws: &FakeWorkspace, names: &[&str]) {
        for name in names {
            ws.add_workspace_group(name, members(&["u-1"]));
            ws.add_account_group(name, members(&["u-1"]));
        }
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn discovery_is_the_sorted_intersection() {
        let ws = Arc::new(FakeWorkspace::new());
        for name in ["c", "a", "b"] {
            ws.add_workspace_group(name, Vec::new());
        }
        for name in ["d", "c", "b"] {
            ws.add_account_group(name, Vec::new());
        }

        let resolution = planner(&ws).resolve_target_group_names(None);
        assert_eq!(resolution.names, strings(&["b", "c"]));
        assert!(resolution.skipped.is_empty());
    }

    #[test]
    fn explicit_names_are_validated_and_deduplicated() {
        let ws = Arc::new(FakeWorkspace::new());
        both_levels(&ws, &["data-eng"]);
        ws.add_workspace_group("ws-only", Vec::new());
        ws.add_account_group("acc-only", Vec::new());

        let requested = strings(&["data-eng", "admins", "acc-only", "ws-only", "data-eng"]);
        let resolution = planner(&ws).resolve_target_group_names(Some(&requested));

        assert_eq!(resolution.names, strings(&["data-eng"]));
        let reasons: Vec<_> = resolution
            .skipped
            .iter()
            .map(|s| (s.name.as_str(), s.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("admins", SkipReason::SystemGroup),
                ("acc-only", SkipReason::MissingInWorkspace),
                ("ws-only", SkipReason::MissingInAccount),
            ]
        );
    }

    #[test]
    fn backup_copies_the_source_group() {
        let ws = Arc::new(FakeWorkspace::new());
        both_levels(&ws, &["data-eng"]);
        let planner = planner(&ws);
        let source = ws.workspace_group_named("data-eng").unwrap();

        let backup = planner.ensure_backup_group(&source).unwrap();

        assert_eq!(backup.display_name, "db-temp-data-eng");
        assert!(backup.is_workspace_group());
        assert_eq!(backup.member_values(), source.member_values());
        assert_eq!(
            planner.directory.find("db-temp-data-eng", GroupLevel::Workspace),
            Some(backup)
        );
    }

    #[test]
    fn ensure_backup_is_idempotent_under_concurrency() {
        let ws = Arc::new(FakeWorkspace::new());
        both_levels(&ws, &["data-eng"]);
        let planner = planner(&ws);
        let source = ws.workspace_group_named("data-eng").unwrap();

        let ids: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| planner.ensure_backup_group(&source).unwrap().id))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(ws.calls(Operation::CreateGroup), 1);
    }

    #[test]
    fn already_exists_adopts_the_remote_group() {
        let ws = Arc::new(FakeWorkspace::new());
        both_levels(&ws, &["data-eng"]);
        let planner = planner(&ws);
        let remote = ws.add_workspace_group("db-temp-data-eng", Vec::new());
        let source = ws.workspace_group_named("data-eng").unwrap();

        let backup = planner.ensure_backup_group(&source).unwrap();
        assert_eq!(backup.id, remote.id);
        assert_eq!(ws.calls(Operation::CreateGroup), 1);
    }

    #[test]
    fn transient_create_failures_are_retried() {
        let ws = Arc::new(FakeWorkspace::new());
        both_levels(&ws, &["data-eng"]);
        ws.fail_times(Operation::CreateGroup, 2, ApiError::TooManyRequests("quota".into()));
        let planner = planner(&ws);
        let source = ws.workspace_group_named("data-eng").unwrap();

        assert!(planner.ensure_backup_group(&source).is_ok());
        assert_eq!(ws.calls(Operation::CreateGroup), 3);
    }

    #[test]
    fn build_state_tolerates_single_failures() {
        let ws = Arc::new(FakeWorkspace::new());
        both_levels(&ws, &["a", "b"]);
        let planner = planner(&ws);

        let report = planner
            .build_migration_state(&strings(&["a", "b", "ghost"]))
            .unwrap();

        assert_eq!(report.state.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].group_name, "ghost");
        assert_eq!(
            report
                .state
                .get_by_workspace_group_name("b")
                .map(|info| info.backup.display_name.as_str()),
            Some("db-temp-b")
        );
    }

    #[test]
    fn build_state_fails_when_every_group_fails() {
        let ws = Arc::new(FakeWorkspace::new());
        let err = planner(&ws)
            .build_migration_state(&strings(&["x", "y"]))
            .unwrap_err();
        assert_eq!(err, GroupsError::AllGroupsFailed { count: 2 });
    }

    #[test]
    fn empty_name_list_builds_empty_state() {
        let ws = Arc::new(FakeWorkspace::new());
        let report = planner(&ws).build_migration_state(&[]).unwrap();
        assert!(report.state.is_empty());
        assert!(report.failed.is_empty());
    }
}
