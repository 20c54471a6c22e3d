//! Removal of backup groups once account groups have taken over

use crate::directory::GroupDirectory;
use crate::error::GroupFailure;
use regroup_framework::Hardened;
use regroup_sdk::{Group, GroupLevel, GroupsApi};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of a cleanup run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    /// Deleted backup group names
    pub deleted: Vec<String>,
    /// Backups that could not be deleted
    pub failed: Vec<GroupFailure>,
}

impl CleanupReport {
    /// Check if every candidate was deleted
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Deletes `prefix + name` workspace groups for in-scope account groups
#[derive(Clone)]
pub struct BackupCleanup {
    api: Arc<dyn GroupsApi>,
    directory: Arc<GroupDirectory>,
    deletes: Hardened,
    backup_prefix: String,
    selected: Option<Vec<String>>,
}

impl fmt::Debug for BackupCleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupCleanup")
            .field("backup_prefix", &self.backup_prefix)
            .field("selected", &self.selected)
            .finish_non_exhaustive()
    }
}

impl BackupCleanup {
    /// Cleanup over every account group
    #[must_use]
    pub fn new(
        api: Arc<dyn GroupsApi>,
        directory: Arc<GroupDirectory>,
        deletes: Hardened,
        backup_prefix: impl Into<String>,
    ) -> Self {
        Self {
            api,
            directory,
            deletes,
            backup_prefix: backup_prefix.into(),
            selected: None,
        }
    }

    /// Restrict cleanup to backups of `names`
    #[must_use]
    pub fn with_selected(mut self, names: Option<Vec<String>>) -> Self {
        self.selected = names;
        self
    }

    fn candidates(&self) -> Vec<Group> {
        let selected: Option<HashSet<&str>> = self
            .selected
            .as_ref()
            .map(|names| names.iter().map(String::as_str).collect());
        self.directory
            .list_account_groups()
            .iter()
            .filter(|account| {
                selected
                    .as_ref()
                    .map_or(true, |names| names.contains(account.display_name.as_str()))
            })
            .filter_map(|account| {
                let backup_name = format!("{}{}", self.backup_prefix, account.display_name);
                self.directory.find(&backup_name, GroupLevel::Workspace)
            })
            .collect()
    }

    /// Delete every candidate backup, one at a time
    #[must_use]
    pub fn delete_backup_groups(&self) -> CleanupReport {
        let candidates = self.candidates();
        let mut report = CleanupReport::default();
        if candidates.is_empty() {
            info!(prefix = %self.backup_prefix, "no backup groups to delete");
            return report;
        }
        info!(count = candidates.len(), "deleting backup groups");

        for backup in candidates {
            let deleted = self.deletes.call("delete backup group", || {
                match self.api.delete(&backup.id) {
                    Err(e) if e.is_not_found() => Ok(()),
                    other => other,
                }
            });
            match deleted {
                Ok(()) => {
                    self.directory.remove_workspace_group(&backup.id);
                    info!(backup = %backup.display_name, "deleted backup group");
                    report.deleted.push(backup.display_name);
                }
                Err(e) => {
                    warn!(backup = %backup.display_name, error = %e, "failed to delete backup group");
                    report.failed.push(GroupFailure::new(backup.display_name, e));
                }
            }
        }
        if !report.is_success() {
            error!(
                deleted = report.deleted.len(),
                failed = report.failed.len(),
                "some backup groups were not deleted"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use regroup_framework::{RateLimiter, RetryConfig};
    use regroup_sdk::ApiError;
    use regroup_test_utils::{FakeWorkspace, Operation};

    fn cleanup(ws: &Arc<FakeWorkspace>) -> BackupCleanup {
        let directory = Arc::new(GroupDirectory::load(ws.as_ref()).unwrap());
        BackupCleanup::new(
            Arc::clone(ws) as Arc<dyn GroupsApi>,
            directory,
            Hardened::new(RetryConfig::fast(2), RateLimiter::new("delete", 5)),
            "db-temp-",
        )
    }

    fn seed(ws: &FakeWorkspace, names: &[&str]) {
        for name in names {
            ws.add_account_group(name, Vec::new());
            ws.add_workspace_group(&format!("db-temp-{name}"), Vec::new());
        }
    }

    #[test]
    fn deletes_backups_of_account_groups_only() {
        let ws = Arc::new(FakeWorkspace::new());
        seed(&ws, &["a", "b"]);
        ws.add_workspace_group("db-temp-orphan", Vec::new());

        let report = cleanup(&ws).delete_backup_groups();

        assert!(report.is_success());
        assert_eq!(report.deleted, vec!["db-temp-a".to_string(), "db-temp-b".to_string()]);
        assert!(ws.workspace_group_named("db-temp-a").is_none());
        assert!(ws.workspace_group_named("db-temp-orphan").is_some());
    }

    #[test]
    fn selection_restricts_candidates() {
        let ws = Arc::new(FakeWorkspace::new());
        seed(&ws, &["a", "b"]);

        let report = cleanup(&ws)
            .with_selected(Some(vec!["b".to_string()]))
            .delete_backup_groups();

        assert_eq!(report.deleted, vec!["db-temp-b".to_string()]);
        assert!(ws.workspace_group_named("db-temp-a").is_some());
    }

    #[test]
    fn nothing_to_delete_is_a_no_op() {
        let ws = Arc::new(FakeWorkspace::new());
        let report = cleanup(&ws).delete_backup_groups();
        assert!(report.is_success());
        assert!(report.deleted.is_empty());
        assert_eq!(ws.calls(Operation::DeleteGroup), 0);
    }

    #[test]
    fn failures_are_reported_and_the_rest_continue() {
        let ws = Arc::new(FakeWorkspace::new());
        seed(&ws, &["a", "b"]);
        ws.fail_next(Operation::DeleteGroup, ApiError::PermissionDenied("nope".into()));

        let report = cleanup(&ws).delete_backup_groups();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].group_name, "db-temp-a");
        assert_eq!(report.deleted, vec!["db-temp-b".to_string()]);
    }
}
