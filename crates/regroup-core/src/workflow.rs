//! End-to-end group migration
//!
//! A run walks the steps in order:
//!
//! 1. [`Step::Prepare`]: resolve names, create backups, build the state
//! 2. [`Step::Inventory`]: crawl every ACL into the inventory
//! 3. [`Step::ApplyBackup`]: grant backups what the workspace groups hold
//! 4. [`Step::Replace`]: delete workspace groups, reflect account groups
//! 5. [`Step::ApplyAccount`]: grant the account groups the same
//!
//! The state is never persisted, so every run starts with `Prepare`. Later
//! steps can be resumed with [`GroupMigrationWorkflow::run_from`], reusing a
//! stored inventory. Groups an earlier run already replaced are rebuilt from
//! their backups and only take part from [`Step::Replace`] on. Backup groups are removed by a separate
//! [`GroupMigrationWorkflow::remove_backup_groups`] run once the account
//! groups are verified.

use crate::clients::WorkspaceClients;
use crate::error::{Result, WorkflowError};
use regroup_framework::{
    logging, InventoryStore, JsonFileInventory, MemoryInventory, MigrationConfig, Threads,
};
use regroup_groups::{
    CleanupReport, Destination, GroupFailure, GroupManager, GroupMigrationState,
    PlanningReport, ReplacementReport, SkipReason, SkippedGroup,
};
use regroup_permissions::{ApplyReport, CrawlReport, PermissionManager};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Workflow step, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Plan groups and create backups
    Prepare,
    /// Crawl permissions
    Inventory,
    /// Copy permissions to backups
    ApplyBackup,
    /// Swap workspace groups for account groups
    Replace,
    /// Copy permissions to account groups
    ApplyAccount,
}

impl Step {
    /// Every step in execution order
    pub const ALL: [Step; 5] = [
        Step::Prepare,
        Step::Inventory,
        Step::ApplyBackup,
        Step::Replace,
        Step::ApplyAccount,
    ];

    /// Snake-case name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Inventory => "inventory",
            Self::ApplyBackup => "apply_backup",
            Self::Replace => "replace",
            Self::ApplyAccount => "apply_account",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| WorkflowError::UnknownStep(s.to_string()))
    }
}

/// What a run did
#[derive(Debug, Clone, Default)]
pub struct MigrationSummary {
    /// Groups in the migration state
    pub prepared: usize,
    /// Groups an earlier run already replaced, resumed from their backups
    pub restored: usize,
    /// Requested names left out, with the reason
    pub skipped: Vec<SkippedGroup>,
    /// Groups that could not be planned
    pub planning_failures: Vec<GroupFailure>,
    /// Inventory crawl, unless resumed past it
    pub crawl: Option<CrawlReport>,
    /// Permissions copied to backups
    pub backup: Option<ApplyReport>,
    /// Group replacement
    pub replacement: Option<ReplacementReport>,
    /// Permissions copied to account groups
    pub account: Option<ApplyReport>,
    /// Step that stopped the run early
    pub halted_at: Option<Step>,
}

impl MigrationSummary {
    fn planned(report: &PlanningReport) -> Self {
        Self {
            prepared: report.state.len(),
            skipped: report.skipped.clone(),
            planning_failures: report.failed.clone(),
            ..Self::default()
        }
    }

    /// Check if every executed step succeeded for every group
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.halted_at.is_none()
            && self.planning_failures.is_empty()
            && self.crawl.as_ref().map_or(true, CrawlReport::is_complete)
            && self.backup.as_ref().map_or(true, ApplyReport::is_success)
            && self
                .replacement
                .as_ref()
                .map_or(true, ReplacementReport::is_success)
            && self.account.as_ref().map_or(true, ApplyReport::is_success)
    }
}

/// Drives a full migration
#[derive(Debug)]
pub struct GroupMigrationWorkflow {
    groups: GroupManager,
    permissions: PermissionManager,
}

impl GroupMigrationWorkflow {
    /// Validate `config`, load the group directory and wire every component
    ///
    /// The inventory is file-backed when `config.inventory_path` is set.
    ///
    /// # Errors
    /// Invalid configuration, clashing listings, or a failed directory load.
    pub fn new(clients: &WorkspaceClients, config: &MigrationConfig) -> Result<Self> {
        config.validate()?;
        let registry = clients.default_registry(config)?;
        let inventory: Arc<dyn InventoryStore> = match &config.inventory_path {
            Some(path) => Arc::new(JsonFileInventory::new(path)),
            None => Arc::new(MemoryInventory::new()),
        };
        let threads = config
            .num_threads
            .map_or_else(Threads::default, Threads::new);
        let groups = GroupManager::new(
            Arc::clone(&clients.groups),
            Arc::clone(&clients.assignments),
            config,
        )?;
        Ok(Self::from_parts(
            groups,
            PermissionManager::new(registry, inventory, threads),
        ))
    }

    /// Workflow over already built managers
    #[must_use]
    pub fn from_parts(groups: GroupManager, permissions: PermissionManager) -> Self {
        Self { groups, permissions }
    }

    /// Group side
    #[inline]
    #[must_use]
    pub fn groups(&self) -> &GroupManager {
        &self.groups
    }

    /// Permission side
    #[inline]
    #[must_use]
    pub fn permissions(&self) -> &PermissionManager {
        &self.permissions
    }

    /// Run every step
    ///
    /// # Errors
    /// See [`GroupMigrationWorkflow::run_from`].
    pub fn run(&self) -> Result<MigrationSummary> {
        self.run_from(Step::Prepare)
    }

    /// Prepare, then run `from` and every later step
    ///
    /// A failed backup apply stops the run before any group is deleted.
    /// Account permissions are applied only to groups whose replacement
    /// succeeded. When resuming at [`Step::Replace`] or later, groups whose
    /// workspace group is already gone are restored and receive their account
    /// permissions; earlier steps skip them.
    ///
    /// # Errors
    /// No requested group could be planned, or the inventory is unusable.
    /// Per-group failures are reported in the summary instead.
    pub fn run_from(&self, from: Step) -> Result<MigrationSummary> {
        info!(%from, "starting group migration");
        let planning = self.groups.prepare_groups_in_environment()?;
        let mut summary = MigrationSummary::planned(&planning);
        let state = planning.state;
        let restored = if from >= Step::Replace {
            summary.restored = planning.replaced.len();
            planning.replaced
        } else {
            summary
                .skipped
                .extend(planning.replaced.groups().iter().map(|info| SkippedGroup {
                    name: info.name().to_string(),
                    reason: SkipReason::AlreadyReplaced,
                }));
            GroupMigrationState::new()
        };
        if state.is_empty() && restored.is_empty() {
            warn!("no groups to migrate");
            return Ok(summary);
        }

        if from <= Step::Inventory {
            summary.crawl = Some(self.permissions.inventorize_permissions()?);
        }

        if from <= Step::ApplyBackup {
            let backup = self
                .permissions
                .apply_group_permissions(&state, Destination::Backup)?;
            let applied = backup.is_success();
            summary.backup = Some(backup);
            if !applied {
                error!("backup groups are incomplete, not replacing any workspace group");
                summary.halted_at = Some(Step::ApplyBackup);
                return Ok(summary);
            }
        }

        let mut account_state = if from <= Step::Replace {
            let replacement = self
                .groups
                .replace_workspace_groups_with_account_groups(&state);
            let replaced = replaced_only(&state, &replacement)?;
            summary.replacement = Some(replacement);
            replaced
        } else {
            state
        };
        for info in restored.groups() {
            account_state.add(info.clone())?;
        }

        summary.account = Some(
            self.permissions
                .apply_group_permissions(&account_state, Destination::Account)?,
        );

        info!(
            prepared = summary.prepared,
            restored = summary.restored,
            skipped = summary.skipped.len(),
            success = summary.is_success(),
            "group migration finished"
        );
        Ok(summary)
    }

    /// Delete the backup groups left by earlier runs
    #[must_use]
    pub fn remove_backup_groups(&self) -> CleanupReport {
        self.groups.delete_backup_groups()
    }
}

fn replaced_only(
    state: &GroupMigrationState,
    report: &ReplacementReport,
) -> Result<GroupMigrationState> {
    let replaced: HashSet<&str> = report
        .outcomes
        .iter()
        .filter(|outcome| outcome.is_success())
        .map(|outcome| outcome.group_name.as_str())
        .collect();
    let mut kept = GroupMigrationState::new();
    for info in state.groups().iter().filter(|info| replaced.contains(info.name())) {
        kept.add(info.clone())?;
    }
    Ok(kept)
}

/// Install the `tracing` subscriber described by `config.log`
///
/// # Errors
/// Bad filter directive, or a subscriber is already installed.
pub fn init_logging(config: &MigrationConfig) -> Result<()> {
    logging::init(&config.log)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use regroup_groups::{MigrationGroupInfo, ReplacementOutcome, ReplacementState};
    use regroup_sdk::Group;

    #[test]
    fn steps_parse_and_order() {
        for step in Step::ALL {
            assert_eq!(step.as_str().parse::<Step>().unwrap(), step);
        }
        assert!(Step::Prepare < Step::ApplyAccount);
        assert!(matches!(
            "rollback".parse::<Step>(),
            Err(WorkflowError::UnknownStep(s)) if s == "rollback"
        ));
    }

    #[test]
    fn only_replaced_groups_get_account_permissions() {
        let mut state = GroupMigrationState::new();
        for name in ["a", "b"] {
            state
                .add(MigrationGroupInfo {
                    workspace: Group::new(format!("ws-{name}"), name),
                    backup: Group::new(format!("bk-{name}"), format!("db-temp-{name}")),
                    account: Group::new(format!("acc-{name}"), name),
                })
                .unwrap();
        }
        let report = ReplacementReport {
            outcomes: vec![
                ReplacementOutcome {
                    group_name: "a".into(),
                    state: ReplacementState::Failed,
                    error: Some("delete failed".into()),
                },
                ReplacementOutcome {
                    group_name: "b".into(),
                    state: ReplacementState::AccountReflected,
                    error: None,
                },
            ],
        };

        let kept = replaced_only(&state, &report).unwrap();
        assert_eq!(kept.len(), 1);
        assert!(kept.is_workspace_group_name("b"));
    }

    #[test]
    fn summary_success_needs_every_report() {
        let mut summary = MigrationSummary::default();
        assert!(summary.is_success());

        summary.crawl = Some(CrawlReport {
            failed_listings: vec!["secrets".into()],
            ..CrawlReport::default()
        });
        assert!(!summary.is_success());

        summary.crawl = Some(CrawlReport::default());
        summary.halted_at = Some(Step::ApplyBackup);
        assert!(!summary.is_success());
    }
}
