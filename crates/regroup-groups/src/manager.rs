//! Facade wiring directory, planner, executor and cleanup from configuration

use crate::cleanup::{BackupCleanup, CleanupReport};
use crate::directory::GroupDirectory;
use crate::error::{GroupFailure, Result};
use crate::executor::{ReplacementExecutor, ReplacementReport};
use crate::planner::{MigrationPlanner, PlanningReport};
use crate::state::GroupMigrationState;
use regroup_framework::{retried, GroupsConfig, Hardened, MigrationConfig, RateLimiter, Threads};
use regroup_sdk::{GroupsApi, PermissionAssignmentsApi};
use std::sync::Arc;
use tracing::info;

/// Entry point for the group side of a migration
#[derive(Debug)]
pub struct GroupManager {
    config: GroupsConfig,
    directory: Arc<GroupDirectory>,
    planner: MigrationPlanner,
    executor: ReplacementExecutor,
    cleanup: BackupCleanup,
}

impl GroupManager {
    /// Load the directory and build the components
    ///
    /// # Errors
    /// Group listing failing after retries.
    pub fn new(
        groups: Arc<dyn GroupsApi>,
        assignments: Arc<dyn PermissionAssignmentsApi>,
        config: &MigrationConfig,
    ) -> Result<Self> {
        let retry = config.retry.to_retry_config();
        let limits = config.rate_limits;
        let threads = config
            .num_threads
            .map_or_else(Threads::default, Threads::new);

        let directory = Arc::new(retried(&retry, "load group directory", || {
            GroupDirectory::load(groups.as_ref())
        })?);
        let deletes = Hardened::new(retry.clone(), RateLimiter::new("delete", limits.delete));

        let planner = MigrationPlanner::new(
            Arc::clone(&groups),
            Arc::clone(&directory),
            config.groups.backup_group_prefix.clone(),
            Hardened::new(retry.clone(), RateLimiter::new("create", limits.create)),
            retry.clone(),
            threads,
        );
        let executor = ReplacementExecutor::new(
            Arc::clone(&groups),
            assignments,
            Arc::clone(&directory),
            deletes.clone(),
            Hardened::new(retry, RateLimiter::new("reflect", limits.reflect)),
            threads,
        );
        let cleanup = BackupCleanup::new(
            groups,
            Arc::clone(&directory),
            deletes,
            config.groups.backup_group_prefix.clone(),
        )
        .with_selected(config.groups.selected_names().map(<[String]>::to_vec));

        Ok(Self {
            config: config.groups.clone(),
            directory,
            planner,
            executor,
            cleanup,
        })
    }

    /// Shared group cache
    #[inline]
    #[must_use]
    pub fn directory(&self) -> &GroupDirectory {
        &self.directory
    }

    /// Planner used by [`GroupManager::prepare_groups_in_environment`]
    #[inline]
    #[must_use]
    pub fn planner(&self) -> &MigrationPlanner {
        &self.planner
    }

    /// Resolve configured names and build the migration state
    ///
    /// Groups an earlier run already replaced land in
    /// [`PlanningReport::replaced`], rebuilt from their backup and account
    /// groups.
    ///
    /// # Errors
    /// See [`MigrationPlanner::build_migration_state`].
    pub fn prepare_groups_in_environment(&self) -> Result<PlanningReport> {
        let resolution = self
            .planner
            .resolve_target_group_names(self.config.selected_names());
        info!(
            valid = resolution.names.len(),
            skipped = resolution.skipped.len(),
            replaced = resolution.replaced.len(),
            "resolved target groups"
        );
        let mut report = self.planner.build_migration_state(&resolution.names)?;
        report.skipped = resolution.skipped;
        for name in &resolution.replaced {
            let restored = self
                .planner
                .restore_replaced_group(name)
                .and_then(|info| report.replaced.add(info));
            if let Err(e) = restored {
                report.failed.push(GroupFailure::new(name.clone(), e));
            }
        }
        Ok(report)
    }

    /// Swap every workspace group in `state` for its account group
    #[must_use]
    pub fn replace_workspace_groups_with_account_groups(
        &self,
        state: &GroupMigrationState,
    ) -> ReplacementReport {
        self.executor
            .replace_workspace_groups_with_account_groups(state)
    }

    /// Delete leftover backup groups
    #[must_use]
    pub fn delete_backup_groups(&self) -> CleanupReport {
        self.cleanup.delete_backup_groups()
    }
}
