//! Replacement of workspace groups by account groups
//!
//! Each group moves through its own state machine:
//!
//! ```text
//! Planned ──delete──▶ WorkspaceDeleted ──reflect──▶ AccountReflected
//!    │                       │
//!    └───────▶ Failed ◀──────┘
//! ```
//!
//! Groups are independent. A group that fails stays `Failed` and the others
//! carry on.

use crate::directory::GroupDirectory;
use crate::error::TransitionError;
use crate::state::{GroupMigrationState, MigrationGroupInfo};
use regroup_framework::{Hardened, Task, Threads};
use regroup_sdk::{GroupsApi, PermissionAssignmentsApi, WorkspacePermission};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Where a group is in its replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplacementState {
    /// Nothing done yet
    Planned,
    /// Workspace group deleted, account group not yet bound
    WorkspaceDeleted,
    /// Account group bound into the workspace
    AccountReflected,
    /// A transition failed after retries
    Failed,
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: ReplacementState) -> Vec<ReplacementState> {
    use ReplacementState::{AccountReflected, Failed, Planned, WorkspaceDeleted};
    match from {
        Planned => vec![WorkspaceDeleted, Failed],
        WorkspaceDeleted => vec![AccountReflected, Failed],
        AccountReflected | Failed => vec![],
    }
}

/// Check that `from -> to` is a legal step
///
/// # Errors
/// [`TransitionError`] naming both states otherwise.
pub fn validate_transition(
    from: ReplacementState,
    to: ReplacementState,
) -> Result<(), TransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// Final state of one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementOutcome {
    /// Workspace group name
    pub group_name: String,
    /// State the group ended in
    pub state: ReplacementState,
    /// Error that moved the group to `Failed`
    pub error: Option<String>,
}

impl ReplacementOutcome {
    /// Check if the account group ended up bound
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == ReplacementState::AccountReflected
    }
}

/// Per-group outcomes of a replacement run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementReport {
    /// One outcome per group, in state order
    pub outcomes: Vec<ReplacementOutcome>,
}

impl ReplacementReport {
    /// Check if every group was replaced
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(ReplacementOutcome::is_success)
    }

    /// Groups whose replacement failed
    pub fn failed(&self) -> impl Iterator<Item = &ReplacementOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Number of replaced groups
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }
}

#[derive(Debug)]
struct Replacement {
    state: ReplacementState,
}

impl Replacement {
    fn advance(&mut self, to: ReplacementState) -> Result<(), TransitionError> {
        validate_transition(self.state, to)?;
        self.state = to;
        Ok(())
    }
}

/// Deletes workspace groups and reflects their account groups
#[derive(Clone)]
pub struct ReplacementExecutor {
    groups: Arc<dyn GroupsApi>,
    assignments: Arc<dyn PermissionAssignmentsApi>,
    directory: Arc<GroupDirectory>,
    deletes: Hardened,
    reflects: Hardened,
    threads: Threads,
}

impl fmt::Debug for ReplacementExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplacementExecutor")
            .field("threads", &self.threads)
            .finish_non_exhaustive()
    }
}

impl ReplacementExecutor {
    /// Executor gating deletes through `deletes` and binds through `reflects`
    #[must_use]
    pub fn new(
        groups: Arc<dyn GroupsApi>,
        assignments: Arc<dyn PermissionAssignmentsApi>,
        directory: Arc<GroupDirectory>,
        deletes: Hardened,
        reflects: Hardened,
        threads: Threads,
    ) -> Self {
        Self {
            groups,
            assignments,
            directory,
            deletes,
            reflects,
            threads,
        }
    }

    /// Run every group's state machine on the worker pool
    #[must_use]
    pub fn replace_workspace_groups_with_account_groups(
        &self,
        state: &GroupMigrationState,
    ) -> ReplacementReport {
        let tasks: Vec<Task<ReplacementOutcome, Infallible>> = state
            .groups()
            .iter()
            .map(|info| {
                let executor = self.clone();
                let info = info.clone();
                Box::new(move || Ok(Some(executor.replace(&info)))) as Task<_, _>
            })
            .collect();

        let gathered = self.threads.gather("replace groups", tasks);
        let mut panicked = gathered.panicked.into_iter().peekable();
        let mut finished = gathered.results.into_iter();
        let mut outcomes = Vec::with_capacity(state.len());
        for (index, info) in state.groups().iter().enumerate() {
            let outcome = match panicked.next_if(|p| p.index == index) {
                Some(p) => Some(ReplacementOutcome {
                    group_name: info.name().to_string(),
                    state: ReplacementState::Failed,
                    error: Some(p.message),
                }),
                None => finished.next(),
            };
            outcomes.extend(outcome);
        }
        let report = ReplacementReport { outcomes };
        if report.is_success() {
            info!(replaced = report.succeeded(), "replaced workspace groups");
        } else {
            error!(
                replaced = report.succeeded(),
                failed = report.failed().count(),
                "some workspace groups were not replaced"
            );
        }
        report
    }

    fn replace(&self, info: &MigrationGroupInfo) -> ReplacementOutcome {
        let mut replacement = Replacement {
            state: ReplacementState::Planned,
        };
        let error = self.run_transitions(info, &mut replacement).err();
        if let Some(message) = &error {
            error!(group = %info.name(), state = ?replacement.state, error = %message, "replacement failed");
            if let Err(e) = replacement.advance(ReplacementState::Failed) {
                error!(group = %info.name(), error = %e, "could not mark group failed");
            }
        }
        ReplacementOutcome {
            group_name: info.name().to_string(),
            state: replacement.state,
            error,
        }
    }

    fn run_transitions(
        &self,
        info: &MigrationGroupInfo,
        replacement: &mut Replacement,
    ) -> Result<(), String> {
        let workspace_id = info.workspace.id.as_str();
        self.deletes
            .call("delete workspace group", || {
                match self.groups.delete(workspace_id) {
                    Err(e) if e.is_not_found() => Ok(()),
                    other => other,
                }
            })
            .map_err(|e| format!("delete workspace group: {e}"))?;
        self.directory.remove_workspace_group(workspace_id);
        replacement
            .advance(ReplacementState::WorkspaceDeleted)
            .map_err(|e| e.to_string())?;
        info!(group = %info.name(), id = workspace_id, "deleted workspace group");

        let account_id = info.account.id.as_str();
        self.reflects
            .call("reflect account group", || {
                self.assignments
                    .assign(account_id, &[WorkspacePermission::User])
            })
            .map_err(|e| format!("reflect account group: {e}"))?;
        replacement
            .advance(ReplacementState::AccountReflected)
            .map_err(|e| e.to_string())?;
        info!(group = %info.name(), id = account_id, "reflected account group");
        Ok(())
    }
}
