//! Error types for group migration

use regroup_sdk::{ApiError, GroupLevel};
use thiserror::Error;

use crate::executor::ReplacementState;

/// Errors raised while planning, replacing or cleaning up groups
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GroupsError {
    /// Group is missing at a level it must exist at
    #[error("group {name} not found at {level} level")]
    GroupNotFound {
        /// Display name looked up
        name: String,
        /// Level it was looked up at
        level: GroupLevel,
    },

    /// Second migration entry for one workspace group name
    #[error("group {0} is already part of the migration")]
    DuplicateMigration(String),

    /// Every requested group failed to plan
    #[error("all {count} groups failed to plan")]
    AllGroupsFailed {
        /// Number of failed groups
        count: usize,
    },

    /// Remote call failed after retries
    #[error("platform error: {0}")]
    Api(#[from] ApiError),

    /// Work on the group panicked
    #[error("panicked: {0}")]
    Panicked(String),

    /// Replacement state machine misuse
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Illegal replacement state transition
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("illegal transition {from:?} -> {to:?}")]
pub struct TransitionError {
    /// State the group was in
    pub from: ReplacementState,
    /// State that was requested
    pub to: ReplacementState,
}

/// A failure tied to the group it happened for
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{group_name}: {error}")]
pub struct GroupFailure {
    /// Workspace group name
    pub group_name: String,
    /// What went wrong
    pub error: GroupsError,
}

impl GroupFailure {
    /// Attach `group_name` to `error`
    #[must_use]
    pub fn new(group_name: impl Into<String>, error: impl Into<GroupsError>) -> Self {
        Self {
            group_name: group_name.into(),
            error: error.into(),
        }
    }
}

/// Result alias for group operations
pub type Result<T> = std::result::Result<T, GroupsError>;
