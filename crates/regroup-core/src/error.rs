//! Workflow errors

use regroup_framework::{ConfigError, FrameworkError};
use regroup_groups::GroupsError;
use regroup_permissions::PermissionError;

/// Errors that stop a workflow run
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Configuration rejected
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Logging or other framework setup failed
    #[error(transparent)]
    Framework(#[from] FrameworkError),

    /// Group side failed as a whole
    #[error("group migration failed: {0}")]
    Groups(#[from] GroupsError),

    /// Permission side failed as a whole
    #[error("permission migration failed: {0}")]
    Permissions(#[from] PermissionError),

    /// Unrecognized step name
    #[error("unknown workflow step: {0}")]
    UnknownStep(String),
}

/// Result alias for workflow operations
pub type Result<T> = std::result::Result<T, WorkflowError>;
