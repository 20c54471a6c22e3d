//! regroup groups
//!
//! Moves workspace-local groups onto account groups of the same name:
//!
//! 1. [`GroupDirectory`] caches both group namespaces
//! 2. [`MigrationPlanner`] pairs names across levels and creates backup groups
//! 3. [`GroupMigrationState`] records the `{workspace, backup, account}` triples
//! 4. [`ReplacementExecutor`] deletes workspace groups and reflects account groups
//! 5. [`BackupCleanup`] removes the backups at the end
//!
//! [`GroupManager`] wires all of them from a [`regroup_framework::MigrationConfig`].

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod cleanup;
pub mod directory;
pub mod error;
pub mod executor;
pub mod manager;
pub mod planner;
pub mod state;

pub use cleanup::{BackupCleanup, CleanupReport};
pub use directory::{is_system_group, GroupDirectory, SYSTEM_GROUPS};
pub use error::{GroupFailure, GroupsError, Result, TransitionError};
pub use executor::{
    allowed_transitions, validate_transition, ReplacementExecutor, ReplacementOutcome,
    ReplacementReport, ReplacementState,
};
pub use manager::GroupManager;
pub use planner::{MigrationPlanner, PlanningReport, Resolution, SkipReason, SkippedGroup};
pub use state::{Destination, GroupMigrationState, GroupRole, MigrationGroupInfo};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
