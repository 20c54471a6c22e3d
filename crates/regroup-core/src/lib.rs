//! regroup core
//!
//! Wires the group and permission halves into one resumable run:
//!
//! ```rust,ignore
//! let clients = WorkspaceClients::from_workspace(&workspace)
//!     .with_listing(Listing::new("cluster-policies", list_policies));
//! let config = MigrationConfig::load(Path::new("regroup.yml"))?;
//! init_logging(&config)?;
//!
//! let workflow = GroupMigrationWorkflow::new(&clients, &config)?;
//! let summary = workflow.run()?;
//! if summary.is_success() {
//!     workflow.remove_backup_groups();
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod clients;
pub mod error;
pub mod workflow;

pub use clients::WorkspaceClients;
pub use error::{Result, WorkflowError};
pub use workflow::{init_logging, GroupMigrationWorkflow, MigrationSummary, Step};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
