//! regroup framework
//!
//! Shared machinery for the migration crates:
//! - [`Threads`]: fixed-size worker pool that gathers results and errors
//! - [`hardening`]: retry with backoff around an in-flight rate gate
//! - [`inventory`]: persisted permission snapshot rows
//! - [`config`]: run configuration
//! - [`logging`]: `tracing` subscriber setup

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod hardening;
pub mod inventory;
pub mod logging;
pub mod parallel;

pub use config::{GroupsConfig, LogSettings, MigrationConfig, RateLimits, RetrySettings};
pub use error::{ConfigError, FrameworkError, InventoryError};
pub use hardening::{retried, Hardened, RateLimiter, RetryConfig, Transient};
pub use inventory::{InventoryStore, JsonFileInventory, MemoryInventory, SnapshotRow};
pub use parallel::{Gathered, Panicked, Task, Threads};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
