//! regroup permissions
//!
//! Captures who can do what on workspace objects before groups are swapped,
//! and grants the same access to backup and account groups afterwards.
//!
//! Each family of object types is handled by a [`PermissionSupport`] adapter
//! registered in a [`SupportRegistry`]. The [`PermissionManager`] crawls every
//! adapter into the inventory and replays the stored rows onto a
//! [`regroup_groups::Destination`].

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod generic;
pub mod manager;
pub mod registry;
pub mod scim;
pub mod secrets;
pub mod support;
pub mod tables;

pub use error::{PermissionError, Result};
pub use generic::{object_types, GenericPermissionsSupport, Listing};
pub use manager::{ApplyReport, CrawlReport, ItemFailure, PermissionManager};
pub use registry::SupportRegistry;
pub use scim::{EntitlementsSupport, ENTITLEMENTS, ROLES};
pub use secrets::{SecretScopesSupport, SECRETS};
pub use support::{
    noop_task, response_to_request, ApplyTask, CrawlTask, PermissionSupport, Permissions,
};
pub use tables::TableGrantsSupport;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
