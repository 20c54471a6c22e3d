//! Crawl every registered object type into the inventory and replay the
//! stored ACLs onto backup or account groups

use crate::error::{PermissionError, Result};
use crate::registry::SupportRegistry;
use crate::support::Permissions;
use regroup_framework::{InventoryStore, SnapshotRow, Task, Threads};
use regroup_groups::{Destination, GroupMigrationState};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of [`PermissionManager::inventorize_permissions`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Rows stored with a fetched ACL
    pub fetched: usize,
    /// Rows stored as failed fetches
    pub failed: usize,
    /// Objects that disappeared between listing and fetching
    pub vanished: usize,
    /// Supports whose listing failed, by their first object type
    pub failed_listings: Vec<String>,
}

impl CrawlReport {
    /// Check if every listing and fetch went through
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.failed_listings.is_empty()
    }
}

/// One inventory item that could not be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Object type
    pub object_type: String,
    /// Object id
    pub object_id: String,
    /// Rendered error
    pub error: String,
}

impl ItemFailure {
    fn new(object_type: &str, object_id: &str, error: &PermissionError) -> Self {
        Self {
            object_type: object_type.to_string(),
            object_id: object_id.to_string(),
            error: error.to_string(),
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.object_type, self.object_id, self.error)
    }
}

/// Outcome of [`PermissionManager::apply_group_permissions`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    /// Where permissions were copied to
    pub destination: Destination,
    /// Items whose apply task granted something
    pub applied: usize,
    /// Items not mentioning any migrating group
    pub irrelevant: usize,
    /// Inventory rows skipped because their fetch had failed
    pub skipped_rows: usize,
    /// Items that could not be applied
    pub failures: Vec<ItemFailure>,
}

impl ApplyReport {
    fn empty(destination: Destination) -> Self {
        Self {
            destination,
            applied: 0,
            irrelevant: 0,
            skipped_rows: 0,
            failures: Vec::new(),
        }
    }

    /// Check if no item failed
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drives the registered supports against the inventory
#[derive(Clone)]
pub struct PermissionManager {
    registry: SupportRegistry,
    inventory: Arc<dyn InventoryStore>,
    threads: Threads,
}

impl fmt::Debug for PermissionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionManager")
            .field("registry", &self.registry)
            .field("threads", &self.threads)
            .finish_non_exhaustive()
    }
}

impl PermissionManager {
    /// Create new manager
    #[must_use]
    pub fn new(registry: SupportRegistry, inventory: Arc<dyn InventoryStore>, threads: Threads) -> Self {
        Self {
            registry,
            inventory,
            threads,
        }
    }

    /// Registered supports
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &SupportRegistry {
        &self.registry
    }

    /// Fetch the ACL of every listed object and store one row per object
    ///
    /// A failed fetch is stored as an unsuccessful row instead of aborting the
    /// crawl. A failed listing leaves that support's objects out.
    ///
    /// # Errors
    /// [`PermissionError::Inventory`] if the rows cannot be written.
    pub fn inventorize_permissions(&self) -> Result<CrawlReport> {
        let mut report = CrawlReport::default();
        let mut tasks: Vec<Task<SnapshotRow, PermissionError>> = Vec::new();
        let mut keys: Vec<(String, String)> = Vec::new();
        for support in self.registry.supports() {
            let crawl = match support.crawler_tasks() {
                Ok(crawl) => crawl,
                Err(e) => {
                    let types = support.object_types();
                    error!(object_types = ?types, error = %e, "listing objects failed");
                    report
                        .failed_listings
                        .push(types.into_iter().next().unwrap_or_default());
                    continue;
                }
            };
            for task in crawl {
                keys.push((task.object_type().to_string(), task.object_id().to_string()));
                tasks.push(Box::new(move || {
                    let object_type = task.object_type().to_string();
                    let object_id = task.object_id().to_string();
                    Ok(match task.run() {
                        Ok(fetched) => fetched.map(|permissions| permissions.to_row()),
                        Err(e) => {
                            warn!(%object_type, %object_id, error = %e, "fetching permissions failed");
                            Some(SnapshotRow::failed(object_type, object_id, e.to_string()))
                        }
                    })
                }));
            }
        }

        let total = tasks.len();
        let gathered = self.threads.gather("crawl permissions", tasks);
        let mut rows = gathered.results;
        for panicked in gathered.panicked {
            let (object_type, object_id) = &keys[panicked.index];
            rows.push(SnapshotRow::failed(object_type, object_id, panicked.message));
        }
        report.vanished = total - rows.len();
        report.failed = rows.iter().filter(|row| !row.success).count();
        report.fetched = rows.len() - report.failed;

        self.inventory.append(&rows)?;
        info!(
            fetched = report.fetched,
            failed = report.failed,
            vanished = report.vanished,
            failed_listings = report.failed_listings.len(),
            "stored permission inventory"
        );
        Ok(report)
    }

    /// Grant every `destination` group what its workspace group holds
    ///
    /// # Errors
    /// [`PermissionError::Inventory`] if the inventory cannot be read.
    /// Per-item problems land in [`ApplyReport::failures`].
    pub fn apply_group_permissions(
        &self,
        state: &GroupMigrationState,
        destination: Destination,
    ) -> Result<ApplyReport> {
        let mut report = ApplyReport::empty(destination);
        if state.is_empty() {
            info!(%destination, "no groups to migrate, skipping permission apply");
            return Ok(report);
        }

        let mut by_type: BTreeMap<String, Vec<Permissions>> = BTreeMap::new();
        for row in self.inventory.load_all()? {
            match Permissions::from_row(&row) {
                Some(item) => by_type.entry(item.object_type.clone()).or_default().push(item),
                None => report.skipped_rows += 1,
            }
        }

        let mut tasks: Vec<Task<(), ItemFailure>> = Vec::new();
        let mut keys: Vec<(&str, &str)> = Vec::new();
        for (object_type, items) in &by_type {
            let Some(support) = self.registry.get(object_type) else {
                let unknown = PermissionError::UnknownObjectType(object_type.clone());
                error!(%object_type, items = items.len(), "no support for object type");
                report.failures.extend(
                    items
                        .iter()
                        .map(|item| ItemFailure::new(object_type, &item.object_id, &unknown)),
                );
                continue;
            };
            let mut relevant = 0usize;
            for item in items {
                match support.is_item_relevant(item, state) {
                    Ok(true) => {}
                    Ok(false) => {
                        report.irrelevant += 1;
                        continue;
                    }
                    Err(e) => {
                        error!(%object_type, object_id = %item.object_id, error = %e, "unreadable inventory row");
                        report
                            .failures
                            .push(ItemFailure::new(object_type, &item.object_id, &e));
                        continue;
                    }
                }
                relevant += 1;
                match support.build_apply_task(item, state, destination) {
                    Ok(apply) => {
                        keys.push((object_type.as_str(), item.object_id.as_str()));
                        let object_type = item.object_type.clone();
                        let object_id = item.object_id.clone();
                        tasks.push(Box::new(move || {
                            apply().map_err(|e| ItemFailure::new(&object_type, &object_id, &e))
                        }));
                    }
                    Err(e) => report
                        .failures
                        .push(ItemFailure::new(object_type, &item.object_id, &e)),
                }
            }
            info!(%object_type, total = items.len(), relevant, %destination, "planned permission apply");
        }

        let gathered = self
            .threads
            .gather(&format!("apply permissions to {destination}"), tasks);
        report.applied = gathered.results.len();
        report.failures.extend(gathered.errors);
        report
            .failures
            .extend(gathered.panicked.into_iter().map(|panicked| {
                let (object_type, object_id) = keys[panicked.index];
                ItemFailure {
                    object_type: object_type.to_string(),
                    object_id: object_id.to_string(),
                    error: panicked.message,
                }
            }));

        if report.is_success() {
            info!(%destination, applied = report.applied, "applied group permissions");
        } else {
            error!(
                %destination,
                applied = report.applied,
                failed = report.failures.len(),
                "some permissions could not be applied"
            );
        }
        Ok(report)
    }
}
