//! In-memory ledger of groups being migrated

use crate::error::{GroupsError, Result};
use regroup_sdk::Group;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Linked identities of one migrating group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationGroupInfo {
    /// Workspace-local group being replaced
    pub workspace: Group,
    /// Temporary copy holding access during cutover
    pub backup: Group,
    /// Account group taking over
    pub account: Group,
}

impl MigrationGroupInfo {
    /// Logical group name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.workspace.display_name
    }
}

/// Which identity of a triple a group id is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    /// Original workspace group
    Workspace,
    /// Backup group
    Backup,
    /// Account group
    Account,
}

/// Identity permissions are applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// The temporary backup group
    Backup,
    /// The account group
    Account,
}

impl Destination {
    /// Lowercase name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::Account => "account",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Destination {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw {
            "backup" => Ok(Self::Backup),
            "account" => Ok(Self::Account),
            other => Err(format!("unknown destination {other}")),
        }
    }
}

/// Ordered collection of triples, unique per workspace group name
#[derive(Debug, Clone, Default)]
pub struct GroupMigrationState {
    groups: Vec<MigrationGroupInfo>,
    by_name: HashMap<String, usize>,
}

impl GroupMigrationState {
    /// Empty state
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a triple
    ///
    /// # Errors
    /// [`GroupsError::DuplicateMigration`] if the workspace group name is
    /// already tracked.
    pub fn add(&mut self, info: MigrationGroupInfo) -> Result<()> {
        let name = info.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(GroupsError::DuplicateMigration(name));
        }
        self.by_name.insert(name, self.groups.len());
        self.groups.push(info);
        Ok(())
    }

    /// Check if `group_id` is the `role` identity of any tracked group
    #[must_use]
    pub fn is_in_scope(&self, role: GroupRole, group_id: &str) -> bool {
        self.groups.iter().any(|info| {
            let group = match role {
                GroupRole::Workspace => &info.workspace,
                GroupRole::Backup => &info.backup,
                GroupRole::Account => &info.account,
            };
            group.id == group_id
        })
    }

    /// Check if `name` is a tracked workspace group name
    #[inline]
    #[must_use]
    pub fn is_workspace_group_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Triple for a workspace group name
    #[must_use]
    pub fn get_by_workspace_group_name(&self, name: &str) -> Option<&MigrationGroupInfo> {
        self.by_name.get(name).map(|&i| &self.groups[i])
    }

    /// Display name that should replace `workspace_group_name` in ACLs
    #[must_use]
    pub fn get_target_principal(
        &self,
        workspace_group_name: &str,
        destination: Destination,
    ) -> Option<&str> {
        self.get_by_workspace_group_name(workspace_group_name)
            .map(|info| match destination {
                Destination::Backup => info.backup.display_name.as_str(),
                Destination::Account => info.account.display_name.as_str(),
            })
    }

    /// Tracked triples in insertion order
    #[inline]
    #[must_use]
    pub fn groups(&self) -> &[MigrationGroupInfo] {
        &self.groups
    }

    /// Number of tracked groups
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Check if nothing is tracked
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
