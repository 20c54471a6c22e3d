//! Table ACL grants on metastore securables

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of securable a grant applies to
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SecurableKind {
    #[serde(rename = "CATALOG")]
    Catalog,
    #[serde(rename = "DATABASE")]
    Database,
    #[serde(rename = "TABLE")]
    Table,
    #[serde(rename = "VIEW")]
    View,
    #[serde(rename = "ANY FILE")]
    AnyFile,
}

impl SecurableKind {
    /// All kinds, in grant-statement order
    pub const ALL: [SecurableKind; 5] = [
        SecurableKind::Catalog,
        SecurableKind::Database,
        SecurableKind::Table,
        SecurableKind::View,
        SecurableKind::AnyFile,
    ];

    /// SQL keyword for the securable
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Catalog => "CATALOG",
            Self::Database => "DATABASE",
            Self::Table => "TABLE",
            Self::View => "VIEW",
            Self::AnyFile => "ANY FILE",
        }
    }

    /// Parse the SQL keyword back
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }
}

impl fmt::Display for SecurableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grantable object, e.g. `TABLE hive_metastore.sales.orders`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Securable {
    /// Securable kind
    pub kind: SecurableKind,
    /// Fully-qualified key; empty for `ANY FILE`
    pub key: String,
}

impl Securable {
    /// Securable of `kind` named `key`
    #[inline]
    #[must_use]
    pub fn new(kind: SecurableKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }
}

impl fmt::Display for Securable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} {}", self.kind, self.key)
        }
    }
}

/// One privilege held by one principal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grant {
    /// Principal name
    pub principal: String,
    /// Privilege, e.g. `SELECT`, `MODIFY`, `OWN`
    pub action_type: String,
}

impl Grant {
    /// `action_type` held by `principal`
    #[inline]
    #[must_use]
    pub fn new(principal: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            action_type: action_type.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_keyword() {
        for kind in SecurableKind::ALL {
            assert_eq!(SecurableKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SecurableKind::parse("FUNCTION"), None);
    }

    #[test]
    fn securable_display() {
        assert_eq!(
            Securable::new(SecurableKind::Table, "hive_metastore.db.t").to_string(),
            "TABLE hive_metastore.db.t"
        );
        assert_eq!(Securable::new(SecurableKind::AnyFile, "").to_string(), "ANY FILE");
    }
}
