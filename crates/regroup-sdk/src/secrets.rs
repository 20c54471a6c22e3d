//! Secret scope ACLs

use serde::{Deserialize, Serialize};

/// Secret scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretScope {
    /// Scope name
    pub name: String,
}

/// Level granted on a secret scope
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AclPermission {
    Read,
    Write,
    Manage,
}

impl AclPermission {
    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Manage => "MANAGE",
        }
    }
}

/// Scope ACL entry; the principal is a user, group or service principal name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AclItem {
    /// Principal name
    pub principal: String,
    /// Granted level
    pub permission: AclPermission,
}

impl AclItem {
    /// Entry granting `permission` to `principal`
    #[inline]
    #[must_use]
    pub fn new(principal: impl Into<String>, permission: AclPermission) -> Self {
        Self {
            principal: principal.into(),
            permission,
        }
    }
}
