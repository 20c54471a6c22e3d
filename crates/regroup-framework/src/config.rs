//! Run configuration
//!
//! Loaded from YAML or TOML. Only `groups` is required; everything else has a
//! default tuned for a real workspace.
//!
//! ```yaml
//! groups:
//!   selected: [data-eng, analysts]
//!   backup_group_prefix: "db-temp-"
//! num_threads: 8
//! rate_limits:
//!   create: 5
//! ```

use crate::error::ConfigError;
use crate::hardening::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default prefix for temporary backup groups
pub const DEFAULT_BACKUP_GROUP_PREFIX: &str = "db-temp-";

/// Which groups to migrate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupsConfig {
    /// Explicit group names; takes precedence over `auto`
    #[serde(default)]
    pub selected: Option<Vec<String>>,
    /// Discover every workspace group that has an account group of the same name
    #[serde(default)]
    pub auto: bool,
    /// Prefix for backup group names
    #[serde(default = "default_backup_group_prefix")]
    pub backup_group_prefix: String,
}

fn default_backup_group_prefix() -> String {
    DEFAULT_BACKUP_GROUP_PREFIX.to_string()
}

impl GroupsConfig {
    /// Migrate exactly `names`
    #[must_use]
    pub fn selected<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selected: Some(names.into_iter().map(Into::into).collect()),
            auto: false,
            backup_group_prefix: default_backup_group_prefix(),
        }
    }

    /// Discovery mode
    #[must_use]
    pub fn auto() -> Self {
        Self {
            selected: None,
            auto: true,
            backup_group_prefix: default_backup_group_prefix(),
        }
    }

    /// With a custom backup prefix
    #[inline]
    #[must_use]
    pub fn with_backup_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.backup_group_prefix = prefix.into();
        self
    }

    /// Explicit names, if any were given
    #[must_use]
    pub fn selected_names(&self) -> Option<&[String]> {
        self.selected.as_deref().filter(|names| !names.is_empty())
    }

    /// Backup name for `group_name`
    #[must_use]
    pub fn backup_name(&self, group_name: &str) -> String {
        format!("{}{group_name}", self.backup_group_prefix)
    }

    /// Check the selection is usable
    ///
    /// # Errors
    /// - neither `selected` nor `auto` given
    /// - empty backup prefix
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.selected_names().is_none() && !self.auto {
            return Err(ConfigError::Invalid(
                "either groups.selected or groups.auto must be set".into(),
            ));
        }
        if self.backup_group_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "groups.backup_group_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Serializable form of [`RetryConfig`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per remote call
    pub max_attempts: u32,
    /// First backoff delay in milliseconds
    pub initial_delay_ms: u64,
    /// Backoff ceiling in milliseconds
    pub max_delay_ms: u64,
    /// Backoff growth factor
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_attempts: retry.max_attempts,
            initial_delay_ms: u64::try_from(retry.initial_delay.as_millis()).unwrap_or(u64::MAX),
            max_delay_ms: u64::try_from(retry.max_delay.as_millis()).unwrap_or(u64::MAX),
            backoff_multiplier: retry.backoff_multiplier,
        }
    }
}

impl RetrySettings {
    /// Runtime retry policy
    #[must_use]
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

/// In-flight ceilings per kind of remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    /// Backup group creation
    pub create: usize,
    /// Group deletion
    pub delete: usize,
    /// Account group reflection
    pub reflect: usize,
    /// ACL updates
    pub permissions: usize,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            create: 5,
            delete: 5,
            reflect: 10,
            permissions: 30,
        }
    }
}

/// Logging output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Full run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Group selection
    pub groups: GroupsConfig,
    /// Worker pool size; two per core when unset
    #[serde(default)]
    pub num_threads: Option<usize>,
    /// Retry policy for remote calls
    #[serde(default)]
    pub retry: RetrySettings,
    /// In-flight ceilings
    #[serde(default)]
    pub rate_limits: RateLimits,
    /// Logging output
    #[serde(default)]
    pub log: LogSettings,
    /// File-backed inventory location; in-memory when unset
    #[serde(default)]
    pub inventory_path: Option<PathBuf>,
}

impl MigrationConfig {
    /// Config with defaults around `groups`
    #[must_use]
    pub fn new(groups: GroupsConfig) -> Self {
        Self {
            groups,
            num_threads: None,
            retry: RetrySettings::default(),
            rate_limits: RateLimits::default(),
            log: LogSettings::default(),
            inventory_path: None,
        }
    }

    /// With a fixed worker count
    #[inline]
    #[must_use]
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// With a retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// With in-flight ceilings
    #[inline]
    #[must_use]
    pub fn with_rate_limits(mut self, rate_limits: RateLimits) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    /// Parse and validate YAML
    ///
    /// # Errors
    /// Parse failures and [`MigrationConfig::validate`] failures
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// Parse failures and [`MigrationConfig::validate`] failures
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.yml`, `.yaml` or `.toml` file
    ///
    /// # Errors
    /// Read, format and validation failures
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yml" | "yaml") => Self::from_yaml_str(&raw),
            Some("toml") => Self::from_toml_str(&raw),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    /// Check cross-field consistency
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] describing the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.groups.validate()?;
        if self.num_threads == Some(0) {
            return Err(ConfigError::Invalid("num_threads must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be positive".into()));
        }
        let limits = self.rate_limits;
        if [limits.create, limits.delete, limits.reflect, limits.permissions].contains(&0) {
            return Err(ConfigError::Invalid("rate limits must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn yaml_with_defaults() {
        let config = MigrationConfig::from_yaml_str(
            "groups:\n  selected: [data-eng]\n",
        )
        .unwrap();

        assert_eq!(config.groups.selected_names(), Some(&["data-eng".to_string()][..]));
        assert_eq!(config.groups.backup_group_prefix, "db-temp-");
        assert_eq!(config.rate_limits, RateLimits::default());
        assert_eq!(config.retry.to_retry_config(), RetryConfig::default());
        assert!(config.inventory_path.is_none());
    }

    #[test]
    fn toml_overrides() {
        let config = MigrationConfig::from_toml_str(
            r#"
            num_threads = 4

            [groups]
            auto = true
            backup_group_prefix = "bak-"

            [rate_limits]
            create = 2

            [log]
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(config.num_threads, Some(4));
        assert!(config.groups.auto);
        assert_eq!(config.groups.backup_name("ops"), "bak-ops");
        assert_eq!(config.rate_limits.create, 2);
        assert_eq!(config.rate_limits.reflect, 10);
        assert!(config.log.json);
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    fn rejects_missing_selection() {
        let err = MigrationConfig::from_yaml_str("groups:\n  auto: false\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let empty = GroupsConfig {
            selected: Some(Vec::new()),
            auto: false,
            backup_group_prefix: "db-temp-".into(),
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn rejects_empty_prefix_and_zero_limits() {
        assert!(GroupsConfig::auto().with_backup_prefix("").validate().is_err());

        let config = MigrationConfig::new(GroupsConfig::auto()).with_rate_limits(RateLimits {
            delete: 0,
            ..RateLimits::default()
        });
        assert!(config.validate().is_err());
        assert!(MigrationConfig::new(GroupsConfig::auto())
            .with_num_threads(0)
            .validate()
            .is_err());
    }

    #[test]
    fn selected_takes_precedence() {
        let mut groups = GroupsConfig::selected(["a", "b"]);
        groups.auto = true;
        assert_eq!(groups.selected_names().map(<[String]>::len), Some(2));
        assert_eq!(GroupsConfig::auto().selected_names(), None);
    }
}
