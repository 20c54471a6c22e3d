//! Error types for the framework layer

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Config file path
        path: String,
        /// Underlying read error
        #[source]
        source: std::io::Error,
    },

    /// YAML did not match the config schema
    #[error("invalid yaml config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML did not match the config schema
    #[error("invalid toml config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Unsupported file extension
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// Values parsed but are inconsistent
    #[error("config validation failed: {0}")]
    Invalid(String),
}

/// Inventory persistence errors
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    /// Filesystem failure
    #[error("inventory io failed at {path}: {source}")]
    Io {
        /// Inventory file path
        path: String,
        /// Underlying filesystem error
        #[source]
        source: std::io::Error,
    },

    /// Stored snapshot could not be decoded or encoded
    #[error("inventory encoding failed at {path}: {source}")]
    Encoding {
        /// Inventory file path
        path: String,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}

/// Umbrella error for framework setup
#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Inventory error
    #[error("inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Subscriber could not be installed
    #[error("logging setup failed: {0}")]
    Logging(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_wraps_into_framework_error() {
        let err: FrameworkError = ConfigError::Invalid("empty prefix".into()).into();
        assert!(err.to_string().contains("empty prefix"));
    }
}
