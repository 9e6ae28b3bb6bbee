//! Configuration for the request layer

use cumulus_quota::DatastoreQuota;
use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CumulusConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Default permissions of new images
    #[serde(default)]
    pub permissions: PermissionsConfig,

    /// Default datastore quotas
    #[serde(default)]
    pub quotas: QuotaConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Permission defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// Umask applied to users without one
    #[serde(default = "default_umask")]
    pub default_umask: u32,

    /// Allow new objects to grant rights to users outside their group
    #[serde(default)]
    pub enable_other_permissions: bool,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            default_umask: default_umask(),
            enable_other_permissions: false,
        }
    }
}

/// Datastore limits used where no explicit quota is set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default)]
    pub default_user: DatastoreQuota,

    #[serde(default)]
    pub default_group: DatastoreQuota,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_umask() -> u32 {
    0o177
}

impl CumulusConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `CUMULUS_*` environment variables (`CUMULUS_LOGGING__LEVEL`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&CumulusConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CUMULUS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CumulusConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert_eq!(config.permissions.default_umask, 0o177);
        assert_eq!(config.quotas.default_user, DatastoreQuota::unlimited());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[permissions]\nenable_other_permissions = true\n\n[quotas.default_user]\nsize = 4096"
        )
        .unwrap();

        let config = CumulusConfig::load(file.path().to_str()).unwrap();
        assert!(config.permissions.enable_other_permissions);
        assert_eq!(config.permissions.default_umask, 0o177);
        assert_eq!(config.quotas.default_user.size, Some(4096));
        assert_eq!(config.quotas.default_user.images, None);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = CumulusConfig::load(Some("/nonexistent/cumulus.toml")).unwrap();
        assert_eq!(config.logging.level, "info");
    }
}
