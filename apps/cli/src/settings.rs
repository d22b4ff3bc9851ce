//! Layered CLI settings
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file, then `FERRUM_MAPPING__*` environment variables
//! (`FERRUM_MAPPING__REGISTRY__SOURCE_DIR=/srv/registry`).

use anyhow::Context;
use ferrum_ingest::TransformConfig;
use ferrum_mapping::RegistryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_PREFIX: &str = "FERRUM_MAPPING";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub transform: TransformConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for this workspace's crates when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration, reading `.env` first.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        env_file_loaded(dotenvy::dotenv())?;
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> anyhow::Result<Self> {
        let defaults = config::Config::try_from(&Config::default())
            .context("Failed to serialize default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.registry.validate()?;
        self.transform.validate()?;
        Ok(())
    }
}

/// A missing `.env` is fine; one that cannot be read or parsed is not.
fn env_file_loaded<T>(result: dotenvy::Result<T>) -> anyhow::Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e).context("Failed to load .env file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrum_ingest::{CodedShape, UnmappedPolicy};
    use std::io::Write;

    #[test]
    fn test_defaults_without_sources() {
        let config = Config::load_with_prefix(None, "FERRUM_MAPPING_TEST_DEFAULTS").unwrap();
        assert_eq!(config.registry.reload_interval_secs, 300);
        assert_eq!(config.registry.listing_file, "listing.json");
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[registry]
source_dir = "/srv/registry"
tenant = "acme"
reload_interval_secs = 60

[transform]
unmapped = "reject"

[[transform.coded_fields]]
resource_type = "Appointment"
path = "status"
data_element = "Appointment.status"
shape = "code"
source_system = "urn:acme:appointment-status"

[logging]
json = true
"#
        )
        .unwrap();

        let config =
            Config::load_with_prefix(Some(file.path()), "FERRUM_MAPPING_TEST_FILE").unwrap();
        assert_eq!(config.registry.tenant.as_deref(), Some("acme"));
        assert_eq!(config.registry.reload_interval_secs, 60);
        assert_eq!(config.registry.listing_file, "listing.json");
        assert_eq!(config.transform.unmapped, UnmappedPolicy::Reject);
        assert_eq!(config.transform.coded_fields[0].shape, CodedShape::Code);
        assert!(config.logging.json);
    }

    #[test]
    fn test_environment_overrides_file() {
        std::env::set_var("FERRUM_MAPPING_TEST_ENV__REGISTRY__TENANT", "globex");
        std::env::set_var("FERRUM_MAPPING_TEST_ENV__LOGGING__LEVEL", "debug");

        let config = Config::load_with_prefix(None, "FERRUM_MAPPING_TEST_ENV").unwrap();
        assert_eq!(config.registry.tenant.as_deref(), Some("globex"));
        assert_eq!(config.logging.level, "debug");

        std::env::remove_var("FERRUM_MAPPING_TEST_ENV__REGISTRY__TENANT");
        std::env::remove_var("FERRUM_MAPPING_TEST_ENV__LOGGING__LEVEL");
    }

    #[test]
    fn test_env_file_errors() {
        let missing = dotenvy::from_path("/nonexistent/.env");
        assert!(env_file_loaded(missing).is_ok());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "FERRUM_MAPPING_TEST_DOTENV=\"unterminated").unwrap();
        let malformed = dotenvy::from_path(file.path());
        assert!(env_file_loaded(malformed).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = Config::load_with_prefix(
            Some(Path::new("/nonexistent/ferrum-map.toml")),
            "FERRUM_MAPPING_TEST_MISSING",
        );
        assert!(result.is_err());
    }
}
