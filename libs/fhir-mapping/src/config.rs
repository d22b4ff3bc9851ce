//! Registry configuration

use crate::error::{Error, Result};
use crate::reload::ReloadScope;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings for loading and refreshing the normalization registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Seconds between periodic reloads
    pub reload_interval_secs: u64,

    /// Restrict reloads to one tenant (plus universal entries)
    pub tenant: Option<String>,

    /// Root directory of a file-system registry
    pub source_dir: Option<PathBuf>,

    /// Listing file name, relative to `source_dir`
    pub listing_file: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            reload_interval_secs: 300,
            tenant: None,
            source_dir: None,
            listing_file: "listing.json".to_string(),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reload_interval_secs == 0 {
            return Err(Error::Config(
                "reload_interval_secs must be greater than zero".into(),
            ));
        }
        if self.listing_file.trim().is_empty() {
            return Err(Error::Config("listing_file must not be empty".into()));
        }
        if self.tenant.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(Error::Config("tenant must not be blank".into()));
        }
        Ok(())
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs)
    }

    pub fn scope(&self) -> ReloadScope {
        match &self.tenant {
            Some(tenant) => ReloadScope::tenant(tenant.clone()),
            None => ReloadScope::All,
        }
    }
}
