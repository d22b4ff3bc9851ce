//! Registry sources
//!
//! A [`RegistrySource`] supplies the descriptor listing and the backing
//! documents it points at. The HTTP client of the upstream registry lives
//! outside this crate and plugs in by implementing the trait;
//! [`FileSystemSource`] serves a registry laid out on disk.

use crate::config::RegistryConfig;
use crate::descriptor::RegistryDescriptor;
use crate::error::{Error, Result};
use crate::reload::ReloadScope;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Descriptor identities (no payload) for `scope`: the tenant's own
    /// entries plus universal ones.
    async fn list_descriptors(&self, scope: &ReloadScope) -> Result<Vec<RegistryDescriptor>>;

    /// Raw backing document for `descriptor`.
    async fn fetch_document(&self, descriptor: &RegistryDescriptor) -> Result<Value>;
}

/// Registry laid out as a JSON listing file plus one JSON document per
/// descriptor, with document locations relative to the root directory.
#[derive(Debug, Clone)]
pub struct FileSystemSource {
    root: PathBuf,
    listing_file: String,
}

impl FileSystemSource {
    pub const DEFAULT_LISTING_FILE: &'static str = "listing.json";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            listing_file: Self::DEFAULT_LISTING_FILE.to_string(),
        }
    }

    pub fn with_listing_file(mut self, listing_file: impl Into<String>) -> Self {
        self.listing_file = listing_file.into();
        self
    }

    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        let root = config
            .source_dir
            .as_ref()
            .ok_or_else(|| Error::Config("source_dir is required for the file system source".into()))?;
        Ok(Self::new(root).with_listing_file(config.listing_file.clone()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn listing_path(&self) -> PathBuf {
        self.root.join(&self.listing_file)
    }
}

#[async_trait]
impl RegistrySource for FileSystemSource {
    async fn list_descriptors(&self, scope: &ReloadScope) -> Result<Vec<RegistryDescriptor>> {
        let path = self.listing_path();
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::ListingFetch(format!("{}: {}", path.display(), e)))?;
        let listing: Vec<RegistryDescriptor> = serde_json::from_slice(&bytes)
            .map_err(|e| Error::ListingFetch(format!("{}: {}", path.display(), e)))?;

        Ok(listing.into_iter().filter(|d| scope.covers(d)).collect())
    }

    async fn fetch_document(&self, descriptor: &RegistryDescriptor) -> Result<Value> {
        let path = self.root.join(&descriptor.backing_document_location);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::DocumentFetch {
                registry_id: descriptor.registry_id.clone(),
                message: format!("{}: {}", path.display(), e),
            })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
