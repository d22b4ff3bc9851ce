//! Error types for the normalization registry

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to fetch registry listing: {0}")]
    ListingFetch(String),

    #[error("Failed to fetch backing document for {registry_id}: {message}")]
    DocumentFetch {
        registry_id: String,
        message: String,
    },

    #[error("Invalid backing document for {registry_id}: {message}")]
    DocumentParse {
        registry_id: String,
        message: String,
    },

    #[error("Duplicate registry id in listing: {0}")]
    DuplicateRegistryId(String),

    #[error("Invalid registry descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Invalid registry configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
