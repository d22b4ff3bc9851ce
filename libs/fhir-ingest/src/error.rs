//! Error types for record ingestion
//!
//! Record-level problems never surface here; they are collected in a
//! [`ValidationReport`](crate::ValidationReport). These errors cover
//! misconfiguration only.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid transform configuration: {0}")]
    Config(String),

    #[error("A dispatcher is already registered for resource type '{0}'")]
    DuplicateDispatcher(String),
}

pub type Result<T> = std::result::Result<T, Error>;
