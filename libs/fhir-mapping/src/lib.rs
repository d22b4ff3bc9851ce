//! FHIR normalization registry
//!
//! Runtime-configurable, tenant- and profile-aware lookups over concept maps
//! and value sets. The registry is an in-memory index over externally stored
//! mapping documents; it never persists anything itself.
//!
//! - [`RegistryStore`] publishes immutable snapshots; readers never block.
//! - [`ReloadCoordinator`] diffs a fresh listing by `(registry_id, version)`
//!   and swaps in the result atomically.
//! - [`SpecificityResolver`] picks the most specific descriptor with a usable
//!   payload and answers `resolve` / `resolve_set`.
//!
//! # Example
//!
//! ```rust,no_run
//! use ferrum_mapping::{
//!     FileSystemSource, RegistryStore, ReloadCoordinator, ReloadScope, SourceKey,
//!     SpecificityResolver,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RegistryStore::new());
//! let coordinator = ReloadCoordinator::new(
//!     store.clone(),
//!     Arc::new(FileSystemSource::new("/var/lib/registry")),
//! );
//! coordinator.reload(&ReloadScope::tenant("acme")).await?;
//!
//! let resolver = SpecificityResolver::new(store);
//! let target = resolver.resolve(
//!     "acme",
//!     "Appointment.status",
//!     &SourceKey::new("SCH", "urn:acme:appointment-status"),
//!     None,
//! );
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod descriptor;
pub mod document;
pub mod error;
pub mod index;
pub mod reload;
pub mod resolver;
pub mod source;
pub mod store;

pub use config::RegistryConfig;
pub use descriptor::{RegistryDescriptor, RegistryType, SourceKey, TargetValue};
pub use error::{Error, Result};
pub use index::{materialize, ConceptMapIndex, Materialized, Payload, ValueSetIndex};
pub use reload::{DescriptorFailure, ReloadCoordinator, ReloadOptions, ReloadScope, ReloadSummary};
pub use resolver::{Selection, Specificity, SpecificityResolver};
pub use source::{FileSystemSource, RegistrySource};
pub use store::{RegistryEntry, RegistrySnapshot, RegistryStore, StoreState};
