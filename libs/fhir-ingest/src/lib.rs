//! Record ingestion on top of the normalization registry
//!
//! Each record is routed to a profile, transformed for its tenant and
//! validated:
//!
//! - [`ProfileDispatcher`] picks the first qualifying profile, or a default.
//! - [`TransformEngine`] normalizes, namespaces and maps coded fields through
//!   the registry, keeping the original values.
//! - [`ValidationEngine`] runs base, guide and profile rules and always
//!   returns a [`ValidationReport`].
//! - [`IngestPipeline`] glues them together and processes batches in parallel.
//!
//! Expected problems are never errors. A record without identity comes back
//! without a normalized record; unmapped codes and rule violations end up in
//! the report.

pub mod dispatch;
pub mod error;
pub mod issue;
pub mod path;
pub mod pipeline;
pub mod profile;
pub mod rules;
pub mod transform;
pub mod validate;

pub use dispatch::{Dispatch, ProfileDispatcher};
pub use error::{Error, Result};
pub use issue::{IssueCode, IssueSeverity, ValidationIssue, ValidationReport};
pub use pipeline::{IngestOutcome, IngestPipeline};
pub use profile::{rule, Predicate, ProfileDescriptor, Rule, RuleContext, TransformHook};
pub use transform::{
    CodedField, CodedShape, TransformConfig, TransformEngine, TransformOutcome, UnmappedPolicy,
};
pub use validate::ValidationEngine;
