//! Dispatch, transform and validate records
//!
//! Records are independent of each other, so batches are spread across the
//! rayon pool. The registry is only read.

use crate::dispatch::{Dispatch, ProfileDispatcher};
use crate::error::{Error, Result};
use crate::issue::{IssueCode, ValidationIssue, ValidationReport};
use crate::transform::TransformEngine;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde_json::Value;
use std::collections::HashMap;

/// What happened to one record.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    /// Name of the profile the record was processed under
    pub profile: Option<String>,
    /// Normalized record; `None` when unrouted or dropped
    pub record: Option<Value>,
    pub report: ValidationReport,
}

impl IngestOutcome {
    pub fn unrouted(resource_type: &str) -> Self {
        let diagnostics = if resource_type.is_empty() {
            "Record has no resourceType and cannot be routed".to_string()
        } else {
            format!("No applicable profile for {} record", resource_type)
        };
        Self {
            profile: None,
            record: None,
            report: ValidationReport::from(vec![ValidationIssue::warning(
                IssueCode::Processing,
                diagnostics,
            )]),
        }
    }

    /// Processed and free of ERROR-severity issues.
    pub fn is_accepted(&self) -> bool {
        self.record.is_some() && !self.report.has_errors()
    }
}

#[derive(Debug, Clone)]
pub struct IngestPipeline {
    dispatchers: HashMap<String, ProfileDispatcher>,
    transform: TransformEngine,
}

impl IngestPipeline {
    pub fn new(transform: TransformEngine) -> Self {
        Self {
            dispatchers: HashMap::new(),
            transform,
        }
    }

    /// Route records of `resource_type` through `dispatcher`.
    pub fn with_dispatcher(
        mut self,
        resource_type: impl Into<String>,
        dispatcher: ProfileDispatcher,
    ) -> Result<Self> {
        let resource_type = resource_type.into();
        if self.dispatchers.contains_key(&resource_type) {
            return Err(Error::DuplicateDispatcher(resource_type));
        }
        self.dispatchers.insert(resource_type, dispatcher);
        Ok(self)
    }

    pub fn dispatcher(&self, resource_type: &str) -> Option<&ProfileDispatcher> {
        self.dispatchers.get(resource_type)
    }

    pub fn transform_engine(&self) -> &TransformEngine {
        &self.transform
    }

    pub fn dispatch(&self, record: &Value) -> Dispatch {
        record
            .get("resourceType")
            .and_then(Value::as_str)
            .and_then(|rt| self.dispatchers.get(rt))
            .map_or(Dispatch::NoApplicableProfile, |d| d.dispatch(record))
    }

    pub fn process(
        &self,
        record: &Value,
        tenant: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> IngestOutcome {
        let dispatch = self.dispatch(record);
        let Some(profile) = dispatch.profile() else {
            let resource_type = record
                .get("resourceType")
                .and_then(Value::as_str)
                .unwrap_or_default();
            tracing::debug!(
                resource_type = %resource_type,
                tenant = %tenant,
                "Record has no applicable profile"
            );
            return IngestOutcome::unrouted(resource_type);
        };

        let outcome = self.transform.transform(record, profile, tenant, as_of);
        IngestOutcome {
            profile: Some(profile.name().to_string()),
            record: outcome.record,
            report: outcome.report,
        }
    }

    /// Process records in parallel; outcomes are in input order.
    pub fn process_batch(&self, records: &[Value], tenant: &str) -> Vec<IngestOutcome> {
        self.process_batch_as_of(records, tenant, None)
    }

    pub fn process_batch_as_of(
        &self,
        records: &[Value],
        tenant: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> Vec<IngestOutcome> {
        let outcomes: Vec<IngestOutcome> = records
            .par_iter()
            .map(|record| self.process(record, tenant, as_of))
            .collect();

        let accepted = outcomes.iter().filter(|o| o.is_accepted()).count();
        tracing::info!(
            tenant = %tenant,
            records = records.len(),
            accepted,
            rejected = records.len() - accepted,
            "Processed batch"
        );

        outcomes
    }
}
