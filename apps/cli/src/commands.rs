//! Subcommand implementations

use anyhow::{bail, Context};
use ferrum_ingest::{
    rules, IngestOutcome, IngestPipeline, ProfileDescriptor, ProfileDispatcher, TransformConfig,
    TransformEngine, ValidationEngine,
};
use ferrum_mapping::{
    ReloadCoordinator, ReloadOptions, ReloadScope, ReloadSummary, SourceKey, SpecificityResolver,
};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

pub async fn reload(
    coordinator: &ReloadCoordinator,
    scope: &ReloadScope,
    force: bool,
) -> anyhow::Result<()> {
    let summary = coordinator
        .reload_with(scope, ReloadOptions { force })
        .await
        .with_context(|| format!("Failed to reload registry ({scope})"))?;
    print_json(&summary_json(&summary))
}

pub async fn resolve(
    coordinator: &ReloadCoordinator,
    scope: &ReloadScope,
    tenant: &str,
    element: &str,
    source_key: &SourceKey,
    profile_url: Option<&str>,
) -> anyhow::Result<()> {
    load(coordinator, scope).await?;
    let resolver = SpecificityResolver::new(coordinator.store().clone());
    let target = resolver.resolve(tenant, element, source_key, profile_url);
    if target.is_none() {
        tracing::info!(source = %source_key, element = %element, "No mapping found");
    }
    print_json(&serde_json::to_value(target)?)
}

pub async fn resolve_set(
    coordinator: &ReloadCoordinator,
    scope: &ReloadScope,
    tenant: &str,
    element: &str,
    profile_url: Option<&str>,
) -> anyhow::Result<()> {
    load(coordinator, scope).await?;
    let resolver = SpecificityResolver::new(coordinator.store().clone());
    print_json(&serde_json::to_value(resolver.resolve_set(tenant, element, profile_url))?)
}

pub async fn watch(
    coordinator: &ReloadCoordinator,
    scope: ReloadScope,
    interval: Duration,
) -> anyhow::Result<()> {
    tracing::info!(
        scope = %scope,
        interval_secs = interval.as_secs(),
        "Watching registry, press Ctrl+C to stop"
    );

    tokio::select! {
        _ = coordinator.run_periodic(scope, interval) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            tracing::info!(
                generation = coordinator.store().generation(),
                "Stopping registry watch"
            );
        }
    }
    Ok(())
}

pub async fn ingest(
    coordinator: &ReloadCoordinator,
    scope: &ReloadScope,
    tenant: &str,
    transform: &TransformConfig,
    profile_url: Option<&str>,
    file: &Path,
) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read records from {}", file.display()))?;
    let document: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse records in {}", file.display()))?;
    let records = records_of(document)?;

    load(coordinator, scope).await?;
    let resolver = SpecificityResolver::new(coordinator.store().clone());
    let pipeline = generic_pipeline(resolver, transform, profile_url, &records)?;

    let outcomes = pipeline.process_batch(&records, tenant);
    let accepted = outcomes.iter().filter(|o| o.is_accepted()).count();
    tracing::info!(
        file = %file.display(),
        records = records.len(),
        accepted,
        "Ingested records"
    );

    print_json(&Value::Array(outcomes.iter().map(outcome_json).collect()))
}

/// One generic profile per resource type in the batch. Each coded field
/// binding also gets a value set membership check.
fn generic_pipeline(
    resolver: SpecificityResolver,
    transform: &TransformConfig,
    profile_url: Option<&str>,
    records: &[Value],
) -> anyhow::Result<IngestPipeline> {
    let resource_types: BTreeSet<&str> = records
        .iter()
        .filter_map(|r| r.get("resourceType").and_then(Value::as_str))
        .collect();

    let validator = ValidationEngine::with_core_rules(resolver);
    let mut pipeline = IngestPipeline::new(TransformEngine::new(validator, transform.clone()));

    for resource_type in resource_types {
        let mut profile = ProfileDescriptor::new(format!("generic-{}", resource_type));
        if let Some(url) = profile_url {
            profile = profile.with_url(url);
        }
        for field in &transform.coded_fields {
            if field
                .resource_type
                .as_deref()
                .map_or(true, |t| t == resource_type)
            {
                profile = profile.with_extended_rule(rules::value_set_member(
                    field.path.clone(),
                    field.data_element.clone(),
                ));
            }
        }
        pipeline = pipeline.with_dispatcher(
            resource_type,
            ProfileDispatcher::new().with_default(profile),
        )?;
    }

    Ok(pipeline)
}

async fn load(coordinator: &ReloadCoordinator, scope: &ReloadScope) -> anyhow::Result<()> {
    let summary = coordinator
        .reload(scope)
        .await
        .with_context(|| format!("Failed to load registry ({scope})"))?;
    for failure in &summary.failures {
        tracing::warn!(
            registry_id = %failure.registry_id,
            error = %failure.message,
            "Registry entry unavailable"
        );
    }
    Ok(())
}

/// Accepts a JSON array of resources, a single resource or a Bundle.
fn records_of(document: Value) -> anyhow::Result<Vec<Value>> {
    match document {
        Value::Array(records) => Ok(records),
        Value::Object(ref map) if map.get("resourceType").and_then(Value::as_str) == Some("Bundle") => {
            Ok(map
                .get("entry")
                .and_then(Value::as_array)
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|e| e.get("resource").cloned())
                        .collect()
                })
                .unwrap_or_default())
        }
        Value::Object(_) => Ok(vec![document]),
        _ => bail!("Expected a resource, an array of resources or a Bundle"),
    }
}

fn summary_json(summary: &ReloadSummary) -> Value {
    json!({
        "generation": summary.generation,
        "added": summary.added,
        "updated": summary.updated,
        "retained": summary.retained.len(),
        "evicted": summary.evicted,
        "documents_fetched": summary.documents_fetched,
        "failures": summary.failures.iter().map(|f| json!({
            "registry_id": f.registry_id,
            "message": f.message,
        })).collect::<Vec<_>>(),
    })
}

fn outcome_json(outcome: &IngestOutcome) -> Value {
    json!({
        "profile": outcome.profile,
        "accepted": outcome.is_accepted(),
        "record": outcome.record,
        "outcome": outcome.report.to_operation_outcome(),
    })
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrum_ingest::{CodedField, CodedShape};
    use ferrum_mapping::RegistryStore;
    use std::sync::Arc;

    #[test]
    fn test_records_of_accepts_bundles_and_arrays() {
        let bundle = json!({
            "resourceType": "Bundle",
            "entry": [
                { "resource": { "resourceType": "Patient", "id": "1" } },
                { "fullUrl": "urn:uuid:2" }
            ]
        });
        assert_eq!(records_of(bundle).unwrap().len(), 1);
        assert_eq!(records_of(json!([{}, {}])).unwrap().len(), 2);
        assert_eq!(records_of(json!({ "resourceType": "Patient" })).unwrap().len(), 1);
        assert!(records_of(json!("nope")).is_err());
    }

    #[test]
    fn test_generic_pipeline_routes_every_type_in_batch() {
        let resolver = SpecificityResolver::new(Arc::new(RegistryStore::new()));
        let transform = TransformConfig {
            coded_fields: vec![CodedField::new("status", "Appointment.status", CodedShape::Code)
                .for_resource("Appointment")],
            ..Default::default()
        };
        let records = vec![
            json!({ "resourceType": "Appointment", "id": "a1", "status": "booked" }),
            json!({ "resourceType": "Patient", "id": "p1" }),
        ];

        let pipeline = generic_pipeline(resolver, &transform, None, &records).unwrap();
        let outcomes = pipeline.process_batch(&records, "acme");

        assert_eq!(outcomes[0].profile.as_deref(), Some("generic-Appointment"));
        assert_eq!(outcomes[1].profile.as_deref(), Some("generic-Patient"));
        // Empty registry: the unmapped status is only a warning
        assert!(outcomes.iter().all(|o| o.is_accepted()));
    }
}
