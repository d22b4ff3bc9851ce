//! Tenant-aware record transformation
//!
//! Stages, in order:
//! 1. structural normalization: drop nulls and empties, run the profile hook,
//!    stamp `meta.profile`
//! 2. namespace `id` and relative references by tenant
//! 3. normalize coded fields through the registry, keeping the original
//!    value in an extension
//! 4. attach tenant, source id and data authority identifiers
//!
//! The candidate output is then checked by the [`ValidationEngine`] and its
//! issues join the same report.
//!
//! A record without `resourceType` or `id` is dropped: the outcome carries
//! no record and a report naming the missing field.

use crate::error::{Error, Result};
use crate::issue::{IssueCode, ValidationIssue, ValidationReport};
use crate::path;
use crate::profile::ProfileDescriptor;
use crate::validate::ValidationEngine;
use chrono::{DateTime, Utc};
use ferrum_mapping::{SourceKey, SpecificityResolver, TargetValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// How a coded value is shaped in the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodedShape {
    /// Primitive `code`
    Code,
    Coding,
    CodeableConcept,
}

/// Binds a record path to the registry data element that normalizes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodedField {
    /// Only records of this type; every type when unset
    #[serde(default)]
    pub resource_type: Option<String>,
    /// Path relative to the resource root, e.g. `class` or `type.coding`
    pub path: String,
    pub data_element: String,
    pub shape: CodedShape,
    /// System used to look up primitive codes, which carry none themselves
    #[serde(default)]
    pub source_system: Option<String>,
}

impl CodedField {
    pub fn new(path: impl Into<String>, data_element: impl Into<String>, shape: CodedShape) -> Self {
        Self {
            resource_type: None,
            path: path.into(),
            data_element: data_element.into(),
            shape,
            source_system: None,
        }
    }

    pub fn for_resource(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn with_source_system(mut self, system: impl Into<String>) -> Self {
        self.source_system = Some(system.into());
        self
    }

    fn applies_to(&self, resource_type: &str) -> bool {
        self.resource_type
            .as_deref()
            .map_or(true, |t| t == resource_type)
    }
}

/// What to do with a coded value the registry cannot map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedPolicy {
    /// Keep the source value and warn
    #[default]
    PassThrough,
    /// Keep the source value and report an error
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub tenant_identifier_system: String,
    pub source_id_identifier_system: String,
    pub data_authority_identifier_system: String,
    /// Value of the data authority identifier; not attached when unset
    pub data_authority: Option<String>,
    /// Extension that records the pre-normalization value
    pub source_extension_url: String,
    pub coded_fields: Vec<CodedField>,
    pub unmapped: UnmappedPolicy,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            tenant_identifier_system: "urn:ferrum:identifier:tenant".to_string(),
            source_id_identifier_system: "urn:ferrum:identifier:source-id".to_string(),
            data_authority_identifier_system: "urn:ferrum:identifier:data-authority".to_string(),
            data_authority: None,
            source_extension_url: "urn:ferrum:extension:source-value".to_string(),
            coded_fields: Vec::new(),
            unmapped: UnmappedPolicy::PassThrough,
        }
    }
}

impl TransformConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("tenant_identifier_system", &self.tenant_identifier_system),
            ("source_id_identifier_system", &self.source_id_identifier_system),
            (
                "data_authority_identifier_system",
                &self.data_authority_identifier_system,
            ),
            ("source_extension_url", &self.source_extension_url),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{} must not be empty", name)));
            }
        }
        for field in &self.coded_fields {
            if field.path.trim().is_empty() || field.data_element.trim().is_empty() {
                return Err(Error::Config(format!(
                    "coded field '{}' needs both a path and a data element",
                    field.path
                )));
            }
        }
        Ok(())
    }
}

/// Result of transforming one record.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutcome {
    /// Normalized record; `None` when the record was dropped
    pub record: Option<Value>,
    pub report: ValidationReport,
}

impl TransformOutcome {
    pub fn dropped(report: ValidationReport) -> Self {
        Self {
            record: None,
            report,
        }
    }

    pub fn is_dropped(&self) -> bool {
        self.record.is_none()
    }
}

/// Normalizes records and validates the result.
///
/// Lookups go through the validator's resolver, so both stages read the
/// same registry.
#[derive(Debug, Clone)]
pub struct TransformEngine {
    resolver: SpecificityResolver,
    config: TransformConfig,
    validator: ValidationEngine,
}

impl TransformEngine {
    pub fn new(validator: ValidationEngine, config: TransformConfig) -> Self {
        Self {
            resolver: validator.resolver().clone(),
            config,
            validator,
        }
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    pub fn validator(&self) -> &ValidationEngine {
        &self.validator
    }

    pub fn transform(
        &self,
        record: &Value,
        profile: &ProfileDescriptor,
        tenant: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> TransformOutcome {
        let mut record = record.clone();
        let mut report = ValidationReport::new();

        // Stage 1
        strip_empty(&mut record);
        let (resource_type, id) = match identity(&record) {
            Ok(identity) => identity,
            Err(issue) => {
                tracing::debug!(
                    tenant = %tenant,
                    reason = %issue,
                    "Dropping record without identity"
                );
                report.push(issue);
                return TransformOutcome::dropped(report);
            }
        };
        profile.apply_transform(&mut record);
        if let Some(url) = profile.url() {
            stamp_profile(&mut record, url);
        }

        // Stage 2
        record["id"] = json!(namespaced(tenant, &id));
        namespace_references(&mut record, tenant);

        // Stage 3
        let fields = self
            .config
            .coded_fields
            .iter()
            .chain(profile.coded_fields())
            .filter(|f| f.applies_to(&resource_type));
        for field in fields {
            let mut normalizer = FieldNormalizer {
                resolver: &self.resolver,
                config: &self.config,
                field,
                tenant,
                resource_type: &resource_type,
                profile_url: profile.url(),
                as_of,
                report: &mut report,
            };
            normalizer.apply(&mut record);
        }

        // Stage 4
        self.attach_identifiers(&mut record, tenant, &id);

        report.merge(self.validator.validate(&record, profile, tenant));

        tracing::debug!(
            resource_type = %resource_type,
            id = %id,
            tenant = %tenant,
            profile = %profile.name(),
            issues = report.issues.len(),
            "Transformed record"
        );

        TransformOutcome {
            record: Some(record),
            report,
        }
    }

    fn attach_identifiers(&self, record: &mut Value, tenant: &str, source_id: &str) {
        let mut identifiers = vec![
            (self.config.tenant_identifier_system.as_str(), tenant),
            (self.config.source_id_identifier_system.as_str(), source_id),
        ];
        if let Some(authority) = &self.config.data_authority {
            identifiers.push((
                self.config.data_authority_identifier_system.as_str(),
                authority.as_str(),
            ));
        }

        let Some(object) = record.as_object_mut() else {
            return;
        };
        let list = object
            .entry("identifier")
            .or_insert_with(|| Value::Array(Vec::new()));
        if !list.is_array() {
            *list = Value::Array(vec![list.take()]);
        }
        let Some(list) = list.as_array_mut() else {
            return;
        };

        for (system, value) in identifiers {
            let present = list
                .iter()
                .any(|i| i.get("system").and_then(Value::as_str) == Some(system));
            if !present {
                list.push(json!({ "system": system, "value": value }));
            }
        }
    }
}

/// `resourceType` and `id`, or the issue explaining which one is missing.
fn identity(record: &Value) -> std::result::Result<(String, String), ValidationIssue> {
    let resource_type = record
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ValidationIssue::error(IssueCode::Required, "Record has no resourceType")
                .with_location("resourceType")
        })?;
    let id = record.get("id").and_then(Value::as_str).ok_or_else(|| {
        ValidationIssue::error(
            IssueCode::Required,
            format!("{} record has no id", resource_type),
        )
        .with_location(format!("{}.id", resource_type))
    })?;
    Ok((resource_type.to_string(), id.to_string()))
}

/// Remove nulls, empty strings, empty arrays and empty objects, bottom-up.
pub(crate) fn strip_empty(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for child in map.values_mut() {
                strip_empty(child);
            }
            map.retain(|_, v| !is_empty(v));
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                strip_empty(item);
            }
            items.retain(|v| !is_empty(v));
        }
        _ => {}
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn stamp_profile(record: &mut Value, url: &str) {
    let Some(object) = record.as_object_mut() else {
        return;
    };
    let meta = object.entry("meta").or_insert_with(|| json!({}));
    let Some(meta) = meta.as_object_mut() else {
        return;
    };
    let profiles = meta.entry("profile").or_insert_with(|| json!([]));
    if let Some(profiles) = profiles.as_array_mut() {
        if !profiles.iter().any(|p| p.as_str() == Some(url)) {
            profiles.push(json!(url));
        }
    }
}

/// Always prefixed, so `5` and `<tenant>-5` stay distinct.
fn namespaced(tenant: &str, id: &str) -> String {
    format!("{}-{}", tenant, id)
}

/// Rewrite relative `Type/id` references to `Type/<tenant>-<id>`.
pub(crate) fn namespace_references(value: &mut Value, tenant: &str) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                match child {
                    Value::String(reference) if key == "reference" => {
                        if let Some(rewritten) = namespace_reference(reference, tenant) {
                            *reference = rewritten;
                        }
                    }
                    _ => namespace_references(child, tenant),
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                namespace_references(item, tenant);
            }
        }
        _ => {}
    }
}

fn namespace_reference(reference: &str, tenant: &str) -> Option<String> {
    if reference.starts_with('#') || reference.contains(':') {
        return None;
    }
    let (resource_type, rest) = reference.split_once('/')?;
    if !resource_type.starts_with(|c: char| c.is_ascii_uppercase()) || rest.is_empty() {
        return None;
    }
    Some(format!("{}/{}", resource_type, namespaced(tenant, rest)))
}

/// Stage 3 for one coded field.
struct FieldNormalizer<'a> {
    resolver: &'a SpecificityResolver,
    config: &'a TransformConfig,
    field: &'a CodedField,
    tenant: &'a str,
    resource_type: &'a str,
    profile_url: Option<&'a str>,
    as_of: Option<DateTime<Utc>>,
    report: &'a mut ValidationReport,
}

impl FieldNormalizer<'_> {
    fn apply(&mut self, record: &mut Value) {
        let field = self.field;
        match field.shape {
            CodedShape::Code => {
                path::for_each_parent_mut(
                    record,
                    &field.path,
                    &mut |owner: &mut Map<String, Value>, key: &str| self.normalize_code(owner, key),
                );
            }
            CodedShape::Coding => {
                path::for_each_mut(record, &field.path, &mut |coding: &mut Value| {
                    self.normalize_coding(coding)
                });
            }
            CodedShape::CodeableConcept => {
                path::for_each_mut(record, &field.path, &mut |concept: &mut Value| {
                    self.normalize_concept(concept)
                });
            }
        }
    }

    fn lookup(&self, code: &str, system: &str) -> Option<TargetValue> {
        self.resolver.resolve_as_of(
            self.tenant,
            &self.field.data_element,
            &SourceKey::new(code, system),
            self.profile_url,
            self.as_of,
        )
    }

    fn source_extension(&self, value_key: &str, original: Value) -> Value {
        json!({ "url": self.config.source_extension_url, value_key: original })
    }

    /// Primitive code; the original goes on the `_<key>` sibling element.
    fn normalize_code(&mut self, owner: &mut Map<String, Value>, key: &str) {
        let Some(code) = owner.get(key).and_then(Value::as_str).map(str::to_string) else {
            return;
        };
        let system = self.field.source_system.clone().unwrap_or_default();

        match self.lookup(&code, &system) {
            Some(target) => {
                let sibling = owner
                    .entry(format!("_{}", key))
                    .or_insert_with(|| json!({}));
                if !sibling.is_object() {
                    *sibling = json!({});
                }
                push_extension(sibling, self.source_extension("valueCode", json!(code)));
                owner.insert(key.to_string(), json!(target.code));
            }
            None => self.unmapped(&code, &system),
        }
    }

    fn normalize_coding(&mut self, coding: &mut Value) {
        let Some((code, system)) = coding_key(coding) else {
            return;
        };
        match self.lookup(&code, &system) {
            Some(target) => {
                let original = coding.clone();
                apply_target(coding, &target);
                let extension = self.source_extension("valueCoding", original);
                push_extension(coding, extension);
            }
            None => self.unmapped(&code, &system),
        }
    }

    /// The first coding with a mapping is normalized; the others are kept.
    fn normalize_concept(&mut self, concept: &mut Value) {
        let original = concept.clone();
        let Some(codings) = concept.get_mut("coding").and_then(Value::as_array_mut) else {
            return;
        };

        let mut first_miss = None;
        let mut mapped = false;
        for coding in codings.iter_mut() {
            let Some((code, system)) = coding_key(coding) else {
                continue;
            };
            match self.lookup(&code, &system) {
                Some(target) => {
                    apply_target(coding, &target);
                    mapped = true;
                    break;
                }
                None => {
                    first_miss.get_or_insert((code, system));
                }
            }
        }

        if mapped {
            let extension = self.source_extension("valueCodeableConcept", original);
            push_extension(concept, extension);
        } else if let Some((code, system)) = first_miss {
            self.unmapped(&code, &system);
        }
    }

    fn unmapped(&mut self, code: &str, system: &str) {
        let diagnostics = format!(
            "No mapping for '{}|{}' in '{}' (tenant '{}')",
            system, code, self.field.data_element, self.tenant
        );
        let location = format!("{}.{}", self.resource_type, self.field.path);
        let issue = match self.config.unmapped {
            UnmappedPolicy::PassThrough => ValidationIssue::warning(IssueCode::CodeInvalid, diagnostics),
            UnmappedPolicy::Reject => ValidationIssue::error(IssueCode::CodeInvalid, diagnostics),
        };
        self.report.push(issue.with_location(location));
    }
}

fn coding_key(coding: &Value) -> Option<(String, String)> {
    let code = coding.get("code")?.as_str()?;
    let system = coding
        .get("system")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some((code.to_string(), system.to_string()))
}

fn apply_target(coding: &mut Value, target: &TargetValue) {
    coding["code"] = json!(target.code);
    for (key, value) in [
        ("system", &target.system),
        ("display", &target.display),
        ("version", &target.version),
    ] {
        if value.is_empty() {
            if let Some(object) = coding.as_object_mut() {
                object.remove(key);
            }
        } else {
            coding[key] = json!(value);
        }
    }
}

fn push_extension(element: &mut Value, extension: Value) {
    let Some(object) = element.as_object_mut() else {
        return;
    };
    match object.entry("extension").or_insert_with(|| json!([])) {
        Value::Array(extensions) => extensions.push(extension),
        other => *other = json!([other.take(), extension]),
    }
}
