//! Concept map and value set indexes
//!
//! Materialization turns a descriptor's backing document into an in-memory
//! lookup structure. A concept map becomes a `SourceKey -> TargetValue` map,
//! a value set becomes an ordered list of `TargetValue`s. A document that
//! fails to parse degrades to an empty payload; the failure is kept on the
//! [`Materialized`] record instead of being raised.

use crate::descriptor::{RegistryDescriptor, RegistryType, SourceKey, TargetValue};
use crate::document::{ConceptMapDocument, ValueSetDocument};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Source code to normalized target lookup built from a ConceptMap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConceptMapIndex {
    entries: HashMap<SourceKey, TargetValue>,
}

impl ConceptMapIndex {
    pub fn from_document(document: &ConceptMapDocument) -> Self {
        let mut entries = HashMap::new();

        for group in &document.group {
            let source_system = group.source.clone().unwrap_or_default();
            let target_system = group.target.clone().unwrap_or_default();
            let target_version = group.target_version.clone().unwrap_or_default();

            for element in &group.element {
                let Some(code) = element.code.as_deref().filter(|c| !c.is_empty()) else {
                    continue;
                };
                // Only the first target is used
                let Some(target) = element.target.first() else {
                    continue;
                };
                let Some(target_code) = target.code.as_deref().filter(|c| !c.is_empty()) else {
                    continue;
                };

                entries
                    .entry(SourceKey::new(code, source_system.clone()))
                    .or_insert_with(|| TargetValue {
                        code: target_code.to_string(),
                        system: target_system.clone(),
                        display: target.display.clone().unwrap_or_default(),
                        version: target_version.clone(),
                    });
            }
        }

        Self { entries }
    }

    pub fn get(&self, key: &SourceKey) -> Option<&TargetValue> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SourceKey, &TargetValue)> {
        self.entries.iter()
    }
}

/// Ordered list of valid normalized codes built from a ValueSet expansion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueSetIndex {
    values: Vec<TargetValue>,
}

impl ValueSetIndex {
    pub fn from_document(document: &ValueSetDocument) -> Self {
        let values = document
            .expansion
            .iter()
            .flat_map(|expansion| expansion.contains.iter())
            .map(|contains| TargetValue {
                code: contains.code.clone().unwrap_or_default(),
                system: contains.system.clone().unwrap_or_default(),
                display: contains.display.clone().unwrap_or_default(),
                version: contains.version.clone().unwrap_or_default(),
            })
            .collect();

        Self { values }
    }

    pub fn values(&self) -> &[TargetValue] {
        &self.values
    }

    pub fn contains(&self, code: &str, system: Option<&str>) -> bool {
        self.values.iter().any(|v| v.matches(code, system))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Materialized payload of a descriptor. A descriptor never mixes both forms.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Map(ConceptMapIndex),
    Set(ValueSetIndex),
}

impl Payload {
    pub fn empty(registry_type: RegistryType) -> Self {
        match registry_type {
            RegistryType::ConceptMap => Self::Map(ConceptMapIndex::default()),
            RegistryType::ValueSet => Self::Set(ValueSetIndex::default()),
        }
    }

    /// Parse a backing document according to the registry type.
    pub fn parse(registry_type: RegistryType, document: &Value) -> serde_json::Result<Self> {
        Ok(match registry_type {
            RegistryType::ConceptMap => {
                Self::Map(ConceptMapIndex::from_document(&ConceptMapDocument::deserialize(document)?))
            }
            RegistryType::ValueSet => {
                Self::Set(ValueSetIndex::from_document(&ValueSetDocument::deserialize(document)?))
            }
        })
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Map(map) => map.is_empty(),
            Self::Set(set) => set.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Map(map) => map.len(),
            Self::Set(set) => set.len(),
        }
    }

    pub fn as_map(&self) -> Option<&ConceptMapIndex> {
        match self {
            Self::Map(map) => Some(map),
            Self::Set(_) => None,
        }
    }

    pub fn as_set(&self) -> Option<&ValueSetIndex> {
        match self {
            Self::Set(set) => Some(set),
            Self::Map(_) => None,
        }
    }
}

/// Result of materializing one descriptor revision.
#[derive(Debug, Clone, PartialEq)]
pub struct Materialized {
    pub payload: Payload,
    pub materialized_at: DateTime<Utc>,
    /// Why the payload is empty, when parsing or fetching failed
    pub failure: Option<String>,
}

impl Materialized {
    pub fn is_usable(&self) -> bool {
        !self.payload.is_empty()
    }
}

/// Build the payload for `descriptor` from its fetched backing document.
///
/// A missing document or a parse failure yields an empty payload and a
/// recorded failure; it never returns an error.
pub fn materialize(descriptor: &RegistryDescriptor, document: Option<&Value>) -> Materialized {
    let materialized_at = Utc::now();

    let result: Result<Payload> = match document {
        Some(document) => Payload::parse(descriptor.registry_type, document).map_err(|e| {
            Error::DocumentParse {
                registry_id: descriptor.registry_id.clone(),
                message: e.to_string(),
            }
        }),
        None => Err(Error::DocumentFetch {
            registry_id: descriptor.registry_id.clone(),
            message: format!(
                "no document available at '{}'",
                descriptor.backing_document_location
            ),
        }),
    };

    match result {
        Ok(payload) => {
            tracing::debug!(
                registry_id = %descriptor.registry_id,
                version = %descriptor.version,
                entries = payload.len(),
                "Materialized registry descriptor"
            );
            Materialized {
                payload,
                materialized_at,
                failure: None,
            }
        }
        Err(e) => {
            tracing::warn!(
                registry_id = %descriptor.registry_id,
                version = %descriptor.version,
                error = %e,
                "Registry descriptor degraded to an empty payload"
            );
            Materialized {
                payload: Payload::empty(descriptor.registry_type),
                materialized_at,
                failure: Some(e.to_string()),
            }
        }
    }
}
