//! Backing document models
//!
//! Lenient views of the ConceptMap and ValueSet resources that back registry
//! descriptors. Only the parts needed for materialization are modelled and
//! every field is optional, so partially populated documents still parse.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// ConceptMap backing document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConceptMapDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Mappings grouped by source/target system pair
    #[serde(default)]
    pub group: Vec<ConceptMapGroup>,

    /// Additional content
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

/// Same source and target systems
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConceptMapGroup {
    /// Source system where concepts to be mapped are defined
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_version: Option<String>,

    /// Target system that the concepts are to be mapped to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,

    #[serde(default)]
    pub element: Vec<ConceptMapElement>,
}

/// Mappings for a concept from the source set
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConceptMapElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    #[serde(default)]
    pub target: Vec<ConceptMapTarget>,
}

/// Concept in target system for element
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConceptMapTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    /// equivalent | wider | narrower | inexact | unmatched | ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equivalence: Option<String>,
}

/// ValueSet backing document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expansion: Option<ValueSetExpansion>,

    /// Additional content
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

/// Expansion of the value set
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValueSetExpansion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub contains: Vec<ValueSetContains>,
}

/// Codes in an expansion
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValueSetContains {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_concept_map_tolerates_missing_fields() {
        let doc: ConceptMapDocument = serde_json::from_value(json!({
            "resourceType": "ConceptMap",
            "group": [
                { "element": [ { "code": "X" } ] },
                {}
            ]
        }))
        .unwrap();

        assert_eq!(doc.group.len(), 2);
        assert_eq!(doc.group[0].source, None);
        assert!(doc.group[0].element[0].target.is_empty());
        assert!(doc.group[1].element.is_empty());
    }

    #[test]
    fn test_value_set_without_expansion() {
        let doc: ValueSetDocument = serde_json::from_value(json!({
            "resourceType": "ValueSet",
            "url": "http://example.org/vs",
            "compose": { "include": [] }
        }))
        .unwrap();

        assert!(doc.expansion.is_none());
        assert!(doc.extensions.contains_key("compose"));
    }
}
