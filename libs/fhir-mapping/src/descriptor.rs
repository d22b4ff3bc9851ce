//! Registry descriptor model
//!
//! A descriptor identifies one normalization rule: a concept map or value set
//! bound to a data element, optionally scoped to a tenant and/or a profile.
//! Descriptors arrive from the listing without payload; the backing document
//! is fetched and materialized separately.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which materialization applies to a descriptor's backing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistryType {
    ConceptMap,
    ValueSet,
}

impl fmt::Display for RegistryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConceptMap => write!(f, "ConceptMap"),
            Self::ValueSet => write!(f, "ValueSet"),
        }
    }
}

/// Identity record for a normalization rule, as returned by the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDescriptor {
    /// Identifies the logical rule across versions
    #[serde(rename = "registry_uuid", alias = "registry_id")]
    pub registry_id: String,

    /// Field the rule applies to, e.g. `Appointment.status`
    pub data_element: String,

    /// Tenant scope; `None` marks a universal rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Profile scope; `None` applies to every profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,

    pub version: String,

    pub registry_type: RegistryType,

    /// Location of the backing document, interpreted by the registry source
    #[serde(rename = "filename", alias = "backing_document_location")]
    pub backing_document_location: String,
}

impl RegistryDescriptor {
    pub fn new(
        registry_id: impl Into<String>,
        data_element: impl Into<String>,
        registry_type: RegistryType,
        version: impl Into<String>,
        backing_document_location: impl Into<String>,
    ) -> Self {
        Self {
            registry_id: registry_id.into(),
            data_element: data_element.into(),
            tenant_id: None,
            profile_url: None,
            version: version.into(),
            registry_type,
            backing_document_location: backing_document_location.into(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_profile(mut self, profile_url: impl Into<String>) -> Self {
        self.profile_url = Some(profile_url.into());
        self
    }

    pub fn is_universal(&self) -> bool {
        self.tenant_id.is_none()
    }

    /// Same logical rule at the same version.
    pub fn same_revision(&self, other: &RegistryDescriptor) -> bool {
        self.registry_id == other.registry_id && self.version == other.version
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.registry_id.is_empty() {
            return Err(Error::InvalidDescriptor(format!(
                "descriptor for '{}' has an empty registry id",
                self.data_element
            )));
        }
        if self.data_element.is_empty() {
            return Err(Error::InvalidDescriptor(format!(
                "descriptor '{}' has no data element",
                self.registry_id
            )));
        }
        Ok(())
    }
}

/// Vocabulary-independent lookup key for a source code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceKey {
    pub code: String,
    pub system: String,
}

impl SourceKey {
    pub fn new(code: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            system: system.into(),
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.system, self.code)
    }
}

/// Normalized output of a mapping or value set entry.
///
/// Absent fields in the backing document become empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetValue {
    pub code: String,
    pub system: String,
    pub display: String,
    pub version: String,
}

impl TargetValue {
    pub fn new(
        code: impl Into<String>,
        system: impl Into<String>,
        display: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            system: system.into(),
            display: display.into(),
            version: version.into(),
        }
    }

    pub fn matches(&self, code: &str, system: Option<&str>) -> bool {
        self.code == code && system.map_or(true, |s| s.is_empty() || self.system == s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_listing_entry_deserializes() {
        let descriptor: RegistryDescriptor = serde_json::from_value(json!({
            "registry_uuid": "12345",
            "data_element": "Appointment.status",
            "tenant_id": "acme",
            "version": "3",
            "registry_type": "ConceptMap",
            "filename": "maps/appointment-status.json",
            "source_extension_url": "ignored"
        }))
        .unwrap();

        assert_eq!(descriptor.registry_id, "12345");
        assert_eq!(descriptor.tenant_id.as_deref(), Some("acme"));
        assert_eq!(descriptor.profile_url, None);
        assert_eq!(descriptor.registry_type, RegistryType::ConceptMap);
        assert_eq!(
            descriptor.backing_document_location,
            "maps/appointment-status.json"
        );
    }

    #[test]
    fn test_same_revision() {
        let a = RegistryDescriptor::new("1", "Status", RegistryType::ConceptMap, "1", "a.json");
        let mut b = a.clone();
        assert!(a.same_revision(&b));
        b.version = "2".to_string();
        assert!(!a.same_revision(&b));
    }

    #[test]
    fn test_check_rejects_empty_id() {
        let descriptor = RegistryDescriptor::new("", "Status", RegistryType::ValueSet, "1", "a");
        assert!(matches!(
            descriptor.check(),
            Err(Error::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_target_matches_ignores_blank_system() {
        let target = TargetValue::new("booked", "http://hl7.org/fhir/appointmentstatus", "", "");
        assert!(target.matches("booked", None));
        assert!(target.matches("booked", Some("")));
        assert!(!target.matches("booked", Some("urn:other")));
    }
}
