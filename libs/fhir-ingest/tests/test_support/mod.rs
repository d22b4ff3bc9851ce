#![allow(dead_code)]

use async_trait::async_trait;
use ferrum_mapping::{
    Error, RegistryDescriptor, RegistrySource, RegistryStore, RegistryType, ReloadCoordinator,
    ReloadScope, Result, SpecificityResolver,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const TENANT: &str = "acme";
pub const SOURCE_SYSTEM: &str = "urn:acme:appointment-status";
pub const STATUS_SYSTEM: &str = "http://hl7.org/fhir/appointmentstatus";
pub const ACT_CODE_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/v3-ActCode";

/// Fixed registry listing served from memory.
pub struct StaticSource {
    entries: Vec<(RegistryDescriptor, Value)>,
}

#[async_trait]
impl RegistrySource for StaticSource {
    async fn list_descriptors(&self, scope: &ReloadScope) -> Result<Vec<RegistryDescriptor>> {
        Ok(self
            .entries
            .iter()
            .map(|(d, _)| d.clone())
            .filter(|d| scope.covers(d))
            .collect())
    }

    async fn fetch_document(&self, descriptor: &RegistryDescriptor) -> Result<Value> {
        let documents: HashMap<&str, &Value> = self
            .entries
            .iter()
            .map(|(d, v)| (d.registry_id.as_str(), v))
            .collect();
        documents
            .get(descriptor.registry_id.as_str())
            .map(|v| (*v).clone())
            .ok_or_else(|| Error::DocumentFetch {
                registry_id: descriptor.registry_id.clone(),
                message: "not found".to_string(),
            })
    }
}

/// Registry for appointment status and encounter class, loaded for [`TENANT`].
pub async fn registry() -> SpecificityResolver {
    let entries = vec![
        (
            RegistryDescriptor::new(
                "status-map",
                "Appointment.status",
                RegistryType::ConceptMap,
                "1",
                "status-map.json",
            )
            .with_tenant(TENANT),
            json!({
                "resourceType": "ConceptMap",
                "group": [{
                    "source": SOURCE_SYSTEM,
                    "target": STATUS_SYSTEM,
                    "targetVersion": "4.0.1",
                    "element": [
                        { "code": "SCH", "target": [ { "code": "booked", "display": "Booked" } ] },
                        { "code": "CAN", "target": [ { "code": "cancelled", "display": "Cancelled" } ] }
                    ]
                }]
            }),
        ),
        (
            RegistryDescriptor::new(
                "status-set",
                "Appointment.status",
                RegistryType::ValueSet,
                "1",
                "status-set.json",
            ),
            json!({
                "resourceType": "ValueSet",
                "expansion": { "contains": [
                    { "system": STATUS_SYSTEM, "code": "booked" },
                    { "system": STATUS_SYSTEM, "code": "cancelled" },
                    { "system": STATUS_SYSTEM, "code": "noshow" }
                ] }
            }),
        ),
        (
            RegistryDescriptor::new(
                "class-map",
                "Encounter.class",
                RegistryType::ConceptMap,
                "1",
                "class-map.json",
            ),
            json!({
                "resourceType": "ConceptMap",
                "group": [{
                    "source": "urn:acme:visit-type",
                    "target": ACT_CODE_SYSTEM,
                    "element": [
                        { "code": "OP", "target": [ { "code": "AMB", "display": "ambulatory" } ] },
                        { "code": "IP", "target": [ { "code": "IMP", "display": "inpatient encounter" } ] }
                    ]
                }]
            }),
        ),
    ];

    let store = Arc::new(RegistryStore::new());
    ReloadCoordinator::new(store.clone(), Arc::new(StaticSource { entries }))
        .reload(&ReloadScope::tenant(TENANT))
        .await
        .unwrap();
    SpecificityResolver::new(store)
}

pub fn appointment(id: &str, status: &str) -> Value {
    json!({
        "resourceType": "Appointment",
        "id": id,
        "status": status,
        "participant": [
            { "actor": { "reference": "Patient/p1" }, "status": "accepted" },
            { "actor": { "reference": "Practitioner/d1" }, "status": "accepted" }
        ],
        "comment": ""
    })
}

pub fn encounter(id: &str, class_code: &str) -> Value {
    json!({
        "resourceType": "Encounter",
        "id": id,
        "status": "finished",
        "class": { "system": "urn:acme:visit-type", "code": class_code },
        "subject": { "reference": "Patient/p1" }
    })
}
