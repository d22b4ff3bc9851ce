#![allow(dead_code)]

use async_trait::async_trait;
use ferrum_mapping::{
    Error, RegistryDescriptor, RegistrySource, RegistryType, ReloadScope, Result,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory registry source that counts every fetch.
#[derive(Default)]
pub struct MemorySource {
    listing: Mutex<Vec<RegistryDescriptor>>,
    documents: Mutex<HashMap<String, Value>>,
    fail_listing: AtomicBool,
    fetch_delay: Mutex<Option<Duration>>,
    listing_calls: AtomicUsize,
    document_fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the listing and register each descriptor's document.
    pub fn publish(&self, entries: Vec<(RegistryDescriptor, Value)>) {
        let mut listing = self.listing.lock().unwrap();
        let mut documents = self.documents.lock().unwrap();
        listing.clear();
        for (descriptor, document) in entries {
            documents.insert(descriptor.backing_document_location.clone(), document);
            listing.push(descriptor);
        }
    }

    pub fn set_listing(&self, listing: Vec<RegistryDescriptor>) {
        *self.listing.lock().unwrap() = listing;
    }

    pub fn put_document(&self, location: &str, document: Value) {
        self.documents
            .lock()
            .unwrap()
            .insert(location.to_string(), document);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Make every document fetch take `delay`.
    pub fn slow_fetches(&self, delay: Option<Duration>) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub fn document_fetches(&self) -> usize {
        self.document_fetches.load(Ordering::SeqCst)
    }

    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistrySource for MemorySource {
    async fn list_descriptors(&self, scope: &ReloadScope) -> Result<Vec<RegistryDescriptor>> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::ListingFetch("registry unavailable".to_string()));
        }
        Ok(self
            .listing
            .lock()
            .unwrap()
            .iter()
            .filter(|d| scope.covers(d))
            .cloned()
            .collect())
    }

    async fn fetch_document(&self, descriptor: &RegistryDescriptor) -> Result<Value> {
        self.document_fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.documents
            .lock()
            .unwrap()
            .get(&descriptor.backing_document_location)
            .cloned()
            .ok_or_else(|| Error::DocumentFetch {
                registry_id: descriptor.registry_id.clone(),
                message: "not found".to_string(),
            })
    }
}

pub const SOURCE_SYSTEM: &str = "sys";
pub const TARGET_SYSTEM: &str = "http://hl7.org/fhir/appointmentstatus";

/// Concept map descriptor; the document location encodes id and version.
pub fn concept_map(
    id: &str,
    element: &str,
    tenant: Option<&str>,
    profile: Option<&str>,
    version: &str,
) -> RegistryDescriptor {
    let mut descriptor = RegistryDescriptor::new(
        id,
        element,
        RegistryType::ConceptMap,
        version,
        format!("{id}-v{version}.json"),
    );
    descriptor.tenant_id = tenant.map(str::to_string);
    descriptor.profile_url = profile.map(str::to_string);
    descriptor
}

pub fn value_set(
    id: &str,
    element: &str,
    tenant: Option<&str>,
    version: &str,
) -> RegistryDescriptor {
    let mut descriptor = RegistryDescriptor::new(
        id,
        element,
        RegistryType::ValueSet,
        version,
        format!("{id}-v{version}.json"),
    );
    descriptor.tenant_id = tenant.map(str::to_string);
    descriptor
}

/// ConceptMap document with one group from [`SOURCE_SYSTEM`] to [`TARGET_SYSTEM`].
pub fn concept_map_document(mappings: &[(&str, &str)]) -> Value {
    let elements: Vec<Value> = mappings
        .iter()
        .map(|(source, target)| {
            json!({
                "code": source,
                "target": [ { "code": target, "display": target.to_uppercase(), "equivalence": "equivalent" } ]
            })
        })
        .collect();

    json!({
        "resourceType": "ConceptMap",
        "group": [{
            "source": SOURCE_SYSTEM,
            "target": TARGET_SYSTEM,
            "targetVersion": "4.0.1",
            "element": elements
        }]
    })
}

pub fn value_set_document(system: &str, codes: &[&str]) -> Value {
    let contains: Vec<Value> = codes
        .iter()
        .map(|code| json!({ "system": system, "code": code, "display": code, "version": "1" }))
        .collect();
    json!({ "resourceType": "ValueSet", "expansion": { "contains": contains } })
}
