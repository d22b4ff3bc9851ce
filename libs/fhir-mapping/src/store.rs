//! Registry store with atomic snapshot publication
//!
//! Readers load the current [`RegistrySnapshot`] through an `ArcSwap`, so they
//! never lock against each other or against a running reload, and always see
//! one complete reload generation. Reloads build a new snapshot off to the
//! side and publish it with a single swap.

use crate::descriptor::RegistryDescriptor;
use crate::index::{materialize, Materialized};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

/// One descriptor revision together with its fetched document and lazily
/// materialized payload.
pub struct RegistryEntry {
    descriptor: RegistryDescriptor,
    document: Option<Arc<Value>>,
    payload: OnceLock<Arc<Materialized>>,
}

impl RegistryEntry {
    /// Entry whose payload is materialized on first lookup.
    pub fn new(descriptor: RegistryDescriptor, document: Option<Arc<Value>>) -> Self {
        Self {
            descriptor,
            document,
            payload: OnceLock::new(),
        }
    }

    /// Entry with an already materialized payload.
    pub fn with_payload(
        descriptor: RegistryDescriptor,
        document: Option<Arc<Value>>,
        materialized: Materialized,
    ) -> Self {
        let payload = OnceLock::new();
        let _ = payload.set(Arc::new(materialized));
        Self {
            descriptor,
            document,
            payload,
        }
    }

    pub fn descriptor(&self) -> &RegistryDescriptor {
        &self.descriptor
    }

    pub fn registry_id(&self) -> &str {
        &self.descriptor.registry_id
    }

    pub fn document(&self) -> Option<&Arc<Value>> {
        self.document.as_ref()
    }

    pub fn is_materialized(&self) -> bool {
        self.payload.get().is_some()
    }

    /// Memoized payload. Concurrent first calls parse once; the others wait.
    pub fn payload(&self) -> Arc<Materialized> {
        self.payload
            .get_or_init(|| {
                Arc::new(materialize(
                    &self.descriptor,
                    self.document.as_deref(),
                ))
            })
            .clone()
    }

    /// Payload that is not older than `as_of`.
    ///
    /// A cached payload materialized before `as_of` is bypassed and the
    /// document is parsed again; the fresh result is not cached.
    pub fn payload_as_of(&self, as_of: Option<DateTime<Utc>>) -> Arc<Materialized> {
        let Some(as_of) = as_of else {
            return self.payload();
        };

        match self.payload.get() {
            Some(cached) if cached.materialized_at >= as_of => cached.clone(),
            _ => Arc::new(materialize(&self.descriptor, self.document.as_deref())),
        }
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("registry_id", &self.descriptor.registry_id)
            .field("version", &self.descriptor.version)
            .field("data_element", &self.descriptor.data_element)
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

/// Immutable view of the registry produced by one reload generation.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    generation: u64,
    loaded_at: Option<DateTime<Utc>>,
    /// Sorted by registry id
    entries: Vec<Arc<RegistryEntry>>,
    /// Per data element, sorted by registry id
    by_element: HashMap<String, Vec<Arc<RegistryEntry>>>,
}

impl RegistrySnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn build(generation: u64, mut entries: Vec<Arc<RegistryEntry>>) -> Self {
        entries.sort_by(|a, b| a.registry_id().cmp(b.registry_id()));

        let mut by_element: HashMap<String, Vec<Arc<RegistryEntry>>> = HashMap::new();
        for entry in &entries {
            by_element
                .entry(entry.descriptor.data_element.clone())
                .or_default()
                .push(entry.clone());
        }

        Self {
            generation,
            loaded_at: Some(Utc::now()),
            entries,
            by_element,
        }
    }

    /// Reload generation; 0 means nothing was ever loaded.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Arc<RegistryEntry>] {
        &self.entries
    }

    pub fn get(&self, registry_id: &str) -> Option<&Arc<RegistryEntry>> {
        self.entries
            .binary_search_by(|e| e.registry_id().cmp(registry_id))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    /// Entries bound to `data_element`, ordered by registry id.
    pub fn for_element(&self, data_element: &str) -> &[Arc<RegistryEntry>] {
        self.by_element
            .get(data_element)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Lifecycle of the store's reload cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// No reload has succeeded yet
    Empty,
    /// A reload with changes is being applied
    Reloading,
    Loaded,
}

impl StoreState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Reloading,
            2 => Self::Loaded,
            _ => Self::Empty,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Reloading => 1,
            Self::Loaded => 2,
        }
    }
}

/// Holds the current registry snapshot.
///
/// Instances are created explicitly and shared by reference; there is no
/// process-wide registry.
pub struct RegistryStore {
    snapshot: ArcSwap<RegistrySnapshot>,
    state: AtomicU8,
    reload_lock: Mutex<()>,
}

impl RegistryStore {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(RegistrySnapshot::empty()),
            state: AtomicU8::new(StoreState::Empty.as_u8()),
            reload_lock: Mutex::new(()),
        }
    }

    /// Current snapshot. Holding the returned `Arc` pins that generation.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.load_full()
    }

    pub fn state(&self) -> StoreState {
        StoreState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn generation(&self) -> u64 {
        self.snapshot.load().generation()
    }

    pub(crate) fn set_state(&self, state: StoreState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn publish(&self, snapshot: RegistrySnapshot) {
        self.snapshot.store(Arc::new(snapshot));
        self.set_state(StoreState::Loaded);
    }

    /// Serializes reloads; reads never take it.
    pub(crate) fn reload_lock(&self) -> &Mutex<()> {
        &self.reload_lock
    }
}

impl Default for RegistryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RegistryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("RegistryStore")
            .field("generation", &snapshot.generation())
            .field("entries", &snapshot.len())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::RegistryType;
    use serde_json::json;

    fn entry(id: &str, element: &str) -> Arc<RegistryEntry> {
        let descriptor =
            RegistryDescriptor::new(id, element, RegistryType::ValueSet, "1", format!("{id}.json"));
        let document = json!({ "expansion": { "contains": [ { "code": id } ] } });
        Arc::new(RegistryEntry::new(descriptor, Some(Arc::new(document))))
    }

    #[test]
    fn test_snapshot_indexes_by_element_in_id_order() {
        let snapshot = RegistrySnapshot::build(
            1,
            vec![
                entry("c", "Patient.gender"),
                entry("a", "Patient.gender"),
                entry("b", "Appointment.status"),
            ],
        );

        let ids: Vec<_> = snapshot
            .for_element("Patient.gender")
            .iter()
            .map(|e| e.registry_id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(snapshot.for_element("Unknown.element").is_empty());
        assert_eq!(snapshot.get("b").unwrap().descriptor().data_element, "Appointment.status");
        assert!(snapshot.get("z").is_none());
    }

    #[test]
    fn test_payload_is_memoized() {
        let entry = entry("a", "Patient.gender");
        assert!(!entry.is_materialized());

        let first = entry.payload();
        let second = entry.payload();
        assert!(entry.is_materialized());
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_payload_as_of_bypasses_stale_cache() {
        let entry = entry("a", "Patient.gender");
        let cached = entry.payload();

        let fresh = entry.payload_as_of(Some(Utc::now() + chrono::Duration::seconds(1)));
        assert!(!Arc::ptr_eq(&cached, &fresh));
        assert_eq!(cached.payload, fresh.payload);

        // The cache itself is untouched
        assert!(Arc::ptr_eq(&cached, &entry.payload()));

        let reused = entry.payload_as_of(Some(cached.materialized_at));
        assert!(Arc::ptr_eq(&cached, &reused));
    }

    #[test]
    fn test_concurrent_first_lookup_materializes_once() {
        let entry = entry("a", "Patient.gender");
        let payloads: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| entry.payload())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(payloads.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_store_starts_empty() {
        let store = RegistryStore::new();
        assert_eq!(store.state(), StoreState::Empty);
        assert_eq!(store.generation(), 0);
        assert!(store.snapshot().is_empty());

        store.publish(RegistrySnapshot::build(1, vec![entry("a", "X")]));
        assert_eq!(store.state(), StoreState::Loaded);
        assert_eq!(store.generation(), 1);
    }
}
