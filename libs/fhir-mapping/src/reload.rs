//! Reload coordination
//!
//! A reload fetches the descriptor listing for a scope, diffs it against the
//! current snapshot by `(registry_id, version)` and publishes the merged
//! result atomically:
//! - same id and version: the existing entry (and its payload) is kept
//! - same id, new version: the document is fetched and materialized now
//! - new id: the document is fetched, parsing waits for the first lookup
//! - id missing from the listing: the entry is evicted
//!
//! A failed listing fetch aborts the reload and leaves the previous snapshot
//! live. A failed document only empties that descriptor's payload.

use crate::descriptor::RegistryDescriptor;
use crate::error::{Error, Result};
use crate::index::materialize;
use crate::source::RegistrySource;
use crate::store::{RegistryEntry, RegistrySnapshot, RegistryStore, StoreState};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Which part of the registry a reload replaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReloadScope {
    /// Every tenant plus universal entries
    All,
    /// One tenant's entries plus universal entries
    Tenant(String),
}

impl ReloadScope {
    pub fn tenant(tenant_id: impl Into<String>) -> Self {
        Self::Tenant(tenant_id.into())
    }

    pub fn covers(&self, descriptor: &RegistryDescriptor) -> bool {
        match self {
            Self::All => true,
            Self::Tenant(tenant) => descriptor
                .tenant_id
                .as_ref()
                .map_or(true, |t| t == tenant),
        }
    }
}

impl fmt::Display for ReloadScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Tenant(tenant) => write!(f, "tenant:{}", tenant),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReloadOptions {
    /// Re-fetch and re-materialize every listed descriptor, even unchanged ones
    pub force: bool,
}

impl ReloadOptions {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorFailure {
    pub registry_id: String,
    pub message: String,
}

/// What a reload changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    /// Generation live after the reload
    pub generation: u64,
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub retained: Vec<String>,
    pub evicted: Vec<String>,
    pub documents_fetched: usize,
    pub failures: Vec<DescriptorFailure>,
}

impl ReloadSummary {
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.updated.is_empty() || !self.evicted.is_empty()
    }
}

enum Plan {
    Retain(Arc<RegistryEntry>),
    Update(RegistryDescriptor),
    Add(RegistryDescriptor),
}

/// Refreshes a [`RegistryStore`] from a [`RegistrySource`].
pub struct ReloadCoordinator {
    store: Arc<RegistryStore>,
    source: Arc<dyn RegistrySource>,
}

impl ReloadCoordinator {
    pub fn new(store: Arc<RegistryStore>, source: Arc<dyn RegistrySource>) -> Self {
        Self { store, source }
    }

    pub fn store(&self) -> &Arc<RegistryStore> {
        &self.store
    }

    pub async fn reload(&self, scope: &ReloadScope) -> Result<ReloadSummary> {
        self.reload_with(scope, ReloadOptions::default()).await
    }

    pub async fn reload_with(
        &self,
        scope: &ReloadScope,
        options: ReloadOptions,
    ) -> Result<ReloadSummary> {
        // One reload at a time; the merge below reads the snapshot that is
        // current while the lock is held.
        let _guard = self.store.reload_lock().lock().await;

        let listing = match self.source.list_descriptors(scope).await {
            Ok(listing) => listing,
            Err(e) => {
                let e = match e {
                    Error::ListingFetch(_) => e,
                    other => Error::ListingFetch(other.to_string()),
                };
                tracing::warn!(
                    scope = %scope,
                    error = %e,
                    "Registry listing fetch failed, keeping previous snapshot"
                );
                return Err(e);
            }
        };
        let listing = check_listing(scope, listing)?;

        let current = self.store.snapshot();
        let listed: HashSet<&str> = listing.iter().map(|d| d.registry_id.as_str()).collect();

        let mut summary = ReloadSummary::default();
        let mut plans = Vec::with_capacity(listing.len());
        for descriptor in &listing {
            let plan = match current.get(&descriptor.registry_id) {
                Some(existing) if existing.descriptor().same_revision(descriptor) && !options.force => {
                    summary.retained.push(descriptor.registry_id.clone());
                    Plan::Retain(existing.clone())
                }
                Some(_) => {
                    summary.updated.push(descriptor.registry_id.clone());
                    Plan::Update(descriptor.clone())
                }
                None => {
                    summary.added.push(descriptor.registry_id.clone());
                    Plan::Add(descriptor.clone())
                }
            };
            plans.push(plan);
        }

        // Entries outside the scope carry over untouched
        let mut entries: Vec<Arc<RegistryEntry>> = Vec::with_capacity(current.len());
        for entry in current.entries() {
            if listed.contains(entry.registry_id()) {
                continue;
            }
            if scope.covers(entry.descriptor()) {
                summary.evicted.push(entry.registry_id().to_string());
            } else {
                entries.push(entry.clone());
            }
        }

        if !summary.changed() && current.generation() > 0 {
            self.store.set_state(StoreState::Loaded);
            summary.generation = current.generation();
            tracing::debug!(
                scope = %scope,
                generation = summary.generation,
                retained = summary.retained.len(),
                "Registry unchanged"
            );
            return Ok(summary);
        }

        let mut in_progress = ReloadInProgress::enter(&self.store);

        for plan in plans {
            let entry = match plan {
                Plan::Retain(existing) => existing,
                Plan::Update(descriptor) => {
                    let document = self.fetch(&descriptor, &mut summary).await;
                    let materialized = materialize(&descriptor, document.as_deref());
                    if let Some(message) = &materialized.failure {
                        push_failure(&mut summary, &descriptor, message.clone());
                    }
                    Arc::new(RegistryEntry::with_payload(descriptor, document, materialized))
                }
                Plan::Add(descriptor) => {
                    let document = self.fetch(&descriptor, &mut summary).await;
                    Arc::new(RegistryEntry::new(descriptor, document))
                }
            };
            entries.push(entry);
        }

        summary.generation = current.generation() + 1;
        self.store
            .publish(RegistrySnapshot::build(summary.generation, entries));
        in_progress.published();

        tracing::info!(
            scope = %scope,
            generation = summary.generation,
            added = summary.added.len(),
            updated = summary.updated.len(),
            retained = summary.retained.len(),
            evicted = summary.evicted.len(),
            failures = summary.failures.len(),
            "Registry reloaded"
        );

        Ok(summary)
    }

    /// Reload `scope` every `interval` until the future is dropped.
    ///
    /// Failures are logged and the previous snapshot stays live.
    pub async fn run_periodic(&self, scope: ReloadScope, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.reload(&scope).await {
                tracing::error!(scope = %scope, error = %e, "Periodic registry reload failed");
            }
        }
    }

    async fn fetch(
        &self,
        descriptor: &RegistryDescriptor,
        summary: &mut ReloadSummary,
    ) -> Option<Arc<Value>> {
        summary.documents_fetched += 1;
        match self.source.fetch_document(descriptor).await {
            Ok(document) => Some(Arc::new(document)),
            Err(e) => {
                tracing::warn!(
                    registry_id = %descriptor.registry_id,
                    location = %descriptor.backing_document_location,
                    error = %e,
                    "Failed to fetch backing document"
                );
                push_failure(summary, descriptor, e.to_string());
                None
            }
        }
    }
}

/// Marks the store `Reloading` until dropped. A reload dropped before it
/// publishes puts back the state of the snapshot that is still live.
struct ReloadInProgress<'a> {
    store: &'a RegistryStore,
    published: bool,
}

impl<'a> ReloadInProgress<'a> {
    fn enter(store: &'a RegistryStore) -> Self {
        store.set_state(StoreState::Reloading);
        Self {
            store,
            published: false,
        }
    }

    fn published(&mut self) {
        self.published = true;
    }
}

impl Drop for ReloadInProgress<'_> {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        let state = if self.store.generation() == 0 {
            StoreState::Empty
        } else {
            StoreState::Loaded
        };
        self.store.set_state(state);
        tracing::warn!(
            generation = self.store.generation(),
            "Registry reload stopped before publishing, previous snapshot stays live"
        );
    }
}

fn push_failure(summary: &mut ReloadSummary, descriptor: &RegistryDescriptor, message: String) {
    if summary
        .failures
        .iter()
        .any(|f| f.registry_id == descriptor.registry_id)
    {
        return;
    }
    summary.failures.push(DescriptorFailure {
        registry_id: descriptor.registry_id.clone(),
        message,
    });
}

/// Reject malformed listings before anything is fetched.
fn check_listing(
    scope: &ReloadScope,
    listing: Vec<RegistryDescriptor>,
) -> Result<Vec<RegistryDescriptor>> {
    let mut seen = HashSet::new();
    let mut checked = Vec::with_capacity(listing.len());

    for descriptor in listing {
        descriptor.check()?;
        if !seen.insert(descriptor.registry_id.clone()) {
            return Err(Error::DuplicateRegistryId(descriptor.registry_id));
        }
        if !scope.covers(&descriptor) {
            tracing::warn!(
                scope = %scope,
                registry_id = %descriptor.registry_id,
                "Ignoring listed descriptor outside the reload scope"
            );
            continue;
        }
        checked.push(descriptor);
    }

    Ok(checked)
}
