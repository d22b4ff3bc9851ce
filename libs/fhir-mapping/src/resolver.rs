//! Specificity-ranked registry lookups
//!
//! Candidates for a data element are ranked, most specific first:
//! 1. tenant and profile both match
//! 2. tenant matches, descriptor has no profile
//! 3. universal descriptor, profile matches
//! 4. universal descriptor without profile
//!
//! Within a rank, candidates are ordered by registry id. The first candidate
//! with a non-empty payload answers the lookup; a key miss in that payload is
//! final and does not fall through to lower ranks.

use crate::descriptor::{RegistryDescriptor, RegistryType, SourceKey, TargetValue};
use crate::index::Materialized;
use crate::store::{RegistryEntry, RegistrySnapshot, RegistryStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Specificity {
    TenantAndProfile,
    Tenant,
    UniversalAndProfile,
    Universal,
}

impl Specificity {
    /// Rank of `descriptor` for a lookup, or `None` when it does not apply:
    /// another tenant's descriptor, or a profile-scoped descriptor whose
    /// profile differs from the requested one.
    pub fn of(
        descriptor: &RegistryDescriptor,
        tenant: &str,
        profile_url: Option<&str>,
    ) -> Option<Self> {
        let tenant_match = match descriptor.tenant_id.as_deref() {
            Some(t) if t == tenant => true,
            Some(_) => return None,
            None => false,
        };
        let profile_match = match (descriptor.profile_url.as_deref(), profile_url) {
            (None, _) => false,
            (Some(d), Some(p)) if d == p => true,
            (Some(_), _) => return None,
        };

        Some(match (tenant_match, profile_match) {
            (true, true) => Self::TenantAndProfile,
            (true, false) => Self::Tenant,
            (false, true) => Self::UniversalAndProfile,
            (false, false) => Self::Universal,
        })
    }
}

/// Descriptor selected for a lookup, pinned with the payload it answered from.
#[derive(Debug, Clone)]
pub struct Selection {
    pub entry: Arc<RegistryEntry>,
    pub materialized: Arc<Materialized>,
    pub specificity: Specificity,
}

/// Answers mapping and value-set lookups over the store's current snapshot.
#[derive(Debug, Clone)]
pub struct SpecificityResolver {
    store: Arc<RegistryStore>,
}

impl SpecificityResolver {
    pub fn new(store: Arc<RegistryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<RegistryStore> {
        &self.store
    }

    /// Map `source_key` to its normalized target.
    pub fn resolve(
        &self,
        tenant: &str,
        data_element: &str,
        source_key: &SourceKey,
        profile_url: Option<&str>,
    ) -> Option<TargetValue> {
        self.resolve_as_of(tenant, data_element, source_key, profile_url, None)
    }

    /// [`resolve`](Self::resolve) that re-materializes payloads older than `as_of`.
    pub fn resolve_as_of(
        &self,
        tenant: &str,
        data_element: &str,
        source_key: &SourceKey,
        profile_url: Option<&str>,
        as_of: Option<DateTime<Utc>>,
    ) -> Option<TargetValue> {
        let snapshot = self.store.snapshot();
        let selection = select(
            &snapshot,
            RegistryType::ConceptMap,
            tenant,
            data_element,
            profile_url,
            as_of,
        )?;

        let target = selection
            .materialized
            .payload
            .as_map()
            .and_then(|map| map.get(source_key))
            .cloned();

        tracing::trace!(
            registry_id = %selection.entry.registry_id(),
            specificity = ?selection.specificity,
            source = %source_key,
            hit = target.is_some(),
            "Resolved concept mapping"
        );

        target
    }

    /// Ordered value set for the data element.
    pub fn resolve_set(
        &self,
        tenant: &str,
        data_element: &str,
        profile_url: Option<&str>,
    ) -> Option<Vec<TargetValue>> {
        self.resolve_set_as_of(tenant, data_element, profile_url, None)
    }

    pub fn resolve_set_as_of(
        &self,
        tenant: &str,
        data_element: &str,
        profile_url: Option<&str>,
        as_of: Option<DateTime<Utc>>,
    ) -> Option<Vec<TargetValue>> {
        self.select_set(tenant, data_element, profile_url, as_of)
            .and_then(|s| s.materialized.payload.as_set().map(|set| set.values().to_vec()))
    }

    /// Membership test against the value set, without copying it.
    ///
    /// `None` when no value set applies to the data element.
    pub fn value_set_contains(
        &self,
        tenant: &str,
        data_element: &str,
        profile_url: Option<&str>,
        code: &str,
        system: Option<&str>,
    ) -> Option<bool> {
        self.select_set(tenant, data_element, profile_url, None)
            .and_then(|s| s.materialized.payload.as_set().map(|set| set.contains(code, system)))
    }

    fn select_set(
        &self,
        tenant: &str,
        data_element: &str,
        profile_url: Option<&str>,
        as_of: Option<DateTime<Utc>>,
    ) -> Option<Selection> {
        let snapshot = self.store.snapshot();
        select(
            &snapshot,
            RegistryType::ValueSet,
            tenant,
            data_element,
            profile_url,
            as_of,
        )
    }
}

/// Highest-ranked descriptor of `registry_type` with a usable payload.
pub fn select(
    snapshot: &RegistrySnapshot,
    registry_type: RegistryType,
    tenant: &str,
    data_element: &str,
    profile_url: Option<&str>,
    as_of: Option<DateTime<Utc>>,
) -> Option<Selection> {
    let mut candidates: Vec<(Specificity, &Arc<RegistryEntry>)> = snapshot
        .for_element(data_element)
        .iter()
        .filter(|entry| entry.descriptor().registry_type == registry_type)
        .filter_map(|entry| {
            Specificity::of(entry.descriptor(), tenant, profile_url).map(|s| (s, entry))
        })
        .collect();

    // Stable: entries arrive in registry id order, which breaks ties
    candidates.sort_by_key(|(specificity, _)| *specificity);

    candidates.into_iter().find_map(|(specificity, entry)| {
        let materialized = entry.payload_as_of(as_of);
        materialized.is_usable().then(|| Selection {
            entry: entry.clone(),
            materialized,
            specificity,
        })
    })
}
