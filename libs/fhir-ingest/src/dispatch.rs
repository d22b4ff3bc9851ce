//! Profile selection
//!
//! Candidates are tried in declared priority order; the first whose
//! predicate accepts the record wins. Predicates never consult the registry,
//! so selection is unaffected by reloads.

use crate::profile::ProfileDescriptor;
use serde_json::Value;
use std::sync::Arc;

/// Routing outcome for one record.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// A candidate's predicate accepted the record
    Matched(Arc<ProfileDescriptor>),
    /// No candidate accepted; the configured default applies
    Default(Arc<ProfileDescriptor>),
    /// No candidate accepted and there is no default
    NoApplicableProfile,
}

impl Dispatch {
    pub fn profile(&self) -> Option<&Arc<ProfileDescriptor>> {
        match self {
            Self::Matched(profile) | Self::Default(profile) => Some(profile),
            Self::NoApplicableProfile => None,
        }
    }

    pub fn is_routed(&self) -> bool {
        !matches!(self, Self::NoApplicableProfile)
    }
}

/// Ordered candidate profiles for one kind of record, plus an optional
/// fallback.
#[derive(Debug, Clone, Default)]
pub struct ProfileDispatcher {
    candidates: Vec<Arc<ProfileDescriptor>>,
    default: Option<Arc<ProfileDescriptor>>,
}

impl ProfileDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate after those already registered.
    pub fn with_candidate(mut self, profile: ProfileDescriptor) -> Self {
        self.candidates.push(Arc::new(profile));
        self
    }

    pub fn with_default(mut self, profile: ProfileDescriptor) -> Self {
        self.default = Some(Arc::new(profile));
        self
    }

    pub fn candidates(&self) -> &[Arc<ProfileDescriptor>] {
        &self.candidates
    }

    pub fn default_profile(&self) -> Option<&Arc<ProfileDescriptor>> {
        self.default.as_ref()
    }

    pub fn dispatch(&self, record: &Value) -> Dispatch {
        if let Some(profile) = self.candidates.iter().find(|p| p.qualifies(record)) {
            tracing::trace!(profile = %profile.name(), "Record matched profile");
            return Dispatch::Matched(profile.clone());
        }

        match &self.default {
            Some(profile) => Dispatch::Default(profile.clone()),
            None => Dispatch::NoApplicableProfile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn by_class(name: &str, class: &'static str) -> ProfileDescriptor {
        ProfileDescriptor::new(name)
            .qualifies_when(move |record| record["class"]["code"].as_str() == Some(class))
    }

    fn dispatcher() -> ProfileDispatcher {
        ProfileDispatcher::new()
            .with_candidate(by_class("inpatient", "IMP"))
            .with_candidate(by_class("ambulatory", "AMB"))
            .with_candidate(ProfileDescriptor::new("any-encounter"))
    }

    #[test]
    fn test_first_qualifying_candidate_wins() {
        let record = json!({ "resourceType": "Encounter", "class": { "code": "AMB" } });
        let dispatch = dispatcher().dispatch(&record);
        assert!(matches!(&dispatch, Dispatch::Matched(p) if p.name() == "ambulatory"));

        // Catch-all candidate, not the default
        let record = json!({ "resourceType": "Encounter" });
        let dispatch = dispatcher().dispatch(&record);
        assert_eq!(dispatch.profile().map(|p| p.name()), Some("any-encounter"));
    }

    #[test]
    fn test_dispatch_is_deterministic() {
        let dispatcher = dispatcher();
        let record = json!({ "class": { "code": "IMP" } });
        for _ in 0..10 {
            assert_eq!(
                dispatcher.dispatch(&record).profile().map(|p| p.name().to_string()),
                Some("inpatient".to_string())
            );
        }
    }

    #[test]
    fn test_default_and_no_match() {
        let dispatcher = ProfileDispatcher::new().with_candidate(by_class("inpatient", "IMP"));
        let record = json!({ "class": { "code": "EMER" } });
        assert!(matches!(dispatcher.dispatch(&record), Dispatch::NoApplicableProfile));
        assert!(!dispatcher.dispatch(&record).is_routed());

        let dispatcher = dispatcher.with_default(ProfileDescriptor::new("fallback"));
        assert!(matches!(
            dispatcher.dispatch(&record),
            Dispatch::Default(p) if p.name() == "fallback"
        ));
    }
}
