//! Staged record validation
//!
//! Stages run in a fixed order and always run to completion:
//! 1. base rules for the record's resource type, then the profile's
//!    structural rules
//! 2. implementation-guide rules for the resource type
//! 3. the profile's extended rules, which may consult the registry
//!
//! An ERROR in an early stage never stops a later one.

use crate::issue::{ValidationIssue, ValidationReport};
use crate::profile::{ProfileDescriptor, Rule, RuleContext};
use crate::rules;
use ferrum_mapping::SpecificityResolver;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

#[derive(Clone)]
pub struct ValidationEngine {
    resolver: SpecificityResolver,
    base_rules: HashMap<String, Vec<Rule>>,
    guide_rules: HashMap<String, Vec<Rule>>,
}

impl ValidationEngine {
    pub fn new(resolver: SpecificityResolver) -> Self {
        Self {
            resolver,
            base_rules: HashMap::new(),
            guide_rules: HashMap::new(),
        }
    }

    /// Engine whose base stage requires `resourceType` and `id` on every
    /// record.
    pub fn with_core_rules(resolver: SpecificityResolver) -> Self {
        Self::new(resolver)
            .with_base_rule("*", rules::required("resourceType"))
            .with_base_rule("*", rules::required("id"))
    }

    /// Base structural rule for `resource_type`; `*` applies to every type.
    pub fn with_base_rule(mut self, resource_type: impl Into<String>, rule: Rule) -> Self {
        self.base_rules
            .entry(resource_type.into())
            .or_default()
            .push(rule);
        self
    }

    /// Implementation-guide rule for `resource_type`; `*` applies to every type.
    pub fn with_guide_rule(mut self, resource_type: impl Into<String>, rule: Rule) -> Self {
        self.guide_rules
            .entry(resource_type.into())
            .or_default()
            .push(rule);
        self
    }

    pub fn resolver(&self) -> &SpecificityResolver {
        &self.resolver
    }

    pub fn validate(
        &self,
        record: &Value,
        profile: &ProfileDescriptor,
        tenant: &str,
    ) -> ValidationReport {
        let resource_type = record
            .get("resourceType")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let ctx = RuleContext {
            tenant,
            resource_type,
            profile_url: profile.url(),
            resolver: &self.resolver,
        };

        let mut issues: Vec<ValidationIssue> = Vec::new();

        run_rules(&self.base_rules, record, &ctx, &mut issues);
        profile.validate_structural(record, &ctx, &mut issues);
        let structural = issues.len();

        run_rules(&self.guide_rules, record, &ctx, &mut issues);
        let guide = issues.len() - structural;

        profile.validate_extended(record, &ctx, &mut issues);
        let extended = issues.len() - structural - guide;

        tracing::debug!(
            resource_type = %resource_type,
            profile = %profile.name(),
            structural,
            guide,
            extended,
            "Validated record"
        );

        ValidationReport::from(issues)
    }
}

fn run_rules(
    rules: &HashMap<String, Vec<Rule>>,
    record: &Value,
    ctx: &RuleContext<'_>,
    issues: &mut Vec<ValidationIssue>,
) {
    let generic = rules.get("*").into_iter().flatten();
    let specific = rules.get(ctx.resource_type).into_iter().flatten();
    for rule in generic.chain(specific) {
        rule(record, ctx, issues);
    }
}

impl fmt::Debug for ValidationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = |rules: &HashMap<String, Vec<Rule>>| rules.values().map(Vec::len).sum::<usize>();
        f.debug_struct("ValidationEngine")
            .field("base_rules", &count(&self.base_rules))
            .field("guide_rules", &count(&self.guide_rules))
            .finish()
    }
}
