//! Profiles as plain data
//!
//! A [`ProfileDescriptor`] bundles a qualification predicate, structural and
//! extended rules, an optional transform hook and profile-specific coded
//! fields. Profiles are composed by value; there is no rule hierarchy.

use crate::issue::ValidationIssue;
use crate::transform::CodedField;
use ferrum_mapping::SpecificityResolver;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// What a rule may consult besides the record itself.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub tenant: &'a str,
    pub resource_type: &'a str,
    pub profile_url: Option<&'a str>,
    pub resolver: &'a SpecificityResolver,
}

impl RuleContext<'_> {
    /// Issue location for a path relative to the resource root.
    pub fn location(&self, path: &str) -> String {
        format!("{}.{}", self.resource_type, path)
    }
}

/// Validation rule; appends what it finds.
pub type Rule = Arc<dyn Fn(&Value, &RuleContext<'_>, &mut Vec<ValidationIssue>) + Send + Sync>;

/// Selection predicate. Must only look at the record.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

pub type TransformHook = Arc<dyn Fn(&mut Value) + Send + Sync>;

/// Wrap a closure as a [`Rule`].
pub fn rule<F>(f: F) -> Rule
where
    F: Fn(&Value, &RuleContext<'_>, &mut Vec<ValidationIssue>) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
pub struct ProfileDescriptor {
    name: String,
    url: Option<String>,
    qualifies: Predicate,
    structural: Vec<Rule>,
    extended: Vec<Rule>,
    transform: Option<TransformHook>,
    coded_fields: Vec<CodedField>,
}

impl ProfileDescriptor {
    /// Profile that qualifies every record until a predicate is set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
            qualifies: Arc::new(|_: &Value| true),
            structural: Vec::new(),
            extended: Vec::new(),
            transform: None,
            coded_fields: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn qualifies_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.qualifies = Arc::new(predicate);
        self
    }

    pub fn with_structural_rule(mut self, rule: Rule) -> Self {
        self.structural.push(rule);
        self
    }

    /// Organization-specific rule; may consult the registry.
    pub fn with_extended_rule(mut self, rule: Rule) -> Self {
        self.extended.push(rule);
        self
    }

    pub fn with_transform<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Value) + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(hook));
        self
    }

    pub fn with_coded_field(mut self, field: CodedField) -> Self {
        self.coded_fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn coded_fields(&self) -> &[CodedField] {
        &self.coded_fields
    }

    pub fn qualifies(&self, record: &Value) -> bool {
        (self.qualifies)(record)
    }

    pub fn validate_structural(
        &self,
        record: &Value,
        ctx: &RuleContext<'_>,
        issues: &mut Vec<ValidationIssue>,
    ) {
        for rule in &self.structural {
            rule(record, ctx, issues);
        }
    }

    pub fn validate_extended(
        &self,
        record: &Value,
        ctx: &RuleContext<'_>,
        issues: &mut Vec<ValidationIssue>,
    ) {
        for rule in &self.extended {
            rule(record, ctx, issues);
        }
    }

    pub fn apply_transform(&self, record: &mut Value) {
        if let Some(hook) = &self.transform {
            hook(record);
        }
    }
}

impl fmt::Debug for ProfileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileDescriptor")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("structural_rules", &self.structural.len())
            .field("extended_rules", &self.extended.len())
            .field("transform", &self.transform.is_some())
            .field("coded_fields", &self.coded_fields)
            .finish()
    }
}
