//! Validation issues and the per-record report

use serde_json::Value;
use std::fmt;

/// Everything a record's pass through validation and transformation found.
///
/// Stages only ever append; a report is returned to the caller, never raised.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.issues.extend(other.issues);
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == IssueSeverity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Warning)
            .count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
    }

    pub fn to_operation_outcome(&self) -> Value {
        serde_json::json!({
            "resourceType": "OperationOutcome",
            "issue": self.issues.iter().map(|i| i.to_json()).collect::<Vec<_>>()
        })
    }
}

impl From<Vec<ValidationIssue>> for ValidationReport {
    fn from(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }
}

/// Individual validation issue
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub code: IssueCode,
    pub diagnostics: String,
    pub location: Option<String>,
}

impl ValidationIssue {
    pub fn error(code: IssueCode, diagnostics: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            code,
            diagnostics: diagnostics.into(),
            location: None,
        }
    }

    pub fn warning(code: IssueCode, diagnostics: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            code,
            diagnostics: diagnostics.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    fn to_json(&self) -> Value {
        let mut issue = serde_json::json!({
            "severity": self.severity.to_string().to_lowercase(),
            "code": self.code.to_string(),
            "diagnostics": self.diagnostics,
        });

        if let Some(ref loc) = self.location {
            issue["location"] = serde_json::json!([loc]);
            issue["expression"] = serde_json::json!([loc]);
        }

        issue
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(
                f,
                "{} [{}] {}: {}",
                self.severity, self.code, loc, self.diagnostics
            ),
            None => write!(f, "{} [{}] {}", self.severity, self.code, self.diagnostics),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    Error,
    Warning,
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "Error"),
            Self::Warning => write!(f, "Warning"),
        }
    }
}

/// FHIR issue-type codes used by ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueCode {
    Required,
    Value,
    CodeInvalid,
    Invariant,
    Structure,
    NotFound,
    Processing,
    BusinessRule,
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Required => "required",
            Self::Value => "value",
            Self::CodeInvalid => "code-invalid",
            Self::Invariant => "invariant",
            Self::Structure => "structure",
            Self::NotFound => "not-found",
            Self::Processing => "processing",
            Self::BusinessRule => "business-rule",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let report = ValidationReport::from(vec![
            ValidationIssue::error(IssueCode::Required, "Missing required field"),
            ValidationIssue::warning(IssueCode::CodeInvalid, "Unmapped code"),
            ValidationIssue::warning(IssueCode::Processing, "No profile"),
        ]);

        assert!(report.has_errors());
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.warning_count(), 2);
        assert_eq!(report.errors().count(), 1);
    }

    #[test]
    fn test_merge_keeps_order() {
        let mut report = ValidationReport::new();
        report.push(ValidationIssue::warning(IssueCode::Value, "first"));

        let mut other = ValidationReport::new();
        other.push(ValidationIssue::error(IssueCode::Invariant, "second"));
        report.merge(other);

        let diagnostics: Vec<_> = report.issues.iter().map(|i| i.diagnostics.as_str()).collect();
        assert_eq!(diagnostics, vec!["first", "second"]);
    }

    #[test]
    fn test_operation_outcome() {
        let report = ValidationReport::from(vec![ValidationIssue::error(
            IssueCode::Required,
            "Resource id is missing",
        )
        .with_location("Patient.id")]);

        let outcome = report.to_operation_outcome();
        assert_eq!(outcome["resourceType"], "OperationOutcome");
        assert_eq!(outcome["issue"][0]["severity"], "error");
        assert_eq!(outcome["issue"][0]["code"], "required");
        assert_eq!(outcome["issue"][0]["location"][0], "Patient.id");
    }

    #[test]
    fn test_empty_report_has_no_errors() {
        let report = ValidationReport::new();
        assert!(report.is_empty());
        assert!(!report.has_errors());
        assert_eq!(
            report.to_operation_outcome()["issue"],
            serde_json::json!([])
        );
    }
}
