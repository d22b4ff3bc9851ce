//! Built-in rule constructors
//!
//! Paths are relative to the resource root and follow [`crate::path`].

use crate::issue::{IssueCode, ValidationIssue};
use crate::path;
use crate::profile::{rule, Rule};
use serde_json::Value;

/// At least one non-empty value must be present at `path`.
pub fn required(path: impl Into<String>) -> Rule {
    let path = path.into();
    rule(move |record, ctx, issues| {
        let present = path::values(record, &path)
            .into_iter()
            .any(|v| !is_blank(v));
        if !present {
            issues.push(
                ValidationIssue::error(
                    IssueCode::Required,
                    format!("Required element '{}' is missing", path),
                )
                .with_location(ctx.location(&path)),
            );
        }
    })
}

/// Every code at `path` must be one of `codes`.
///
/// Accepts plain codes, Codings and CodeableConcepts at the path.
pub fn one_of<I, S>(path: impl Into<String>, codes: I) -> Rule
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let path = path.into();
    let allowed: Vec<String> = codes.into_iter().map(Into::into).collect();
    rule(move |record, ctx, issues| {
        for value in path::values(record, &path) {
            for (code, _) in codes_of(value) {
                if !allowed.iter().any(|a| a == code) {
                    issues.push(
                        ValidationIssue::error(
                            IssueCode::CodeInvalid,
                            format!(
                                "Code '{}' is not one of [{}]",
                                code,
                                allowed.join(", ")
                            ),
                        )
                        .with_location(ctx.location(&path)),
                    );
                }
            }
        }
    })
}

/// Codes at `path` must be members of the value set registered for
/// `data_element`.
///
/// A CodeableConcept passes when any of its codings is a member. When no
/// value set applies to the tenant and profile the rule does nothing.
pub fn value_set_member(path: impl Into<String>, data_element: impl Into<String>) -> Rule {
    let path = path.into();
    let data_element = data_element.into();
    rule(move |record, ctx, issues| {
        for value in path::values(record, &path) {
            let codes = codes_of(value);
            if codes.is_empty() {
                continue;
            }

            let mut applies = false;
            let mut member = false;
            for (code, system) in &codes {
                match ctx.resolver.value_set_contains(
                    ctx.tenant,
                    &data_element,
                    ctx.profile_url,
                    code,
                    *system,
                ) {
                    None => {}
                    Some(found) => {
                        applies = true;
                        member |= found;
                    }
                }
            }

            if !applies {
                tracing::debug!(
                    data_element = %data_element,
                    tenant = %ctx.tenant,
                    "No value set registered, skipping membership check"
                );
                return;
            }

            if !member {
                let shown: Vec<String> = codes
                    .iter()
                    .map(|(code, system)| match system {
                        Some(system) => format!("{}|{}", system, code),
                        None => code.to_string(),
                    })
                    .collect();
                issues.push(
                    ValidationIssue::error(
                        IssueCode::CodeInvalid,
                        format!(
                            "Code {} is not in the value set for '{}'",
                            shown.join(", "),
                            data_element
                        ),
                    )
                    .with_location(ctx.location(&path)),
                );
            }
        }
    })
}

/// `(code, system)` pairs carried by a code, Coding or CodeableConcept.
pub(crate) fn codes_of(value: &Value) -> Vec<(&str, Option<&str>)> {
    match value {
        Value::String(code) => vec![(code.as_str(), None)],
        Value::Object(map) => {
            if let Some(Value::Array(codings)) = map.get("coding") {
                codings.iter().filter_map(coding_code).collect()
            } else {
                coding_code(value).into_iter().collect()
            }
        }
        _ => Vec::new(),
    }
}

fn coding_code(coding: &Value) -> Option<(&str, Option<&str>)> {
    let code = coding.get("code")?.as_str()?;
    Some((code, coding.get("system").and_then(Value::as_str)))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
