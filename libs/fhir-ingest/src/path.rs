//! Dotted element paths over JSON records
//!
//! A path such as `type.coding` is resolved relative to the resource root.
//! Arrays are flattened at every step, so `type.coding` visits every coding
//! of every `type` entry.

use serde_json::{Map, Value};

fn segments(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

/// All values found at `path`.
pub fn values<'a>(root: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut found = Vec::new();
    collect(root, &segments(path), &mut found);
    found
}

fn collect<'a>(value: &'a Value, segments: &[&str], found: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect(item, segments, found);
            }
        }
        _ => match segments.split_first() {
            None => found.push(value),
            Some((head, rest)) => {
                if let Some(child) = value.get(*head) {
                    collect(child, rest, found);
                }
            }
        },
    }
}

/// Call `f` on every value found at `path`.
pub fn for_each_mut(root: &mut Value, path: &str, f: &mut dyn FnMut(&mut Value)) {
    visit_mut(root, &segments(path), f);
}

fn visit_mut(value: &mut Value, segments: &[&str], f: &mut dyn FnMut(&mut Value)) {
    match value {
        Value::Array(items) => {
            for item in items {
                visit_mut(item, segments, f);
            }
        }
        _ => match segments.split_first() {
            None => f(value),
            Some((head, rest)) => {
                if let Some(child) = value.get_mut(*head) {
                    visit_mut(child, rest, f);
                }
            }
        },
    }
}

/// Call `f` with every object that owns the last segment of `path`, together
/// with that segment. Used where a primitive needs its `_field` sibling.
pub fn for_each_parent_mut(
    root: &mut Value,
    path: &str,
    f: &mut dyn FnMut(&mut Map<String, Value>, &str),
) {
    let segments = segments(path);
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    visit_mut(root, parents, &mut |value: &mut Value| {
        if let Value::Object(map) = value {
            f(map, last);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_values_flatten_arrays() {
        let record = json!({
            "type": [
                { "coding": [ { "code": "a" }, { "code": "b" } ] },
                { "coding": [ { "code": "c" } ] }
            ]
        });

        let codes: Vec<_> = values(&record, "type.coding.code")
            .into_iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(codes, vec!["a", "b", "c"]);
        assert!(values(&record, "status").is_empty());
    }

    #[test]
    fn test_for_each_mut_rewrites_in_place() {
        let mut record = json!({ "class": { "code": "AMB" } });
        for_each_mut(&mut record, "class.code", &mut |v: &mut Value| *v = json!("IMP"));
        assert_eq!(record["class"]["code"], "IMP");
    }

    #[test]
    fn test_for_each_parent_mut_sees_owner() {
        let mut record = json!({ "participant": [ { "status": "A" }, { "status": "B" } ] });
        let mut seen = Vec::new();
        for_each_parent_mut(
            &mut record,
            "participant.status",
            &mut |map: &mut Map<String, Value>, key: &str| {
                seen.push(map[key].as_str().unwrap_or_default().to_string());
            },
        );
        assert_eq!(seen, vec!["A", "B"]);
    }
}
