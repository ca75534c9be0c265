//! Diff generation for audit logging

use serde_json::Value;

/// Generate a human-readable diff between two JSON values
///
/// Only top-level field changes are listed. Nested objects are descended
/// one level so rule counter changes show up as `stats.override_count`.
pub fn generate_diff(before: &Value, after: &Value) -> Option<String> {
    let mut changes = Vec::new();
    collect_changes(before, after, "", 1, &mut changes);

    if changes.is_empty() {
        None
    } else {
        Some(changes.join(", "))
    }
}

fn collect_changes(before: &Value, after: &Value, prefix: &str, depth: u8, out: &mut Vec<String>) {
    let field = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", prefix, key)
        }
    };

    match (before, after) {
        (Value::Object(before_obj), Value::Object(after_obj)) => {
            for (key, before_val) in before_obj {
                match after_obj.get(key) {
                    Some(after_val) if before_val == after_val => {}
                    Some(after_val) if depth > 0 && before_val.is_object() && after_val.is_object() => {
                        collect_changes(before_val, after_val, &field(key), depth - 1, out);
                    }
                    Some(after_val) => out.push(format!(
                        "{}: {} -> {}",
                        field(key),
                        format_value(before_val),
                        format_value(after_val)
                    )),
                    None => out.push(format!(
                        "{}: {} -> (removed)",
                        field(key),
                        format_value(before_val)
                    )),
                }
            }

            for (key, after_val) in after_obj {
                if !before_obj.contains_key(key) {
                    out.push(format!("{}: (added) -> {}", field(key), format_value(after_val)));
                }
            }
        }
        _ if before != after => {
            let label = if prefix.is_empty() { String::new() } else { format!("{}: ", prefix) };
            out.push(format!("{}{} -> {}", label, format_value(before), format_value(after)));
        }
        _ => {}
    }
}

/// Format a JSON value for human-readable display
fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            if s.chars().count() > 50 {
                let truncated: String = s.chars().take(47).collect();
                format!("\"{}...\"", truncated)
            } else {
                format!("\"{}\"", s)
            }
        }
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Object(obj) => format!("{{{} fields}}", obj.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_field_change() {
        let before = json!({"name": "Woolworths", "confidence": 75});
        let after = json!({"name": "Woolworths", "confidence": 90});

        let diff = generate_diff(&before, &after).unwrap();
        assert_eq!(diff, "confidence: 75 -> 90");
    }

    #[test]
    fn test_nested_counter_change() {
        let before = json!({"stats": {"applied_count": 4, "override_count": 0}});
        let after = json!({"stats": {"applied_count": 4, "override_count": 1}});

        let diff = generate_diff(&before, &after).unwrap();
        assert_eq!(diff, "stats.override_count: 0 -> 1");
    }

    #[test]
    fn test_added_and_removed_fields() {
        let before = json!({"category_id": "groceries"});
        let after = json!({"tags": ["weekly"]});

        let diff = generate_diff(&before, &after).unwrap();
        assert!(diff.contains("category_id: \"groceries\" -> (removed)"));
        assert!(diff.contains("tags: (added) -> [1 items]"));
    }

    #[test]
    fn test_no_changes() {
        let value = json!({"name": "Same"});
        assert!(generate_diff(&value, &value).is_none());
    }

    #[test]
    fn test_long_string_truncated() {
        let long = "X".repeat(80);
        let diff = generate_diff(&json!({"pattern": "A"}), &json!({"pattern": long})).unwrap();
        assert!(diff.ends_with("...\""));
    }
}
