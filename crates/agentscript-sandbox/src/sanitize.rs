//! Rust-side deep sanitization backstop (spec §4.3.5).
//!
//! The inner isolate's `__ag_safe_stringify` (see `bootstrap.rs`) already
//! caps depth/property count and neutralizes cycles before a value ever
//! leaves QuickJS as a JSON string; a `serde_json::Value` parsed from that
//! string cannot itself be circular. This module re-applies the same caps
//! on the Rust side purely as defense-in-depth (spec §9: "the runtime proxy
//! is the backstop"; the same reasoning applies one layer further out, in
//! case a future caller hands a `Value` to `sanitize` that did not pass
//! through the JS stringifier at all — e.g. a tool result assembled
//! directly in Rust).

use serde_json::Value;

/// Walk `value` and truncate anything past `max_depth`/`max_properties`,
/// matching the JS-side `__ag_safe_stringify` contract in `bootstrap.rs`.
/// Objects/arrays beyond the cap collapse to `"[Truncated]"` rather than
/// erroring, since by the time a `Value` reaches this function the
/// execution that produced it has already completed — there is no
/// execution context left to charge a ceiling breach against.
pub fn sanitize(value: &Value, max_depth: u32, max_properties: u32) -> Value {
    let mut remaining = max_properties;
    walk(value, 0, max_depth, &mut remaining)
}

fn walk(value: &Value, depth: u32, max_depth: u32, remaining: &mut u32) -> Value {
    match value {
        Value::Array(items) => {
            if depth >= max_depth {
                return Value::String("[Truncated]".to_string());
            }
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                if *remaining == 0 {
                    out.push(Value::String("[Truncated]".to_string()));
                    break;
                }
                *remaining -= 1;
                out.push(walk(item, depth + 1, max_depth, remaining));
            }
            Value::Array(out)
        }
        Value::Object(map) => {
            if depth >= max_depth {
                return Value::String("[Truncated]".to_string());
            }
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                if *remaining == 0 {
                    out.insert("__ag_truncated".to_string(), Value::Bool(true));
                    break;
                }
                *remaining -= 1;
                out.insert(key.clone(), walk(val, depth + 1, max_depth, remaining));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_pass_through_unchanged() {
        let v = json!({"a": 1, "b": "two", "c": true, "d": null});
        assert_eq!(sanitize(&v, 10, 100), v);
    }

    #[test]
    fn truncates_beyond_max_depth() {
        let v = json!({"a": {"b": {"c": {"d": 1}}}});
        let sanitized = sanitize(&v, 2, 100);
        assert_eq!(sanitized["a"]["b"], json!("[Truncated]"));
    }

    #[test]
    fn truncates_beyond_max_properties() {
        let v = json!({"a": 1, "b": 2, "c": 3, "d": 4});
        let sanitized = sanitize(&v, 10, 2);
        let obj = sanitized.as_object().unwrap();
        assert!(obj.contains_key("__ag_truncated"));
        assert!(obj.len() <= 3);
    }

    #[test]
    fn arrays_are_depth_and_count_capped_the_same_way() {
        let v = json!([1, 2, 3, 4, 5]);
        let sanitized = sanitize(&v, 10, 3);
        let arr = sanitized.as_array().unwrap();
        assert_eq!(arr.last().unwrap(), &json!("[Truncated]"));
    }
}
