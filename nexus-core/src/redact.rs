//! Metadata redaction used by the audit pipeline (spec §4.11) and shared by
//! any crate that logs structured data containing tenant content.

use serde_json::Value;

const SENSITIVE_PATTERN_FRAGMENTS: [&str; 6] =
    ["api_key", "authorization", "token", "secret", "password", "content"];

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower == "text" || SENSITIVE_PATTERN_FRAGMENTS.iter().any(|frag| lower.contains(frag))
}

/// Redacts any object key matching (case-insensitively) `api_key|authorization|
/// token|secret|password|text|content`, recursively. Idempotent: redacting an
/// already-redacted value returns the same value.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if is_sensitive_key(k) {
                    out.insert(k.clone(), Value::String("[REDACTED]".to_string()));
                } else {
                    out.insert(k.clone(), redact(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_case_insensitively_and_nested() {
        let input = json!({
            "Api_Key": "sk-live-123",
            "nested": { "Authorization": "Bearer xyz", "safe": "ok" },
            "password": "hunter2",
            "text": "the user said hello",
            "count": 5,
        });
        let redacted = redact(&input);
        assert_eq!(redacted["Api_Key"], json!("[REDACTED]"));
        assert_eq!(redacted["nested"]["Authorization"], json!("[REDACTED]"));
        assert_eq!(redacted["nested"]["safe"], json!("ok"));
        assert_eq!(redacted["password"], json!("[REDACTED]"));
        assert_eq!(redacted["text"], json!("[REDACTED]"));
        assert_eq!(redacted["count"], json!(5));
    }

    #[test]
    fn is_idempotent() {
        let input = json!({"secret": "xyz", "ok": 1});
        let once = redact(&input);
        let twice = redact(&once);
        assert_eq!(once, twice);
    }
}
