//! Robust extraction of JSON objects from LLM output.
//!
//! Providers wrap JSON in markdown fences or prose more often than
//! they should. The extractor runs two passes: strip fences and parse,
//! then fall back to the outermost `{…}` span. Any non-object result
//! is treated as unparseable.

use serde_json::Value;

/// Extract the first JSON object from raw model output.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let mut content = text.trim();

    if content.starts_with("```") {
        content = content.trim_start_matches("```json").trim_start_matches("```");
        content = content.trim_end_matches("```");
        content = content.trim();
    }

    if let Ok(parsed) = serde_json::from_str::<Value>(content) {
        if parsed.is_object() {
            return Some(parsed);
        }
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    let candidate = &content[start..=end];
    match serde_json::from_str::<Value>(candidate) {
        Ok(parsed) if parsed.is_object() => Some(parsed),
        _ => None,
    }
}

/// Convenience readers for loosely-typed provider JSON.
pub fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

pub fn f64_field(value: &Value, key: &str, default: f64) -> f64 {
    value.get(key).and_then(Value::as_f64).unwrap_or(default)
}

pub fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub fn string_list_field(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let parsed = extract_json_object(r#"{"a": 1}"#).unwrap();
        assert_eq!(parsed["a"], 1);
    }

    #[test]
    fn test_fenced_object() {
        let parsed = extract_json_object("```json\n{\"a\": 1}\n```").unwrap();
        assert_eq!(parsed["a"], 1);
    }

    #[test]
    fn test_object_embedded_in_prose() {
        let parsed =
            extract_json_object("Sure! Here you go: {\"segments\": [\"一\", \"二\"]} hope it helps")
                .unwrap();
        assert_eq!(parsed["segments"][0], "一");
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(extract_json_object("[1, 2, 3]").is_none());
        assert!(extract_json_object("plain text").is_none());
        assert!(extract_json_object("").is_none());
    }

    #[test]
    fn test_field_readers() {
        let value = serde_json::json!({
            "name": "  林远 ",
            "confidence": 0.8,
            "flag": true,
            "items": ["a", " b ", ""],
        });
        assert_eq!(str_field(&value, "name"), "林远");
        assert!((f64_field(&value, "confidence", 0.0) - 0.8).abs() < 1e-9);
        assert!(bool_field(&value, "flag"));
        assert_eq!(string_list_field(&value, "items"), vec!["a", "b"]);
        assert_eq!(str_field(&value, "missing"), "");
    }
}
