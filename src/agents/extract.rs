use serde_json::Value;

/// Pull a JSON value out of free-form model text.
///
/// Tries, in order: the whole text, the outermost `{...}` span, the
/// outermost `[...]` span. Models routinely wrap JSON in prose or code
/// fences, so the first attempt alone is not enough.
pub fn extract_json(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    span(text, '{', '}').or_else(|| span(text, '[', ']'))
}

fn span(text: &str, open: char, close: char) -> Option<Value> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_bare_json() {
        assert_eq!(extract_json(r#"{"a": 1}"#), Some(json!({"a": 1})));
        assert_eq!(extract_json("[1, 2]"), Some(json!([1, 2])));
    }

    #[test]
    fn parses_fenced_object() {
        let text = "Here you go:\n```json\n{\"ticker\": \"IBM\"}\n```\nThanks.";
        assert_eq!(extract_json(text), Some(json!({"ticker": "IBM"})));
    }

    #[test]
    fn falls_back_to_array_span() {
        let text = "Results: [{\"a\": 1}, {\"b\": 2}] done";
        // The object span `{"a": 1}, {"b": 2}` is not valid JSON.
        assert_eq!(extract_json(text), Some(json!([{"a": 1}, {"b": 2}])));
    }

    #[test]
    fn rejects_prose() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }
}
