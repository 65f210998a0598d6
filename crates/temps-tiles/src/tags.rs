//! String coercion for feature tags.

use serde_json::Value;

/// Tag text for a JSON value. `None` for null, which is never emitted as a tag.
pub fn json_tag_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(number_tag_value(n)),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Canonical text for a float; integral values carry no fractional part
pub fn float_tag_value(value: f64) -> String {
    format!("{}", value)
}

fn number_tag_value(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        n.as_f64().map(float_tag_value).unwrap_or_else(|| n.to_string())
    }
}

/// Flatten a JSON object into `(key, value)` tags; null members are skipped.
/// Non-objects yield nothing.
pub fn flatten_json_object(value: &Value) -> Vec<(String, String)> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter_map(|(k, v)| json_tag_value(v).map(|v| (k.clone(), v)))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_coercion() {
        assert_eq!(json_tag_value(&json!(null)), None);
        assert_eq!(json_tag_value(&json!(true)), Some("true".to_string()));
        assert_eq!(json_tag_value(&json!(9)), Some("9".to_string()));
        assert_eq!(json_tag_value(&json!(9.5)), Some("9.5".to_string()));
        assert_eq!(json_tag_value(&json!("there")), Some("there".to_string()));
        assert_eq!(json_tag_value(&json!([1, 2])), Some("[1,2]".to_string()));
    }

    #[test]
    fn test_float_canonical_form() {
        assert_eq!(float_tag_value(9.0), "9");
        assert_eq!(float_tag_value(-0.25), "-0.25");
    }

    #[test]
    fn test_flatten_skips_nulls() {
        let mut tags = flatten_json_object(&json!({"hello": "there", "good": "day", "gone": null}));
        tags.sort();
        assert_eq!(
            tags,
            vec![
                ("good".to_string(), "day".to_string()),
                ("hello".to_string(), "there".to_string()),
            ]
        );
        assert!(flatten_json_object(&json!("scalar")).is_empty());
    }
}
