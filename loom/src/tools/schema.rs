//! Minimal JSON-schema argument checker.
//!
//! Covers the subset tool specs actually use: `type`, `required`,
//! `properties`, `enum`, and array `items`. Unknown keywords and extra
//! properties are tolerated.

use serde_json::Value;

/// Validates `args` against `schema`. Returns the first violation found.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    validate_at(schema, args, "$")
}

fn validate_at(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    let Some(schema_obj) = schema.as_object() else {
        // A non-object schema constrains nothing.
        return Ok(());
    };

    if let Some(expected) = schema_obj.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            return Err(format!(
                "{}: expected {}, got {}",
                path,
                expected,
                type_name(value)
            ));
        }
    }

    if let Some(allowed) = schema_obj.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!("{}: value not in enum", path));
        }
    }

    if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if value.get(name).is_none() {
                return Err(format!("{}: missing required field '{}'", path, name));
            }
        }
    }

    if let Some(properties) = schema_obj.get("properties").and_then(Value::as_object) {
        for (name, prop_schema) in properties {
            if let Some(prop_value) = value.get(name) {
                validate_at(prop_schema, prop_value, &format!("{}.{}", path, name))?;
            }
        }
    }

    if let Some(items) = schema_obj.get("items") {
        if let Some(array) = value.as_array() {
            for (i, item) in array.iter().enumerate() {
                validate_at(items, item, &format!("{}[{}]", path, i))?;
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": { "type": "string" },
                "limit": { "type": "integer" },
                "mode": { "type": "string", "enum": ["fast", "thorough"] },
                "tags": { "type": "array", "items": { "type": "string" } }
            }
        })
    }

    #[test]
    fn accepts_valid_args() {
        let args = json!({"query": "find x", "limit": 3, "mode": "fast", "tags": ["a"]});
        assert!(validate_args(&schema(), &args).is_ok());
    }

    #[test]
    fn rejects_missing_required() {
        let err = validate_args(&schema(), &json!({"limit": 3})).unwrap_err();
        assert!(err.contains("query"));
    }

    #[test]
    fn rejects_wrong_type() {
        let err = validate_args(&schema(), &json!({"query": 42})).unwrap_err();
        assert!(err.contains("expected string"));
    }

    #[test]
    fn rejects_enum_violation() {
        let err =
            validate_args(&schema(), &json!({"query": "q", "mode": "sloppy"})).unwrap_err();
        assert!(err.contains("enum"));
    }

    #[test]
    fn rejects_bad_array_item() {
        let err = validate_args(&schema(), &json!({"query": "q", "tags": [1]})).unwrap_err();
        assert!(err.contains("tags[0]"));
    }

    #[test]
    fn tolerates_extra_properties() {
        let args = json!({"query": "q", "unknown_extra": true});
        assert!(validate_args(&schema(), &args).is_ok());
    }
}
