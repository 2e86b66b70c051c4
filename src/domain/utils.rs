//! Shape-of-contract validation of tool arguments against a declared input schema

use serde_json::Value;

use crate::domain::registry::JsonObject;

/// Checks `arguments` against the `required`, `properties` and
/// `additionalProperties` keys of a JSON-Schema-like object and fills in
/// property defaults. Nested schemas are not inspected.
pub fn validate_arguments(schema: &Value, mut arguments: JsonObject) -> Result<JsonObject, String> {
    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect::<Vec<_>>())
        .unwrap_or_default();

    if let Some(missing) = required
        .iter()
        .find(|name| arguments.get(**name).map_or(true, Value::is_null))
    {
        return Err(format!("missing required argument '{missing}'"));
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(arguments);
    };

    let allow_additional = schema
        .get("additionalProperties")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !allow_additional {
        if let Some(unexpected) = arguments
            .keys()
            .find(|key| !properties.contains_key(key.as_str()))
        {
            return Err(format!("unexpected argument '{unexpected}'"));
        }
    }

    for (name, property) in properties {
        match arguments.get(name).filter(|value| !value.is_null()) {
            Some(value) => {
                if let Some(expected) = property.get("type").and_then(Value::as_str) {
                    if !matches_type(expected, value) {
                        return Err(format!("argument '{name}' must be of type {expected}"));
                    }
                }
            }
            None => match property.get("default") {
                Some(default) => {
                    arguments.insert(name.clone(), default.clone());
                }
                None => {
                    arguments.remove(name);
                }
            },
        }
    }

    Ok(arguments)
}

pub fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}
