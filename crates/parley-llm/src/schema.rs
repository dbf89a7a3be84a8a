//! JSON Schema normalization for tool parameters
//!
//! Several vendors reject array schemas that omit `items`. [`normalize`]
//! walks the schema tree and gives every array-typed node an `items`
//! (defaulting to `{}`), leaving everything else untouched.

use serde_json::{Map, Value};

/// Keywords whose value is a single subschema
const SCHEMA_KEYWORDS: &[&str] = &[
    "items",
    "additionalProperties",
    "contains",
    "if",
    "then",
    "else",
    "propertyNames",
    "not",
];

/// Keywords whose value maps names to subschemas
const SCHEMA_MAP_KEYWORDS: &[&str] = &["properties", "patternProperties", "definitions", "$defs"];

/// Keywords whose value is a list of subschemas
const SCHEMA_LIST_KEYWORDS: &[&str] = &["allOf", "anyOf", "oneOf", "prefixItems"];

/// Ensure every array-typed node carries `items`, in place
///
/// Idempotent: normalizing an already normalized schema changes nothing.
pub fn normalize(schema: &mut Value) {
    let Value::Object(node) = schema else {
        return;
    };

    if is_array_typed(node) && node.get("items").is_none_or(Value::is_null) {
        node.insert("items".to_owned(), Value::Object(Map::new()));
    }

    for keyword in SCHEMA_KEYWORDS {
        match node.get_mut(*keyword) {
            // Tuple-style `items` holds a list of schemas
            Some(Value::Array(list)) => list.iter_mut().for_each(normalize),
            Some(child) => normalize(child),
            None => {}
        }
    }

    for keyword in SCHEMA_MAP_KEYWORDS {
        if let Some(Value::Object(children)) = node.get_mut(*keyword) {
            children.values_mut().for_each(normalize);
        }
    }

    for keyword in SCHEMA_LIST_KEYWORDS {
        if let Some(Value::Array(children)) = node.get_mut(*keyword) {
            children.iter_mut().for_each(normalize);
        }
    }
}

/// Owned variant of [`normalize`]
pub fn normalized(mut schema: Value) -> Value {
    normalize(&mut schema);
    schema
}

fn is_array_typed(node: &Map<String, Value>) -> bool {
    match node.get("type") {
        Some(Value::String(t)) => t == "array",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("array")),
        _ => false,
    }
}
