//! JSON Schema sanitization for the two upstream model families.
//!
//! Tool input schemas arrive in full JSON Schema dialects that neither
//! upstream accepts. Two rewriters bridge the gap:
//!
//! - [`sanitize_for_antigravity`] — allow-list rewrite used for Claude
//!   destinations. Keeps `{type, description, properties, required,
//!   items, enum, title}`, converts `const` to a one-element `enum`, and
//!   guarantees every object schema has at least one property.
//! - [`clean_schema_for_gemini`] — multi-phase rewrite used for Gemini
//!   destinations. Gemini rejects `$ref`, composition keywords, and most
//!   constraints outright, so the rewriter folds what it can into the
//!   `description` and strips the rest.
//!
//! Both functions are pure tree maps over `serde_json::Value` and never
//! fail: any input that is not a non-null object is handled by the
//! documented placeholder/identity rules.

use serde_json::{json, Map, Value};

/// Keys kept by the Claude-destination allow-list.
const ANTIGRAVITY_ALLOWED_KEYS: &[&str] = &[
    "type",
    "description",
    "properties",
    "required",
    "items",
    "enum",
    "title",
];

/// Keys removed by the final Gemini strip phase.
const GEMINI_STRIPPED_KEYS: &[&str] = &[
    "additionalProperties",
    "default",
    "$schema",
    "$defs",
    "definitions",
    "$ref",
    "$id",
    "$comment",
    "title",
    "minLength",
    "maxLength",
    "pattern",
    "format",
    "minItems",
    "maxItems",
    "examples",
    "allOf",
    "anyOf",
    "oneOf",
];

/// Scalar constraints folded into the description before stripping.
const LIFTED_CONSTRAINTS: &[&str] = &[
    "minLength",
    "maxLength",
    "pattern",
    "minimum",
    "maximum",
    "minItems",
    "maxItems",
    "format",
];

// ============================================================================
// Claude path
// ============================================================================

/// Sanitize a tool schema for a Claude destination.
///
/// Null, missing, or empty input yields the placeholder schema with a
/// synthetic `reason` property.
pub fn sanitize_for_antigravity(schema: &Value) -> Value {
    match schema {
        Value::Object(obj) if !obj.is_empty() => sanitize_antigravity_object(obj),
        _ => placeholder_schema(),
    }
}

fn sanitize_antigravity_object(obj: &Map<String, Value>) -> Value {
    let mut result = Map::new();

    for (key, value) in obj {
        if key == "const" {
            result.insert("enum".to_string(), Value::Array(vec![value.clone()]));
            continue;
        }
        if !ANTIGRAVITY_ALLOWED_KEYS.contains(&key.as_str()) {
            continue;
        }

        match key.as_str() {
            "properties" => {
                if let Value::Object(props) = value {
                    let sanitized: Map<String, Value> = props
                        .iter()
                        .map(|(name, prop)| (name.clone(), sanitize_for_antigravity(prop)))
                        .collect();
                    result.insert("properties".to_string(), Value::Object(sanitized));
                }
            }
            "items" => {
                result.insert("items".to_string(), sanitize_antigravity_items(value));
            }
            _ => {
                result.insert(key.clone(), value.clone());
            }
        }
    }

    if !result.contains_key("type") {
        result.insert("type".to_string(), Value::String("object".to_string()));
    }

    let is_object = result
        .get("type")
        .and_then(|v| v.as_str())
        .is_some_and(|t| t.eq_ignore_ascii_case("object"));

    if is_object {
        let has_properties = result
            .get("properties")
            .and_then(|v| v.as_object())
            .is_some_and(|p| !p.is_empty());

        if !has_properties {
            result.insert("properties".to_string(), reason_property());
            result.insert("required".to_string(), json!(["reason"]));
        }
    }

    validate_required(&mut result);
    Value::Object(result)
}

fn sanitize_antigravity_items(items: &Value) -> Value {
    match items {
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_for_antigravity).collect()),
        _ => sanitize_for_antigravity(items),
    }
}

/// The placeholder schema used for empty/invalid tool schemas.
fn placeholder_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "reason": {
                "type": "string",
                "description": "Reason for calling this tool"
            }
        },
        "required": ["reason"]
    })
}

fn reason_property() -> Value {
    json!({
        "reason": {
            "type": "string",
            "description": "Reason for calling this tool"
        }
    })
}

// ============================================================================
// Gemini path
// ============================================================================

/// Sanitize a tool schema for a Gemini destination.
///
/// Applies the phase sequence top-down, then recurses into `properties`
/// and `items`. Inputs that are not non-null objects are returned
/// unchanged.
pub fn clean_schema_for_gemini(schema: &Value) -> Value {
    clean_gemini(schema).0
}

/// Clean one schema level.
///
/// The boolean reports whether this level's `type` array contained
/// `"null"`, so the parent can drop the property from its `required`.
fn clean_gemini(schema: &Value) -> (Value, bool) {
    let obj = match schema {
        Value::Object(obj) => obj,
        _ => return (schema.clone(), false),
    };

    let mut map = obj.clone();

    rewrite_ref(&mut map);
    append_enum_hint(&mut map);
    append_additional_properties_hint(&mut map);
    lift_constraints(&mut map);
    merge_all_of(&mut map);
    flatten_any_of(&mut map);
    let was_nullable = flatten_type_array(&mut map);
    strip_unsupported(&mut map);

    // Recurse into properties, collecting which ones became nullable.
    let mut nullable_props: Vec<String> = Vec::new();
    if let Some(Value::Object(props)) = map.get("properties") {
        let mut cleaned = Map::new();
        for (name, prop) in props {
            let (value, nullable) = clean_gemini(prop);
            if nullable {
                nullable_props.push(name.clone());
            }
            cleaned.insert(name.clone(), value);
        }
        map.insert("properties".to_string(), Value::Object(cleaned));
    }

    // Recurse into items (object schema or tuple form).
    if let Some(items) = map.get("items") {
        let cleaned = match items {
            Value::Array(arr) => Value::Array(arr.iter().map(|v| clean_gemini(v).0).collect()),
            other => clean_gemini(other).0,
        };
        map.insert("items".to_string(), cleaned);
    }

    // Nullable properties cannot be required.
    if !nullable_props.is_empty() {
        if let Some(Value::Array(required)) = map.get_mut("required") {
            required.retain(|r| {
                r.as_str()
                    .map(|name| !nullable_props.iter().any(|n| n == name))
                    .unwrap_or(false)
            });
            if required.is_empty() {
                map.remove("required");
            }
        }
    }

    validate_required(&mut map);

    (Value::Object(map), was_nullable)
}

/// Phase 1: `$ref` becomes an object with a `See: Name` description hint.
fn rewrite_ref(map: &mut Map<String, Value>) {
    let Some(reference) = map.get("$ref").and_then(|v| v.as_str()).map(String::from) else {
        return;
    };
    let name = reference.rsplit('/').next().unwrap_or(&reference).to_string();
    map.remove("$ref");
    map.insert("type".to_string(), Value::String("object".to_string()));

    let hint = format!("See: {name}");
    match map.get("description").and_then(|v| v.as_str()) {
        Some(existing) if !existing.is_empty() => {
            let merged = format!("{existing} ({hint})");
            map.insert("description".to_string(), Value::String(merged));
        }
        _ => {
            map.insert("description".to_string(), Value::String(hint));
        }
    }
}

/// Phase 2: enumerations with 2-10 values become a description hint.
fn append_enum_hint(map: &mut Map<String, Value>) {
    let Some(Value::Array(values)) = map.get("enum") else {
        return;
    };
    if !(2..=10).contains(&values.len()) {
        return;
    }
    let rendered: Vec<String> = values.iter().map(render_scalar).collect();
    append_description(map, &format!("Allowed: {}", rendered.join(", ")));
}

/// Phase 3: `additionalProperties: false` becomes a description hint.
fn append_additional_properties_hint(map: &mut Map<String, Value>) {
    if map.get("additionalProperties") == Some(&Value::Bool(false)) {
        append_description(map, "No extra properties allowed");
    }
}

/// Phase 4: scalar constraints are folded into the description.
fn lift_constraints(map: &mut Map<String, Value>) {
    let hints: Vec<String> = LIFTED_CONSTRAINTS
        .iter()
        .filter_map(|name| {
            map.get(*name)
                .map(|value| format!("{name}: {}", render_scalar(value)))
        })
        .collect();
    for hint in hints {
        append_description(map, &hint);
    }
}

/// Phase 5: `allOf` children are merged left-to-right into the parent.
fn merge_all_of(map: &mut Map<String, Value>) {
    let Some(Value::Array(children)) = map.remove("allOf") else {
        return;
    };

    for child in children {
        let Value::Object(child) = child else { continue };

        for (key, value) in child {
            match key.as_str() {
                "properties" => {
                    let parent_props = map
                        .entry("properties".to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let (Some(parent), Value::Object(child_props)) =
                        (parent_props.as_object_mut(), value)
                    {
                        for (name, prop) in child_props {
                            parent.insert(name, prop);
                        }
                    }
                }
                "required" => {
                    let parent_required = map
                        .entry("required".to_string())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let (Some(parent), Value::Array(child_required)) =
                        (parent_required.as_array_mut(), value)
                    {
                        for item in child_required {
                            if !parent.contains(&item) {
                                parent.push(item);
                            }
                        }
                    }
                }
                _ => {
                    map.entry(key).or_insert(value);
                }
            }
        }
    }
}

/// Phase 6: `anyOf`/`oneOf` collapse to the best-scoring option.
fn flatten_any_of(map: &mut Map<String, Value>) {
    let mut options: Vec<Value> = Vec::new();
    for key in ["anyOf", "oneOf"] {
        if let Some(Value::Array(mut values)) = map.remove(key) {
            options.append(&mut values);
        }
    }
    if options.is_empty() {
        return;
    }

    // Collect the non-null types on offer before choosing.
    let mut seen_types: Vec<String> = Vec::new();
    for option in &options {
        match option.get("type") {
            Some(Value::String(t)) if t != "null" => {
                if !seen_types.contains(t) {
                    seen_types.push(t.clone());
                }
            }
            Some(Value::Array(types)) => {
                for t in types.iter().filter_map(|v| v.as_str()) {
                    if t != "null" && !seen_types.iter().any(|s| s == t) {
                        seen_types.push(t.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    // Highest score wins; ties resolve to the earliest option.
    let chosen = options
        .iter()
        .enumerate()
        .max_by(|a, b| score_option(a.1).cmp(&score_option(b.1)).then(b.0.cmp(&a.0)))
        .map(|(_, option)| option.clone());

    if let Some(Value::Object(chosen)) = chosen {
        for (key, value) in chosen {
            match key.as_str() {
                "type" | "properties" | "items" => {
                    map.insert(key, value);
                }
                "description" => {
                    if let Some(text) = value.as_str() {
                        append_description(map, text);
                    }
                }
                _ => {
                    map.entry(key).or_insert(value);
                }
            }
        }
    }

    if seen_types.len() >= 2 {
        append_description(map, &format!("Accepts: {}", seen_types.join(" | ")));
    }
}

/// Score an `anyOf`/`oneOf` option by how much structure it carries.
fn score_option(option: &Value) -> u8 {
    let Some(obj) = option.as_object() else {
        return 0;
    };
    let type_str = obj.get("type").and_then(|v| v.as_str());
    if type_str == Some("object") || obj.contains_key("properties") {
        return 3;
    }
    if type_str == Some("array") || obj.contains_key("items") {
        return 2;
    }
    match type_str {
        Some("null") | None => 0,
        Some(_) => 1,
    }
}

/// Phase 7: array-valued `type` collapses to its first non-null entry.
///
/// Returns whether `"null"` was among the entries.
fn flatten_type_array(map: &mut Map<String, Value>) -> bool {
    let Some(Value::Array(types)) = map.get("type") else {
        return false;
    };

    let entries: Vec<String> = types
        .iter()
        .filter_map(|v| v.as_str())
        .map(String::from)
        .collect();
    let had_null = entries.iter().any(|t| t == "null");
    let non_null: Vec<&String> = entries.iter().filter(|t| t.as_str() != "null").collect();

    let scalar = non_null
        .first()
        .map(|t| t.as_str())
        .unwrap_or("string")
        .to_string();
    map.insert("type".to_string(), Value::String(scalar));

    if had_null {
        append_description(map, "nullable");
    }
    if non_null.len() >= 2 {
        let rendered: Vec<&str> = non_null.iter().map(|t| t.as_str()).collect();
        append_description(map, &format!("Accepts: {}", rendered.join(" | ")));
    }

    had_null
}

/// Phase 8: delete everything Gemini rejects.
///
/// `format` survives only under `type: "string"` and only as `enum` or
/// `date-time`.
fn strip_unsupported(map: &mut Map<String, Value>) {
    let keep_format = map.get("type").and_then(|v| v.as_str()) == Some("string")
        && matches!(
            map.get("format").and_then(|v| v.as_str()),
            Some("enum") | Some("date-time")
        );

    for key in GEMINI_STRIPPED_KEYS {
        if *key == "format" && keep_format {
            continue;
        }
        map.remove(*key);
    }
}

/// Phase 9 (shared): `required` may only list keys present in `properties`.
fn validate_required(map: &mut Map<String, Value>) {
    let Some(Value::Array(required)) = map.get("required") else {
        return;
    };

    let filtered: Vec<Value> = match map.get("properties").and_then(|v| v.as_object()) {
        Some(props) => required
            .iter()
            .filter(|r| {
                r.as_str()
                    .map(|name| props.contains_key(name))
                    .unwrap_or(false)
            })
            .cloned()
            .collect(),
        None => Vec::new(),
    };

    if filtered.is_empty() {
        map.remove("required");
    } else {
        map.insert("required".to_string(), Value::Array(filtered));
    }
}

/// Append a hint to the description, creating it when absent.
fn append_description(map: &mut Map<String, Value>, hint: &str) {
    match map.get("description").and_then(|v| v.as_str()) {
        Some(existing) if !existing.is_empty() => {
            let merged = format!("{existing}. {hint}");
            map.insert("description".to_string(), Value::String(merged));
        }
        _ => {
            map.insert("description".to_string(), Value::String(hint.to_string()));
        }
    }
}

/// Render a scalar value for a description hint without JSON quoting noise.
fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
