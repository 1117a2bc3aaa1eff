//! Parameter schema discovery.
//!
//! Turns the capability description of a model (an OpenAPI 3.0 document
//! returned by `GET /v1/models?expand=openapi-3.0`) or of a workflow (a flat
//! map keyed by parameter name) into an ordered list of
//! [`ParameterDescriptor`]s for the host's parameter pickers.
//!
//! Only one level of type coercion is applied. References (`$ref`/`allOf`)
//! are reported as `string`, since they point at externally hosted files or
//! nested objects the host passes through as URLs or JSON text.
//!
//! An absent or unrecognizable schema yields `None`. Callers treat that as
//! "unknown schema" and fall back to free-form parameter entry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Public model pages on fal.ai.
const FAL_MODELS_WEB_BASE: &str = "https://fal.ai/models";

/// Component-level hint listing properties in display order.
const ORDER_HINT_KEY: &str = "x-fal-order-properties";

/// Parameter value type, as presented to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParameterType {
    /// Map a declared schema type; unknown and file-like types become `String`.
    pub fn from_schema_type(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" => ParameterType::Integer,
            "number" | "float" | "double" => ParameterType::Number,
            "boolean" | "bool" => ParameterType::Boolean,
            "array" | "list" => ParameterType::Array,
            "object" | "dict" | "map" => ParameterType::Object,
            _ => ParameterType::String,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
            ParameterType::Array => "array",
            ParameterType::Object => "object",
        }
    }
}

/// One input or output field of a model or workflow.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    /// Element type of array-typed fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<ParameterType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
}

/// Parsed capability description of a model endpoint or workflow.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playground_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    #[serde(default)]
    pub input_parameters: Vec<ParameterDescriptor>,
    #[serde(default)]
    pub output_parameters: Vec<ParameterDescriptor>,
}

impl ModelDescriptor {
    /// Descriptor with no known parameters, used for degraded output.
    pub fn unknown(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..Default::default()
        }
    }

    /// Pick the entry for `model_id` out of a `/v1/models` response.
    ///
    /// Accepts both `{"models": [...]}` and a bare array. Returns `None` when
    /// no entry's `endpoint_id` matches.
    pub fn from_models_response(model_id: &str, response: &Value) -> Option<Self> {
        let entries = response
            .get("models")
            .and_then(Value::as_array)
            .or_else(|| response.as_array())?;
        let entry = entries
            .iter()
            .find(|e| e.get("endpoint_id").and_then(Value::as_str) == Some(model_id))?;
        Self::from_model_entry(entry)
    }

    /// Build a descriptor from one model entry carrying an `openapi` document.
    pub fn from_model_entry(entry: &Value) -> Option<Self> {
        let model_id = entry.get("endpoint_id").and_then(Value::as_str)?.to_string();
        let openapi = entry.get("openapi")?;
        let (input_parameters, output_parameters) = parse_openapi_parameters(openapi)?;
        let metadata = entry.get("metadata").unwrap_or(&Value::Null);

        Some(Self {
            display_name: str_field(metadata, "display_name"),
            category: str_field(metadata, "category"),
            description: str_field(metadata, "description"),
            playground_url: str_field(metadata, "playground_url")
                .or_else(|| Some(format!("{FAL_MODELS_WEB_BASE}/{model_id}"))),
            documentation_url: str_field(metadata, "documentation_url")
                .or_else(|| Some(format!("{FAL_MODELS_WEB_BASE}/{model_id}/api"))),
            model_id,
            input_parameters,
            output_parameters,
        })
    }

    /// Build a descriptor from a `/v1/workflows/{id}` body (bare or wrapped).
    pub fn from_workflow(workflow_id: &str, body: &Value) -> Option<Self> {
        let workflow = body.get("workflow").unwrap_or(body);
        let schema = workflow
            .get("contents")
            .and_then(|c| c.get("schema"))
            .or_else(|| workflow.get("schema"))?;
        let input = schema.get("input").and_then(Value::as_object);
        let output = schema.get("output").and_then(Value::as_object);
        if input.is_none() && output.is_none() {
            return None;
        }

        Some(Self {
            model_id: workflow_id.to_string(),
            display_name: str_field(workflow, "title").or_else(|| str_field(workflow, "name")),
            category: None,
            description: str_field(workflow, "description"),
            playground_url: None,
            documentation_url: None,
            input_parameters: input.map(parse_workflow_fields).unwrap_or_default(),
            output_parameters: output.map(parse_workflow_fields).unwrap_or_default(),
        })
    }
}

/// Input and output parameters of an OpenAPI document, or `None` when no
/// `...Input` component exists.
pub fn parse_openapi_parameters(
    openapi: &Value,
) -> Option<(Vec<ParameterDescriptor>, Vec<ParameterDescriptor>)> {
    let schemas = openapi
        .get("components")
        .and_then(|c| c.get("schemas"))
        .and_then(Value::as_object)?;
    let input = find_component(schemas, "Input")?;
    let output = find_component(schemas, "Output");
    Some((
        parse_component(input),
        output.map(parse_component).unwrap_or_default(),
    ))
}

/// First component whose name ends in `suffix`, skipping queue envelopes.
fn find_component<'a>(schemas: &'a Map<String, Value>, suffix: &str) -> Option<&'a Value> {
    schemas
        .iter()
        .find(|(name, _)| name.ends_with(suffix) && !name.contains("Queue"))
        .map(|(_, schema)| schema)
}

fn parse_component(component: &Value) -> Vec<ParameterDescriptor> {
    let required: Vec<&str> = component
        .get("required")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    ordered_properties(component)
        .into_iter()
        .map(|(name, prop)| describe_property(name, prop, required.contains(&name.as_str())))
        .collect()
}

/// Properties in order-hint order, then remaining ones in declaration order.
fn ordered_properties(component: &Value) -> Vec<(&String, &Value)> {
    let Some(props) = component.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut ordered: Vec<(&String, &Value)> = Vec::with_capacity(props.len());
    let hint = component
        .get(ORDER_HINT_KEY)
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect::<Vec<_>>())
        .unwrap_or_default();
    for name in hint {
        if let Some((key, prop)) = props.iter().find(|(key, _)| key.as_str() == name) {
            if !ordered.iter().any(|(k, _)| *k == key) {
                ordered.push((key, prop));
            }
        }
    }
    for (key, prop) in props {
        if !ordered.iter().any(|(k, _)| *k == key) {
            ordered.push((key, prop));
        }
    }
    ordered
}

fn describe_property(name: &str, prop: &Value, required: bool) -> ParameterDescriptor {
    let (param_type, items) = property_type(prop);
    ParameterDescriptor {
        name: name.to_string(),
        param_type,
        items,
        title: str_field(prop, "title"),
        description: str_field(prop, "description"),
        required,
        default: prop.get("default").cloned(),
        enum_values: prop.get("enum").and_then(Value::as_array).cloned(),
        example: first_example(prop),
        minimum: prop.get("minimum").and_then(Value::as_f64),
        maximum: prop.get("maximum").and_then(Value::as_f64),
        min_length: prop.get("minLength").and_then(Value::as_u64),
        max_length: prop.get("maxLength").and_then(Value::as_u64),
    }
}

fn is_reference(schema: &Value) -> bool {
    schema.get("$ref").is_some() || schema.get("allOf").is_some()
}

fn property_type(prop: &Value) -> (ParameterType, Option<ParameterType>) {
    if is_reference(prop) {
        return (ParameterType::String, None);
    }
    if let Some(declared) = prop.get("type").and_then(Value::as_str) {
        return with_items(ParameterType::from_schema_type(declared), prop);
    }
    for key in ["anyOf", "oneOf"] {
        let Some(variants) = prop.get(key).and_then(Value::as_array) else {
            continue;
        };
        for variant in variants {
            if is_reference(variant) {
                return (ParameterType::String, None);
            }
            match variant.get("type").and_then(Value::as_str) {
                Some("null") | None => continue,
                Some(declared) => {
                    return with_items(ParameterType::from_schema_type(declared), variant)
                }
            }
        }
    }
    (ParameterType::String, None)
}

fn with_items(ty: ParameterType, schema: &Value) -> (ParameterType, Option<ParameterType>) {
    if ty != ParameterType::Array {
        return (ty, None);
    }
    let items = schema.get("items").map(|items| {
        if is_reference(items) {
            ParameterType::String
        } else {
            items
                .get("type")
                .and_then(Value::as_str)
                .map(ParameterType::from_schema_type)
                .unwrap_or_default()
        }
    });
    (ty, items)
}

fn parse_workflow_fields(fields: &Map<String, Value>) -> Vec<ParameterDescriptor> {
    fields
        .iter()
        .map(|(name, field)| {
            let (param_type, items) = workflow_type(field);
            ParameterDescriptor {
                name: name.clone(),
                param_type,
                items,
                title: str_field(field, "label").or_else(|| str_field(field, "title")),
                description: str_field(field, "description"),
                required: field.get("required").and_then(Value::as_bool).unwrap_or(false),
                default: field.get("default").cloned(),
                enum_values: field.get("enum").and_then(Value::as_array).cloned(),
                example: first_example(field),
                minimum: field.get("minimum").and_then(Value::as_f64),
                maximum: field.get("maximum").and_then(Value::as_f64),
                min_length: None,
                max_length: None,
            }
        })
        .collect()
}

/// Workflow fields declare their type either as a plain string or as an
/// object with `type` (and optionally `items`).
fn workflow_type(field: &Value) -> (ParameterType, Option<ParameterType>) {
    match field {
        Value::String(expr) => parse_type_expr(expr),
        Value::Object(obj) => {
            let Some(expr) = obj.get("type").and_then(Value::as_str) else {
                return (ParameterType::String, None);
            };
            let (ty, items) = parse_type_expr(expr);
            if ty == ParameterType::Array && items.is_none() {
                let items = obj.get("items").and_then(|items| match items {
                    Value::String(t) => Some(ParameterType::from_schema_type(t)),
                    other => other
                        .get("type")
                        .and_then(Value::as_str)
                        .map(ParameterType::from_schema_type),
                });
                return (ty, items);
            }
            (ty, items)
        }
        _ => (ParameterType::String, None),
    }
}

/// Parse composite declarations such as `array<string>`, `list[int]` or `image[]`.
fn parse_type_expr(expr: &str) -> (ParameterType, Option<ParameterType>) {
    let lower = expr.trim().to_ascii_lowercase();
    if let Some(inner) = lower.strip_suffix("[]") {
        return (
            ParameterType::Array,
            Some(ParameterType::from_schema_type(inner)),
        );
    }
    for (open, close) in [("array<", '>'), ("list<", '>'), ("array[", ']'), ("list[", ']')] {
        if let Some(inner) = lower
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            return (
                ParameterType::Array,
                Some(ParameterType::from_schema_type(inner)),
            );
        }
    }
    (ParameterType::from_schema_type(&lower), None)
}

fn first_example(schema: &Value) -> Option<Value> {
    schema.get("example").cloned().or_else(|| {
        schema
            .get("examples")
            .and_then(Value::as_array)
            .and_then(|examples| examples.first().cloned())
    })
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
