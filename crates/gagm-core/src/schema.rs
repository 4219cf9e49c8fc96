//! Structural field schemas for asset types.
//!
//! A `FieldSchema` is the declarative replacement for a model class: it
//! validates asset payloads, fills in defaults, and exports itself as the
//! JSON-schema rule that the graph store attaches to a collection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{GagmError, GagmResult};

/// Attribute names owned by the asset envelope, never part of a payload.
pub const RESERVED_FIELDS: &[&str] = &["_id", "_key", "_from", "_to", "notes"];

/// Primitive type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::Any => "any",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
            FieldType::Any => true,
        }
    }
}

/// Definition of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<FieldSpec>>,
}

impl FieldSpec {
    /// A bare field of the given type with no constraints.
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: None,
            default: None,
            description: None,
            minimum: None,
            maximum: None,
            min_length: None,
            max_length: None,
            allowed: None,
            properties: BTreeMap::new(),
            items: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.properties.insert(name.into(), spec);
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = Some(false);
        self
    }

    /// Fields without a default are required unless stated otherwise.
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(self.default.is_none())
    }

    /// Check the definition itself is coherent (defaults satisfy constraints etc.).
    fn check_definition(&self, path: &str) -> Result<(), String> {
        if let (Some(min), Some(max)) = (self.minimum, self.maximum) {
            if min > max {
                return Err(format!("{path}: minimum {min} exceeds maximum {max}"));
            }
        }
        if self.items.is_some() && self.field_type != FieldType::Array {
            return Err(format!("{path}: 'items' is only valid on array fields"));
        }
        if !self.properties.is_empty() && self.field_type != FieldType::Object {
            return Err(format!("{path}: 'properties' is only valid on object fields"));
        }
        for (name, sub) in &self.properties {
            sub.check_definition(&format!("{path}.{name}"))?;
        }
        if let Some(items) = &self.items {
            items.check_definition(&format!("{path}[]"))?;
        }
        if let Some(default) = &self.default {
            self.check_value(path, default)
                .map_err(|e| format!("invalid default: {e}"))?;
        }
        Ok(())
    }

    /// Validate a value against this spec, returning it with nested defaults applied.
    fn check_value(&self, path: &str, value: &Value) -> GagmResult<Value> {
        if value.is_null() {
            return if self.is_required() {
                Err(GagmError::validation(format!("{path}: must not be null")))
            } else {
                Ok(Value::Null)
            };
        }

        if !self.field_type.accepts(value) {
            return Err(GagmError::validation(format!(
                "{path}: expected {}, got {}",
                self.field_type.as_str(),
                json_kind(value)
            )));
        }

        if let Some(allowed) = &self.allowed {
            if !allowed.contains(value) {
                return Err(GagmError::validation(format!(
                    "{path}: value {value} is not one of the allowed values"
                )));
            }
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = self.minimum {
                if n < min {
                    return Err(GagmError::validation(format!("{path}: {n} is below minimum {min}")));
                }
            }
            if let Some(max) = self.maximum {
                if n > max {
                    return Err(GagmError::validation(format!("{path}: {n} is above maximum {max}")));
                }
            }
        }

        match value {
            Value::String(s) => {
                let len = s.chars().count();
                if self.min_length.is_some_and(|min| len < min) {
                    return Err(GagmError::validation(format!("{path}: string is too short")));
                }
                if self.max_length.is_some_and(|max| len > max) {
                    return Err(GagmError::validation(format!("{path}: string is too long")));
                }
                Ok(value.clone())
            }
            Value::Object(map) if !self.properties.is_empty() => {
                Ok(Value::Object(check_fields(path, &self.properties, map)?))
            }
            Value::Array(items) => {
                let Some(item_spec) = &self.items else {
                    return Ok(value.clone());
                };
                let checked = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| item_spec.check_value(&format!("{path}[{i}]"), item))
                    .collect::<GagmResult<Vec<_>>>()?;
                Ok(Value::Array(checked))
            }
            _ => Ok(value.clone()),
        }
    }

    fn to_json_schema(&self, title: Option<&str>) -> Value {
        let mut schema = Map::new();
        if self.field_type != FieldType::Any {
            schema.insert("type".into(), json!(self.field_type.as_str()));
        }
        if let Some(title) = title {
            schema.insert("title".into(), json!(title));
        }
        if let Some(d) = &self.description {
            schema.insert("description".into(), json!(d));
        }
        if let Some(d) = &self.default {
            schema.insert("default".into(), d.clone());
        }
        if let Some(v) = self.minimum {
            schema.insert("minimum".into(), json!(v));
        }
        if let Some(v) = self.maximum {
            schema.insert("maximum".into(), json!(v));
        }
        if let Some(v) = self.min_length {
            schema.insert("minLength".into(), json!(v));
        }
        if let Some(v) = self.max_length {
            schema.insert("maxLength".into(), json!(v));
        }
        if let Some(values) = &self.allowed {
            schema.insert("enum".into(), Value::Array(values.clone()));
        }
        if !self.properties.is_empty() {
            let (properties, required) = properties_schema(&self.properties);
            schema.insert("properties".into(), properties);
            schema.insert("required".into(), required);
        }
        if let Some(items) = &self.items {
            schema.insert("items".into(), items.to_json_schema(None));
        }
        Value::Object(schema)
    }
}

/// Field schema of one asset type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
}

impl FieldSchema {
    pub fn new(title: impl Into<String>, fields: BTreeMap<String, FieldSpec>) -> Self {
        Self {
            title: title.into(),
            description: None,
            fields,
        }
    }

    /// Reject definitions that could never validate anything.
    pub fn check_definition(&self) -> Result<(), String> {
        for (name, spec) in &self.fields {
            if RESERVED_FIELDS.contains(&name.as_str()) {
                return Err(format!("field name '{name}' is reserved"));
            }
            if name.is_empty() {
                return Err("field names must not be empty".to_string());
            }
            spec.check_definition(name)?;
        }
        Ok(())
    }

    /// Validate a payload, returning it with defaults applied.
    ///
    /// Fields not declared in the schema are kept as they are.
    pub fn validate(&self, payload: &Map<String, Value>) -> GagmResult<Map<String, Value>> {
        check_fields(&self.title, &self.fields, payload)
    }

    /// JSON-schema rule for the store's collection validation.
    pub fn to_json_schema(&self) -> Value {
        let (properties, required) = properties_schema(&self.fields);
        let mut schema = json!({
            "type": "object",
            "title": self.title,
            "properties": properties,
            "required": required,
        });
        if let Some(description) = &self.description {
            schema["description"] = json!(description);
        }
        schema
    }

    /// Derive the all-optional variant used for patch-style updates.
    pub fn partial(&self) -> PartialSchema {
        let fields = self
            .fields
            .iter()
            .map(|(name, spec)| {
                let mut spec = spec.clone();
                spec.required = Some(false);
                spec.default = None;
                (name.clone(), spec)
            })
            .collect();

        PartialSchema {
            schema: FieldSchema {
                title: format!("Partial{}", self.title),
                description: self.description.clone(),
                fields,
            },
        }
    }
}

/// A type's field schema with every top-level field optional and no defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialSchema {
    schema: FieldSchema,
}

impl PartialSchema {
    /// Name of the partial variant (`Partial{Type}`).
    pub fn title(&self) -> &str {
        &self.schema.title
    }

    /// Validate only the fields present in `payload`; nothing is filled in.
    pub fn validate(&self, payload: &Map<String, Value>) -> GagmResult<Map<String, Value>> {
        self.schema.validate(payload)
    }

    pub fn to_json_schema(&self) -> Value {
        self.schema.to_json_schema()
    }
}

fn check_fields(
    path: &str,
    specs: &BTreeMap<String, FieldSpec>,
    payload: &Map<String, Value>,
) -> GagmResult<Map<String, Value>> {
    let mut out = payload.clone();
    for (name, spec) in specs {
        let field_path = format!("{path}.{name}");
        match payload.get(name) {
            Some(value) => {
                let checked = spec.check_value(&field_path, value)?;
                out.insert(name.clone(), checked);
            }
            None => {
                if let Some(default) = &spec.default {
                    out.insert(name.clone(), default.clone());
                } else if spec.is_required() {
                    return Err(GagmError::validation(format!("{field_path}: field required")));
                }
            }
        }
    }
    Ok(out)
}

fn properties_schema(specs: &BTreeMap<String, FieldSpec>) -> (Value, Value) {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for (name, spec) in specs {
        properties.insert(name.clone(), spec.to_json_schema(Some(name)));
        if spec.is_required() {
            required.push(json!(name));
        }
    }
    (Value::Object(properties), Value::Array(required))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dungeon_schema() -> FieldSchema {
        let location = FieldSpec::new(FieldType::Object)
            .with_property("x", FieldSpec::new(FieldType::Number).with_default(json!(0.0)))
            .with_property("y", FieldSpec::new(FieldType::Number).with_default(json!(0.0)));

        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), FieldSpec::new(FieldType::String));
        fields.insert(
            "max_players".to_string(),
            FieldSpec::new(FieldType::Integer)
                .with_default(json!(1))
                .with_range(Some(1.0), Some(5.0)),
        );
        fields.insert("starting_point".to_string(), location);
        FieldSchema::new("Dungeon", fields)
    }

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let schema = dungeon_schema();
        let out = schema
            .validate(&payload(json!({"name": "Crypt", "starting_point": {"x": 2.5}})))
            .unwrap();
        assert_eq!(out["max_players"], json!(1));
        assert_eq!(out["starting_point"], json!({"x": 2.5, "y": 0.0}));
    }

    #[test]
    fn test_range_enforced() {
        let schema = dungeon_schema();
        let err = schema
            .validate(&payload(json!({"name": "Crypt", "max_players": 6, "starting_point": {}})))
            .unwrap_err();
        assert!(matches!(err, GagmError::Validation(_)));
    }

    #[test]
    fn test_required_and_type_checks() {
        let schema = dungeon_schema();
        assert!(schema.validate(&payload(json!({"starting_point": {}}))).is_err());
        assert!(schema
            .validate(&payload(json!({"name": 3, "starting_point": {}})))
            .is_err());
        assert!(schema
            .validate(&payload(json!({"name": "a", "max_players": 2.5, "starting_point": {}})))
            .is_err());
    }

    #[test]
    fn test_unknown_fields_kept() {
        let schema = dungeon_schema();
        let out = schema
            .validate(&payload(json!({"name": "Crypt", "starting_point": {}, "extra": true})))
            .unwrap();
        assert_eq!(out["extra"], json!(true));
    }

    #[test]
    fn test_partial_schema_accepts_subset() {
        let partial = dungeon_schema().partial();
        assert_eq!(partial.title(), "PartialDungeon");

        let out = partial.validate(&payload(json!({"max_players": 3}))).unwrap();
        assert_eq!(out.len(), 1);
        assert!(partial.validate(&payload(json!({"max_players": 9}))).is_err());
        assert!(partial.validate(&payload(json!({"name": null}))).is_ok());
    }

    #[test]
    fn test_json_schema_export() {
        let schema = dungeon_schema().to_json_schema();
        assert_eq!(schema["title"], "Dungeon");
        assert_eq!(schema["properties"]["max_players"]["maximum"], json!(5.0));
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("name")));
        assert!(!required.contains(&json!("max_players")));
    }

    #[test]
    fn test_definition_checks() {
        let mut fields = BTreeMap::new();
        fields.insert("notes".to_string(), FieldSpec::new(FieldType::String));
        assert!(FieldSchema::new("T", fields).check_definition().is_err());

        let mut fields = BTreeMap::new();
        fields.insert(
            "n".to_string(),
            FieldSpec::new(FieldType::Integer)
                .with_default(json!(9))
                .with_range(Some(1.0), Some(5.0)),
        );
        assert!(FieldSchema::new("T", fields).check_definition().is_err());
    }
}
