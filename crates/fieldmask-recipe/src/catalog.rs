//! Schema catalog - stream schemas used by startup validation.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// One stream of a catalog document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub tap_stream_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl CatalogEntry {
    /// The schema, unless it is absent, `null` or an empty object.
    pub fn non_empty_schema(&self) -> Option<&Value> {
        match &self.schema {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) if map.is_empty() => None,
            Some(schema) => Some(schema),
        }
    }
}

/// A catalog of streams and their JSON schemas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub streams: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Catalog entries keyed by `tap_stream_id`.
    pub fn stream_schemas(&self) -> HashMap<&str, &CatalogEntry> {
        self.streams
            .iter()
            .map(|entry| (entry.tap_stream_id.as_str(), entry))
            .collect()
    }
}

/// Declared type and format of a schema property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldType {
    pub types: Vec<String>,
    pub format: Option<String>,
}

impl FieldType {
    /// Read `type` (a string or an array of strings) and `format` from a
    /// property schema.
    pub fn from_property(property: &Value) -> Self {
        let types = match property.get("type") {
            Some(Value::String(t)) => vec![t.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        let format = property
            .get("format")
            .and_then(Value::as_str)
            .filter(|f| !f.is_empty())
            .map(str::to_string);
        Self { types, format }
    }

    /// Look up `field` under the schema's `properties`.
    pub fn lookup(schema: &Value, field: &str) -> Option<Self> {
        schema
            .get("properties")
            .and_then(|props| props.get(field))
            .map(Self::from_property)
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.iter().any(|t| t == name)
    }

    pub fn has_format(&self) -> bool {
        self.format.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_catalog_deserialization() {
        let json = r#"{
            "streams": [
                {
                    "tap_stream_id": "public-users",
                    "stream": "users",
                    "schema": {"properties": {"id": {"type": ["null", "integer"]}}}
                },
                {"tap_stream_id": "public-empty", "schema": {}}
            ]
        }"#;
        let catalog = Catalog::from_json(json).unwrap();
        let schemas = catalog.stream_schemas();
        assert!(schemas["public-users"].non_empty_schema().is_some());
        assert!(schemas["public-empty"].non_empty_schema().is_none());
        assert!(!schemas.contains_key("users"));
    }

    #[test]
    fn test_field_type_string_and_array_forms() {
        let schema = json!({
            "properties": {
                "name": {"type": "string"},
                "created_at": {"type": ["null", "string"], "format": "date-time"},
                "blank_format": {"type": ["string"], "format": ""}
            }
        });

        let name = FieldType::lookup(&schema, "name").unwrap();
        assert!(name.has_type("string"));
        assert!(!name.has_format());

        let created = FieldType::lookup(&schema, "created_at").unwrap();
        assert!(created.has_type("null"));
        assert_eq!(created.format.as_deref(), Some("date-time"));

        assert!(!FieldType::lookup(&schema, "blank_format").unwrap().has_format());
        assert!(FieldType::lookup(&schema, "missing").is_none());
    }

    #[test]
    fn test_field_without_type() {
        let field = FieldType::from_property(&json!({"description": "anything"}));
        assert!(field.types.is_empty());
    }
}
