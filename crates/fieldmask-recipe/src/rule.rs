//! Transformation config schema and the compiled rules built from it.

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::kind::TransformKind;

/// A `when` entry as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionSpec {
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_match: Option<String>,
}

/// One entry of the `transformations` list as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransformationSpec {
    /// Stream name as sent in the `stream` key of record messages.
    pub tap_stream_name: String,
    pub field_id: String,
    #[serde(rename = "type")]
    pub kind: TransformKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Vec<ConditionSpec>>,
    /// '/'-delimited locators into an object-valued field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_paths: Option<Vec<String>>,
}

/// The transformation config document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransformConfig {
    pub transformations: Vec<TransformationSpec>,
}

impl TransformConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if value.get("transformations").is_none() {
            return Err(ConfigError::MissingTransformations);
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Compile every entry into a [`TransformationRule`], in declaration order.
    pub fn compile(&self) -> Vec<TransformationRule> {
        self.transformations
            .iter()
            .map(TransformationRule::compile)
            .collect()
    }
}

/// A compiled `when` condition. Empty `equals` / `regex_match` strings are
/// dropped here, so a condition may end up carrying neither check.
///
/// A pattern that fails to compile is kept as its error. It only fails the
/// field once evaluation actually reaches this condition.
#[derive(Debug, Clone)]
pub struct Condition {
    pub column: String,
    pub equals: Option<String>,
    pub regex: Option<Result<Regex, regex::Error>>,
}

impl Condition {
    pub fn equals(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            equals: Some(value.into()),
            regex: None,
        }
    }

    pub fn matches(column: impl Into<String>, pattern: &str) -> Self {
        Self {
            column: column.into(),
            equals: None,
            regex: Some(Regex::new(pattern)),
        }
    }

    /// The source of a successfully compiled pattern.
    pub fn pattern(&self) -> Option<&str> {
        match &self.regex {
            Some(Ok(regex)) => Some(regex.as_str()),
            _ => None,
        }
    }
}

/// An immutable transformation rule for one field of one stream.
#[derive(Debug, Clone)]
pub struct TransformationRule {
    pub stream_name: String,
    pub field_id: String,
    pub kind: TransformKind,
    pub conditions: Vec<Condition>,
    pub nested_paths: Vec<String>,
}

impl TransformationRule {
    pub fn new(
        stream_name: impl Into<String>,
        field_id: impl Into<String>,
        kind: TransformKind,
    ) -> Self {
        Self {
            stream_name: stream_name.into(),
            field_id: field_id.into(),
            kind,
            conditions: Vec::new(),
            nested_paths: Vec::new(),
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_nested_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nested_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    fn compile(spec: &TransformationSpec) -> Self {
        let conditions = spec
            .when
            .iter()
            .flatten()
            .map(|cond| {
                let regex = non_empty(&cond.regex_match).map(|pattern| {
                    let compiled = Regex::new(pattern);
                    if let Err(e) = &compiled {
                        warn!(
                            "Invalid regex_match '{}' on column '{}' for field '{}' in stream '{}': {}",
                            pattern, cond.column, spec.field_id, spec.tap_stream_name, e
                        );
                    }
                    compiled
                });
                Condition {
                    column: cond.column.clone(),
                    equals: non_empty(&cond.equals).map(str::to_string),
                    regex,
                }
            })
            .collect();

        Self {
            stream_name: spec.tap_stream_name.clone(),
            field_id: spec.field_id.clone(),
            kind: spec.kind.clone(),
            conditions,
            nested_paths: spec.field_paths.clone().unwrap_or_default(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}
