//! Typed errors for the transformation engine and the streaming pipeline.

use thiserror::Error;

/// Why a single field could not be transformed. These never stop the stream:
/// the field keeps its original value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("`{kind}` expects a string value, got {found}")]
    NotAString { kind: String, found: &'static str },

    #[error("cannot parse '{0}' as a date")]
    InvalidDate(String),

    #[error("regex condition on column '{column}' needs a string value, got {found}")]
    NonStringCondition { column: String, found: &'static str },

    #[error("regex condition on column '{column}' has an invalid pattern: {message}")]
    InvalidPattern { column: String, message: String },
}

/// Fatal errors of streaming mode.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to process incoming message: {line}\n{source}")]
    MalformedMessage {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Received a record for stream '{0}' before its schema")]
    UnknownStream(String),

    #[error("Invalid JSON schema for stream '{stream}': {message}")]
    InvalidSchema { stream: String, message: String },

    #[error("Record {index} of stream '{stream}' does not pass schema validation: {message}")]
    RecordValidation {
        stream: String,
        index: usize,
        message: String,
    },
}

/// JSON type name of a value, for error messages.
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
