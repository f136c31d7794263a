//! Optional JSON-schema validation of transformed records.

use std::collections::HashMap;

use jsonschema::Draft;
use serde_json::Value;

use crate::batcher::StreamMetadata;
use crate::error::PipelineError;
use crate::message::Record;

/// Compiled schema validators, one per stream.
#[derive(Default)]
pub struct RecordValidator {
    validators: HashMap<String, jsonschema::Validator>,
}

impl RecordValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile the stream's schema as JSON Schema draft 4 with format
    /// checking, replacing any earlier one.
    pub fn register(&mut self, meta: &StreamMetadata) -> Result<(), PipelineError> {
        let validator = jsonschema::options()
            .with_draft(Draft::Draft4)
            .should_validate_formats(true)
            .build(&meta.schema)
            .map_err(|e| PipelineError::InvalidSchema {
                stream: meta.stream_name.clone(),
                message: e.to_string(),
            })?;
        self.validators.insert(meta.stream_name.clone(), validator);
        Ok(())
    }

    /// Check `record` against its stream's schema and key properties.
    /// `index` is the record's position in the batch, for error messages.
    pub fn validate(
        &self,
        meta: &StreamMetadata,
        index: usize,
        record: &Record,
    ) -> Result<(), PipelineError> {
        let fail = |message: String| PipelineError::RecordValidation {
            stream: meta.stream_name.clone(),
            index,
            message,
        };

        let validator = self
            .validators
            .get(&meta.stream_name)
            .ok_or_else(|| PipelineError::UnknownStream(meta.stream_name.clone()))?;

        let instance = Value::Object(record.clone());
        let errors: Vec<String> = validator
            .iter_errors(&instance)
            .map(|e| e.to_string())
            .collect();
        if !errors.is_empty() {
            return Err(fail(errors.join("; ")));
        }

        if let Some(key) = meta.key_properties.iter().find(|k| !record.contains_key(*k)) {
            return Err(fail(format!("missing key property {}", key)));
        }
        Ok(())
    }
}
