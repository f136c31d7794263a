//! Startup validation of transformation rules against a schema catalog

use thiserror::Error;
use tracing::info;

use crate::catalog::{Catalog, FieldType};
use crate::kind::TransformKind;
use crate::rule::TransformationRule;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Catalog missing! Please provide a catalog to run validation.")]
    CatalogRequired,

    #[error("Stream '{0}' not found in catalog")]
    StreamNotFound(String),

    #[error("Stream '{0}' has no schema in catalog")]
    NoStreamSchema(String),

    #[error("Field '{field}' not found in schema of stream '{stream}'")]
    FieldNotFound { stream: String, field: String },

    #[error("Cannot apply `{kind}` transformation type to a {expected} field `{field}` in stream `{stream}`")]
    InvalidTransformation {
        kind: String,
        expected: &'static str,
        field: String,
        stream: String,
    },

    #[error("Unsupported transformation type: {0}")]
    UnsupportedTransformationType(String),
}

/// Validate every rule against the catalog. Each rule reports at most one
/// error: the first of stream, schema, field and kind checks that fails.
pub fn validate_rules(
    rules: &[TransformationRule],
    catalog: Option<&Catalog>,
) -> Result<(), Vec<ValidationError>> {
    info!("Starting validation of transformations...");

    let Some(catalog) = catalog else {
        return Err(vec![ValidationError::CatalogRequired]);
    };
    let schemas = catalog.stream_schemas();

    let mut errors = Vec::new();
    for rule in rules {
        let Some(entry) = schemas.get(rule.stream_name.as_str()) else {
            errors.push(ValidationError::StreamNotFound(rule.stream_name.clone()));
            continue;
        };
        let Some(schema) = entry.non_empty_schema() else {
            errors.push(ValidationError::NoStreamSchema(rule.stream_name.clone()));
            continue;
        };
        let Some(field) = FieldType::lookup(schema, &rule.field_id) else {
            errors.push(ValidationError::FieldNotFound {
                stream: rule.stream_name.clone(),
                field: rule.field_id.clone(),
            });
            continue;
        };
        if let Err(e) = check_kind(rule, &field) {
            errors.push(e);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_kind(rule: &TransformationRule, field: &FieldType) -> Result<(), ValidationError> {
    let expected = match &rule.kind {
        TransformKind::Hash
        | TransformKind::HashSkipFirst(_)
        | TransformKind::MaskHidden
        | TransformKind::MaskStringSkipEnds(_) => {
            if field.has_type("string") && !field.has_format() {
                return Ok(());
            }
            "non-string"
        }
        TransformKind::MaskDate => {
            let date_format = matches!(field.format.as_deref(), Some("date") | Some("date-time"));
            if field.has_type("string") && date_format {
                return Ok(());
            }
            "non-stringified date"
        }
        TransformKind::MaskNumber => {
            if (field.has_type("number") || field.has_type("integer")) && !field.has_format() {
                return Ok(());
            }
            "non-numeric"
        }
        TransformKind::SetNull => {
            info!(
                "Transformation type is {}, no need to do any validation.",
                rule.kind
            );
            return Ok(());
        }
        TransformKind::Unknown(_) => {
            return Err(ValidationError::UnsupportedTransformationType(
                rule.kind.to_string(),
            ));
        }
    };

    Err(ValidationError::InvalidTransformation {
        kind: rule.kind.to_string(),
        expected,
        field: rule.field_id.clone(),
        stream: rule.stream_name.clone(),
    })
}
