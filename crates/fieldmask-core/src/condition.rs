//! Condition evaluation for conditional (`when`) rules.

use fieldmask_recipe::Condition;
use serde_json::Value;

use crate::error::{json_type_name, TransformError};
use crate::message::Record;

/// Decide whether a rule with `conditions` fires for `record`.
///
/// No conditions means the rule always fires. Otherwise the conditions are
/// folded in order: an `equals` check sets the running result, then a regex
/// check (if present on the same condition) overrides it. The first `false`
/// stops evaluation. A condition carrying neither check leaves the running
/// result untouched and never blocks the rule.
///
/// A missing column reads as the empty string. A regex against a non-string
/// value, or a pattern that failed to compile, is an error once evaluation
/// reaches it; callers treat it as "keep the original value".
pub fn is_transform_required(
    record: &Record,
    conditions: &[Condition],
) -> Result<bool, TransformError> {
    if conditions.is_empty() {
        return Ok(true);
    }

    let mut required = None;
    for condition in conditions {
        let value = record.get(&condition.column);

        if let Some(expected) = &condition.equals {
            let matched = column_text(value) == Some(expected.as_str());
            required = Some(matched);
            if !matched {
                break;
            }
        }

        if let Some(compiled) = &condition.regex {
            let regex = compiled
                .as_ref()
                .map_err(|e| TransformError::InvalidPattern {
                    column: condition.column.clone(),
                    message: e.to_string(),
                })?;
            let text = column_text(value).ok_or_else(|| TransformError::NonStringCondition {
                column: condition.column.clone(),
                found: value.map(json_type_name).unwrap_or("null"),
            })?;
            let matched = regex.is_match(text);
            required = Some(matched);
            if !matched {
                break;
            }
        }
    }

    Ok(required.unwrap_or(true))
}

fn column_text(value: Option<&Value>) -> Option<&str> {
    match value {
        None => Some(""),
        Some(Value::String(s)) => Some(s),
        Some(_) => None,
    }
}
