//! Field transformer - applies a [`TransformKind`] to record values.
//!
//! Per-field failures are soft: whatever goes wrong while evaluating
//! conditions, walking nested paths or transforming a value, the field keeps
//! its original value and the stream carries on. [`TransformOutcome`] records
//! which of those paths was taken.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use fieldmask_recipe::{Condition, TransformKind, TransformationRule};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::error;

use crate::condition::is_transform_required;
use crate::error::{json_type_name, TransformError};
use crate::message::Record;
use crate::nested;

const HIDDEN: &str = "hidden";

/// Naive datetime layouts tried by `MASK-DATE`, after RFC 3339.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Result of transforming one field.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    /// The transformation ran; carries the new value.
    Applied(Value),
    /// The rule's conditions did not match; carries the original value.
    SkippedByCondition(Value),
    /// The transformation failed; carries the original value.
    FailedKeepOriginal { value: Value, cause: TransformError },
}

impl TransformOutcome {
    pub fn value(&self) -> &Value {
        match self {
            TransformOutcome::Applied(value)
            | TransformOutcome::SkippedByCondition(value)
            | TransformOutcome::FailedKeepOriginal { value, .. } => value,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            TransformOutcome::Applied(value)
            | TransformOutcome::SkippedByCondition(value)
            | TransformOutcome::FailedKeepOriginal { value, .. } => value,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, TransformOutcome::Applied(_))
    }
}

/// Apply `rule` to its field of `record`.
pub fn apply_rule(record: &Record, rule: &TransformationRule) -> TransformOutcome {
    transform_field(
        record,
        &rule.field_id,
        &rule.kind,
        &rule.conditions,
        &rule.nested_paths,
    )
}

/// Transform `record[field_id]` (a missing field reads as null).
///
/// When the value is an object and `nested_paths` is non-empty, only the
/// values at those paths are transformed; paths that do not resolve are
/// logged and skipped. Otherwise the whole value is transformed. The record
/// itself is never modified.
pub fn transform_field(
    record: &Record,
    field_id: &str,
    kind: &TransformKind,
    conditions: &[Condition],
    nested_paths: &[String],
) -> TransformOutcome {
    let original = record.get(field_id).cloned().unwrap_or(Value::Null);

    match is_transform_required(record, conditions) {
        Ok(true) => {}
        Ok(false) => return TransformOutcome::SkippedByCondition(original),
        Err(cause) => {
            return TransformOutcome::FailedKeepOriginal {
                value: original,
                cause,
            }
        }
    }

    let result = if original.is_object() && !nested_paths.is_empty() {
        transform_nested(&original, kind, nested_paths)
    } else {
        apply_scalar(&original, kind)
    };

    match result {
        Ok(value) => TransformOutcome::Applied(value),
        Err(cause) => TransformOutcome::FailedKeepOriginal {
            value: original,
            cause,
        },
    }
}

fn transform_nested(
    original: &Value,
    kind: &TransformKind,
    nested_paths: &[String],
) -> Result<Value, TransformError> {
    let mut value = original.clone();
    for path in nested_paths {
        let Some(slot) = nested::get_mut(&mut value, path) else {
            error!("Field path {} does not exist", path);
            continue;
        };
        *slot = apply_scalar(slot, kind)?;
    }
    Ok(value)
}

/// Apply `kind` to a single value.
pub fn apply_scalar(value: &Value, kind: &TransformKind) -> Result<Value, TransformError> {
    let transformed = match kind {
        TransformKind::SetNull => Value::Null,
        TransformKind::Hash => Value::String(sha256_hex(expect_str(value, kind)?.as_bytes())),
        TransformKind::HashSkipFirst(n) => {
            let s = expect_str(value, kind)?;
            Value::String(hash_skip_first(s, *n))
        }
        TransformKind::MaskDate => {
            let s = expect_str(value, kind)?;
            Value::String(mask_date(s).ok_or_else(|| TransformError::InvalidDate(s.to_string()))?)
        }
        TransformKind::MaskNumber => Value::from(0),
        TransformKind::MaskHidden => Value::String(HIDDEN.to_string()),
        TransformKind::MaskStringSkipEnds(n) => {
            let s = expect_str(value, kind)?;
            Value::String(mask_skip_ends(s, *n))
        }
        TransformKind::Unknown(_) => value.clone(),
    };
    Ok(transformed)
}

fn expect_str<'a>(value: &'a Value, kind: &TransformKind) -> Result<&'a str, TransformError> {
    value.as_str().ok_or_else(|| TransformError::NotAString {
        kind: kind.to_string(),
        found: json_type_name(value),
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// The first `n` characters are kept, but the hashed remainder starts at
/// byte offset `n`. The two differ for multi-byte text.
fn hash_skip_first(value: &str, n: usize) -> String {
    let prefix: String = value.chars().take(n).collect();
    let rest = value.as_bytes().get(n..).unwrap_or_default();
    prefix + &sha256_hex(rest)
}

fn mask_skip_ends(value: &str, n: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len();
    if len <= n.saturating_mul(2) {
        return "*".repeat(len);
    }
    let mut masked = String::with_capacity(value.len());
    masked.extend(&chars[..n]);
    masked.push_str(&"*".repeat(len - 2 * n));
    masked.extend(&chars[len - n..]);
    masked
}

/// Reset month and day to 1, keeping the year and the time of day.
fn mask_date(value: &str) -> Option<String> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        let masked = dt.with_day(1)?.with_month(1)?;
        let layout = iso_layout(masked.nanosecond(), true);
        return Some(masked.format(layout).to_string());
    }

    let naive = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;
    let masked = naive.with_day(1)?.with_month(1)?;
    let layout = iso_layout(masked.nanosecond(), false);
    Some(masked.format(layout).to_string())
}

/// ISO 8601 output layout: microseconds are printed as six digits, and only
/// when the sub-second part is non-zero.
fn iso_layout(nanosecond: u32, with_offset: bool) -> &'static str {
    match (nanosecond == 0, with_offset) {
        (true, false) => "%Y-%m-%dT%H:%M:%S",
        (false, false) => "%Y-%m-%dT%H:%M:%S%.6f",
        (true, true) => "%Y-%m-%dT%H:%M:%S%:z",
        (false, true) => "%Y-%m-%dT%H:%M:%S%.6f%:z",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("record fixture must be an object"),
        }
    }

    fn kind(raw: &str) -> TransformKind {
        TransformKind::parse(raw)
    }

    fn transform(rec: Value, field: &str, raw_kind: &str) -> Value {
        transform_field(&record(rec), field, &kind(raw_kind), &[], &[]).into_value()
    }

    fn sha(s: &str) -> String {
        sha256_hex(s.as_bytes())
    }

    #[test]
    fn test_set_null() {
        assert_eq!(transform(json!({"col_1": "John"}), "col_1", "SET-NULL"), Value::Null);
        assert_eq!(transform(json!({"col_1": 12}), "col_1", "SET-NULL"), Value::Null);
    }

    #[test]
    fn test_hash() {
        assert_eq!(
            transform(json!({"col_1": "John"}), "col_1", "HASH"),
            json!("a8cfcd74832004951b4408cdb0a5dbcd8c7e52d43f7fe244bf720582e05241da")
        );
    }

    #[test]
    fn test_hash_skip_first() {
        let expected = format!("Jo{}", sha("hn"));
        assert_eq!(
            transform(json!({"col_1": "John"}), "col_1", "HASH-SKIP-FIRST-2"),
            json!(expected)
        );
    }

    #[test]
    fn test_hash_skip_first_multibyte_uses_byte_offset_for_hash() {
        // "é" is two bytes: the prefix keeps two characters, the hash skips two bytes.
        let value = "éab";
        let expected = format!("éa{}", sha256_hex(&value.as_bytes()[2..]));
        assert_eq!(apply_scalar(&json!(value), &kind("HASH-SKIP-FIRST-2")).unwrap(), json!(expected));
    }

    #[test]
    fn test_hash_skip_first_longer_than_value() {
        assert_eq!(
            apply_scalar(&json!("ab"), &kind("HASH-SKIP-FIRST-5")).unwrap(),
            json!(format!("ab{}", sha("")))
        );
    }

    #[test]
    fn test_hash_is_not_idempotent() {
        let once = apply_scalar(&json!("John"), &TransformKind::Hash).unwrap();
        let twice = apply_scalar(&once, &TransformKind::Hash).unwrap();
        assert_ne!(once, twice);

        let skip = kind("HASH-SKIP-FIRST-1");
        let once = apply_scalar(&json!("John"), &skip).unwrap();
        let twice = apply_scalar(&once, &skip).unwrap();
        assert_ne!(once, twice);
    }

    #[test]
    fn test_masks_are_idempotent() {
        for raw in ["SET-NULL", "MASK-HIDDEN", "MASK-NUMBER"] {
            let once = apply_scalar(&json!("abakadabra123"), &kind(raw)).unwrap();
            let twice = apply_scalar(&once, &kind(raw)).unwrap();
            assert_eq!(once, twice, "{raw}");
        }
    }

    #[test]
    fn test_mask_date() {
        assert_eq!(
            transform(json!({"col_1": "2019-05-21"}), "col_1", "MASK-DATE"),
            json!("2019-01-01T00:00:00")
        );
        assert_eq!(
            transform(json!({"col_1": "2019-05-21T13:34:11"}), "col_1", "MASK-DATE"),
            json!("2019-01-01T13:34:11")
        );
        assert_eq!(
            transform(json!({"col_1": "2019-05-21 13:34:11.250"}), "col_1", "MASK-DATE"),
            json!("2019-01-01T13:34:11.250000")
        );
        assert_eq!(
            transform(json!({"col_1": "2019-05-21T13:34:11.25"}), "col_1", "MASK-DATE"),
            json!("2019-01-01T13:34:11.250000")
        );
        assert_eq!(
            transform(json!({"col_1": "2019-05-21T13:34:11.000"}), "col_1", "MASK-DATE"),
            json!("2019-01-01T13:34:11")
        );
        assert_eq!(
            transform(json!({"col_1": "2019-05-21T13:34:11.5Z"}), "col_1", "MASK-DATE"),
            json!("2019-01-01T13:34:11.500000+00:00")
        );
        assert_eq!(
            transform(json!({"col_1": "2019-12-31T23:59:59+02:00"}), "col_1", "MASK-DATE"),
            json!("2019-01-01T23:59:59+02:00")
        );
    }

    #[test]
    fn test_mask_date_invalid_keeps_original() {
        let rec = record(json!({"col_1": "2019-05-21T13:34:99"}));
        let outcome = transform_field(&rec, "col_1", &TransformKind::MaskDate, &[], &[]);
        assert_eq!(
            outcome,
            TransformOutcome::FailedKeepOriginal {
                value: json!("2019-05-21T13:34:99"),
                cause: TransformError::InvalidDate("2019-05-21T13:34:99".to_string()),
            }
        );
    }

    #[test]
    fn test_mask_number() {
        assert_eq!(transform(json!({"col_1": "1234567890"}), "col_1", "MASK-NUMBER"), json!(0));
        assert_eq!(transform(json!({"col_1": 3.75}), "col_1", "MASK-NUMBER"), json!(0));
    }

    #[test]
    fn test_mask_hidden() {
        assert_eq!(
            transform(json!({"col_1": "abakadabra123"}), "col_1", "MASK-HIDDEN"),
            json!("hidden")
        );
    }

    #[test]
    fn test_mask_string_skip_ends() {
        let cases = [
            ("do!maskme!", "MASK-STRING-SKIP-ENDS-3", "do!****me!"),
            ("nomask", "MASK-STRING-SKIP-ENDS-2", "no**sk"),
            ("nomask", "MASK-STRING-SKIP-ENDS-3", "******"),
            ("shortmask", "MASK-STRING-SKIP-ENDS-5", "*********"),
            ("żółwik", "MASK-STRING-SKIP-ENDS-1", "ż****k"),
        ];
        for (input, raw_kind, expected) in cases {
            assert_eq!(transform(json!({"col_1": input}), "col_1", raw_kind), json!(expected));
        }
    }

    #[test]
    fn test_unknown_kind_passthrough() {
        assert_eq!(
            transform(json!({"col_1": "John"}), "col_1", "NOT-EXISTING-TRANSFORMATION-TYPE"),
            json!("John")
        );
    }

    #[test]
    fn test_string_kinds_on_non_string_keep_original() {
        for raw in ["HASH", "HASH-SKIP-FIRST-1", "MASK-DATE", "MASK-STRING-SKIP-ENDS-1"] {
            let outcome = transform_field(&record(json!({"n": 42})), "n", &kind(raw), &[], &[]);
            assert!(
                matches!(&outcome, TransformOutcome::FailedKeepOriginal { value, cause: TransformError::NotAString { found: "number", .. } } if *value == json!(42)),
                "{raw}: {outcome:?}"
            );
        }
    }

    #[test]
    fn test_missing_field_reads_as_null() {
        assert_eq!(transform(json!({}), "col_1", "MASK-HIDDEN"), json!("hidden"));
        let outcome = transform_field(&record(json!({})), "col_1", &TransformKind::Hash, &[], &[]);
        assert_eq!(outcome.value(), &Value::Null);
        assert!(!outcome.is_applied());
    }

    #[test]
    fn test_conditional_transform() {
        let conditions = vec![
            Condition::equals("col_1", "com.transferwise.fx.user.User"),
            Condition::equals("col_2", "passwordHash"),
        ];

        let matching = record(json!({
            "col_1": "com.transferwise.fx.user.User",
            "col_2": "passwordHash",
            "col_3": "lkj"
        }));
        let outcome = transform_field(&matching, "col_3", &TransformKind::SetNull, &conditions, &[]);
        assert_eq!(outcome, TransformOutcome::Applied(Value::Null));

        let other = record(json!({
            "col_1": "com.transferwise.fx.user.User",
            "col_2": "id",
            "col_3": "123456789"
        }));
        let outcome = transform_field(&other, "col_3", &TransformKind::SetNull, &conditions, &[]);
        assert_eq!(outcome, TransformOutcome::SkippedByCondition(json!("123456789")));
    }

    #[test]
    fn test_condition_error_keeps_original() {
        let conditions = vec![Condition::matches("n", "^1")];
        let rec = record(json!({"n": 1, "secret": "abc"}));
        let outcome = transform_field(&rec, "secret", &TransformKind::MaskHidden, &conditions, &[]);
        assert!(matches!(outcome, TransformOutcome::FailedKeepOriginal { ref value, .. } if *value == json!("abc")));
    }

    #[test]
    fn test_invalid_pattern_keeps_original_when_reached() {
        let conditions = vec![Condition::matches("kind", "(")];
        let rec = record(json!({"kind": "user", "secret": "abc"}));
        let outcome = transform_field(&rec, "secret", &TransformKind::MaskHidden, &conditions, &[]);
        assert!(matches!(
            outcome,
            TransformOutcome::FailedKeepOriginal { ref value, cause: TransformError::InvalidPattern { .. } }
                if *value == json!("abc")
        ));
    }

    #[test]
    fn test_invalid_pattern_behind_failed_equals_skips() {
        let conditions = vec![Condition::equals("kind", "never"), Condition::matches("kind", "(")];
        let rec = record(json!({"kind": "user", "secret": "abc"}));
        let outcome = transform_field(&rec, "secret", &TransformKind::MaskHidden, &conditions, &[]);
        assert_eq!(outcome, TransformOutcome::SkippedByCondition(json!("abc")));
    }

    fn nested_record() -> Record {
        record(json!({
            "col_1": "com.transferwise.fx.user.User",
            "col_2": {
                "id": 1,
                "info": {"name": "john", "last_name": "smith", "phone": "0123"},
                "tags": ["a", "b"]
            }
        }))
    }

    #[test]
    fn test_nested_paths_only_touch_listed_paths() {
        let paths = vec!["info/name".to_string(), "tags/1".to_string()];
        let outcome = transform_field(&nested_record(), "col_2", &TransformKind::MaskHidden, &[], &paths);
        assert_eq!(
            outcome.into_value(),
            json!({
                "id": 1,
                "info": {"name": "hidden", "last_name": "smith", "phone": "0123"},
                "tags": ["a", "hidden"]
            })
        );
    }

    #[test]
    fn test_nested_paths_with_conditions() {
        let paths = vec!["info/phone".to_string()];
        let conditions = vec![Condition::equals("col_1", "com.transferwise.fx.user.User")];
        let outcome = transform_field(&nested_record(), "col_2", &TransformKind::SetNull, &conditions, &paths);
        assert_eq!(
            outcome.into_value(),
            json!({
                "id": 1,
                "info": {"name": "john", "last_name": "smith", "phone": null},
                "tags": ["a", "b"]
            })
        );

        let conditions = vec![Condition::equals("col_1", "other")];
        let outcome = transform_field(&nested_record(), "col_2", &TransformKind::SetNull, &conditions, &paths);
        assert_eq!(outcome, TransformOutcome::SkippedByCondition(nested_record()["col_2"].clone()));
    }

    #[test]
    fn test_nested_unresolved_path_is_skipped() {
        let paths = vec!["info/missing".to_string(), "info/last_name".to_string()];
        let outcome = transform_field(&nested_record(), "col_2", &TransformKind::MaskHidden, &[], &paths);
        assert!(outcome.is_applied());
        let value = outcome.into_value();
        assert_eq!(value["info"]["last_name"], json!("hidden"));
        assert!(value["info"].get("missing").is_none());
    }

    #[test]
    fn test_nested_failure_keeps_whole_original() {
        // "info/name" would be hashed, but "id" is numeric and fails.
        let paths = vec!["info/name".to_string(), "id".to_string()];
        let rec = nested_record();
        let outcome = transform_field(&rec, "col_2", &TransformKind::Hash, &[], &paths);
        assert!(matches!(&outcome, TransformOutcome::FailedKeepOriginal { .. }));
        assert_eq!(outcome.value(), &rec["col_2"]);
    }

    #[test]
    fn test_nested_paths_ignored_for_scalar_values() {
        let paths = vec!["info/name".to_string()];
        let outcome = transform_field(&nested_record(), "col_1", &TransformKind::MaskHidden, &[], &paths);
        assert_eq!(outcome, TransformOutcome::Applied(json!("hidden")));
    }

    #[test]
    fn test_apply_rule_uses_rule_fields() {
        let rule = TransformationRule::new("s", "col_2", TransformKind::SetNull)
            .with_nested_paths(["info/name"]);
        let outcome = apply_rule(&nested_record(), &rule);
        assert_eq!(outcome.value()["info"]["name"], Value::Null);
        assert_eq!(outcome.value()["info"]["phone"], json!("0123"));
    }
}
