//! The closed catalog of transformation kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

const SET_NULL: &str = "SET-NULL";
const HASH: &str = "HASH";
const HASH_SKIP_FIRST: &str = "HASH-SKIP-FIRST";
const MASK_DATE: &str = "MASK-DATE";
const MASK_NUMBER: &str = "MASK-NUMBER";
const MASK_HIDDEN: &str = "MASK-HIDDEN";
const MASK_STRING_SKIP_ENDS: &str = "MASK-STRING-SKIP-ENDS";

/// A transformation kind with its parameter already parsed out of the
/// configured type name (e.g. `MASK-STRING-SKIP-ENDS-3`).
///
/// Unrecognised names are kept as [`TransformKind::Unknown`] so streaming can
/// pass the value through while validation can still report the raw name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransformKind {
    SetNull,
    Hash,
    /// Keep the first `n` characters, hash the remainder.
    HashSkipFirst(usize),
    MaskDate,
    MaskNumber,
    MaskHidden,
    /// Keep `n` characters at each end, mask the middle with `*`.
    MaskStringSkipEnds(usize),
    Unknown(String),
}

impl TransformKind {
    /// Parse a configured type name. Never fails: anything outside the
    /// catalog, including a parameterised name without a numeric suffix,
    /// becomes `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            SET_NULL => TransformKind::SetNull,
            HASH => TransformKind::Hash,
            MASK_DATE => TransformKind::MaskDate,
            MASK_NUMBER => TransformKind::MaskNumber,
            MASK_HIDDEN => TransformKind::MaskHidden,
            _ => {
                if let Some(n) = parse_suffix(raw, HASH_SKIP_FIRST) {
                    TransformKind::HashSkipFirst(n)
                } else if let Some(n) = parse_suffix(raw, MASK_STRING_SKIP_ENDS) {
                    TransformKind::MaskStringSkipEnds(n)
                } else {
                    TransformKind::Unknown(raw.to_string())
                }
            }
        }
    }

    /// The numeric parameter of parameterised kinds.
    pub fn parameter(&self) -> Option<usize> {
        match self {
            TransformKind::HashSkipFirst(n) | TransformKind::MaskStringSkipEnds(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, TransformKind::Unknown(_))
    }
}

/// The decimal digits after `prefix` and a '-'. Signs are not accepted.
fn parse_suffix(raw: &str, prefix: &str) -> Option<usize> {
    let digits = raw.strip_prefix(prefix)?.strip_prefix('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformKind::SetNull => f.write_str(SET_NULL),
            TransformKind::Hash => f.write_str(HASH),
            TransformKind::HashSkipFirst(n) => write!(f, "{}-{}", HASH_SKIP_FIRST, n),
            TransformKind::MaskDate => f.write_str(MASK_DATE),
            TransformKind::MaskNumber => f.write_str(MASK_NUMBER),
            TransformKind::MaskHidden => f.write_str(MASK_HIDDEN),
            TransformKind::MaskStringSkipEnds(n) => write!(f, "{}-{}", MASK_STRING_SKIP_ENDS, n),
            TransformKind::Unknown(raw) => f.write_str(raw),
        }
    }
}

impl From<String> for TransformKind {
    fn from(raw: String) -> Self {
        TransformKind::parse(&raw)
    }
}

impl From<TransformKind> for String {
    fn from(kind: TransformKind) -> Self {
        kind.to_string()
    }
}
