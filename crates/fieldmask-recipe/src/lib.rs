//! Fieldmask Recipe - transformation rule configuration
//!
//! This crate defines the `{"transformations": [...]}` configuration document,
//! compiles it into immutable [`TransformationRule`]s grouped by stream in a
//! [`RuleRegistry`], and validates rules against a schema [`Catalog`].

pub mod catalog;
pub mod error;
pub mod kind;
pub mod registry;
pub mod rule;
pub mod validation;

pub use catalog::{Catalog, CatalogEntry, FieldType};
pub use error::ConfigError;
pub use kind::TransformKind;
pub use registry::RuleRegistry;
pub use rule::{Condition, ConditionSpec, TransformConfig, TransformationRule, TransformationSpec};
pub use validation::{validate_rules, ValidationError};
