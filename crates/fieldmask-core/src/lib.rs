//! Fieldmask Core - record transformation engine
//!
//! This crate rewrites fields of record-stream messages according to
//! [`fieldmask_recipe::TransformationRule`]s. The [`Batcher`] buffers messages
//! per stream and version, and on flush runs every record through the
//! condition evaluator and field transformer before emitting it, in order,
//! to a [`MessageSink`].

pub mod batcher;
pub mod condition;
pub mod error;
pub mod message;
pub mod nested;
pub mod sink;
pub mod transform;
pub mod validator;

pub use batcher::{BatchSettings, BatchState, Batcher, FlushStats, FlushTrigger, MessageBatch, StreamMetadata};
pub use condition::is_transform_required;
pub use error::{PipelineError, TransformError};
pub use message::{ActivateVersionMessage, Message, Record, RecordMessage, SchemaMessage, StateMessage};
pub use sink::{JsonLinesSink, MessageSink};
pub use transform::{apply_rule, apply_scalar, transform_field, TransformOutcome};
