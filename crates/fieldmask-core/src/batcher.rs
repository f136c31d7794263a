//! Stream batcher and flush controller.
//!
//! The [`Batcher`] consumes one message at a time. Records and
//! activate-version markers are buffered in a single [`MessageBatch`] that
//! never mixes streams or stream versions. A batch is flushed when it reaches
//! the byte, record or delay threshold, when a message for another stream or
//! version arrives, when a schema message arrives, and at end of input.
//! Flushing transforms every buffered record, emits the buffer in its
//! original order, then emits the latest pending state message.
//!
//! The delay threshold is only checked when a message arrives; there is no
//! background timer.

use std::collections::HashMap;
use std::io::BufRead;
use std::time::{Duration, Instant};

use fieldmask_recipe::RuleRegistry;
use serde_json::Value;
use tracing::{debug, warn, Span};

use crate::error::PipelineError;
use crate::message::{Message, RecordMessage, SchemaMessage, StateMessage};
use crate::sink::MessageSink;
use crate::transform::{apply_rule, TransformOutcome};
use crate::validator::RecordValidator;

pub const DEFAULT_MAX_BATCH_BYTES: usize = 4_000_000;
pub const DEFAULT_MAX_BATCH_RECORDS: usize = 20_000;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(300);

/// Flush thresholds and record validation switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub max_bytes: usize,
    pub max_records: usize,
    pub max_delay: Duration,
    /// Validate transformed records against their stream schema.
    pub validate_records: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BATCH_BYTES,
            max_records: DEFAULT_MAX_BATCH_RECORDS,
            max_delay: DEFAULT_BATCH_DELAY,
            validate_records: false,
        }
    }
}

/// Schema and keys declared for a stream by its latest schema message.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMetadata {
    pub stream_name: String,
    pub schema: Value,
    pub key_properties: Vec<String>,
    pub bookmark_properties: Vec<String>,
}

impl From<&SchemaMessage> for StreamMetadata {
    fn from(message: &SchemaMessage) -> Self {
        Self {
            stream_name: message.stream.clone(),
            schema: message.schema.clone(),
            key_properties: message.key_properties.clone(),
            bookmark_properties: message.bookmark_properties.clone().unwrap_or_default(),
        }
    }
}

/// Buffered messages of one stream and version.
#[derive(Debug)]
pub struct MessageBatch {
    stream: String,
    version: Option<i64>,
    messages: Vec<Message>,
    size_bytes: usize,
}

impl MessageBatch {
    fn new(stream: &str, version: Option<i64>) -> Self {
        Self {
            stream: stream.to_string(),
            version,
            messages: Vec::new(),
            size_bytes: 0,
        }
    }

    fn accepts(&self, stream: &str, version: Option<i64>) -> bool {
        self.stream == stream && self.version == version
    }

    fn push(&mut self, message: Message, byte_size: usize) {
        self.messages.push(message);
        self.size_bytes += byte_size;
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn version(&self) -> Option<i64> {
        self.version
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}

/// The batcher's buffer: nothing in flight, or exactly one live batch.
#[derive(Debug, Default)]
pub enum BatchState {
    #[default]
    Empty,
    Buffering(MessageBatch),
}

/// Threshold that caused a flush on message arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Bytes,
    Records,
    Delay,
}

/// Running counters, useful to observe soft transform failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub flushes: u64,
    pub messages: u64,
    pub applied: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl FlushStats {
    fn record(&mut self, outcome: &TransformOutcome) {
        match outcome {
            TransformOutcome::Applied(_) => self.applied += 1,
            TransformOutcome::SkippedByCondition(_) => self.skipped += 1,
            TransformOutcome::FailedKeepOriginal { .. } => self.failed += 1,
        }
    }
}

pub struct Batcher<S: MessageSink> {
    registry: RuleRegistry,
    settings: BatchSettings,
    sink: S,
    state: BatchState,
    pending_state: Option<Value>,
    streams: HashMap<String, StreamMetadata>,
    validator: Option<RecordValidator>,
    last_flush: Instant,
    stats: FlushStats,
    span: Span,
}

impl<S: MessageSink> Batcher<S> {
    pub fn new(registry: RuleRegistry, settings: BatchSettings, sink: S) -> Self {
        let validator = settings.validate_records.then(RecordValidator::new);
        Self {
            registry,
            settings,
            sink,
            state: BatchState::Empty,
            pending_state: None,
            streams: HashMap::new(),
            validator,
            last_flush: Instant::now(),
            stats: FlushStats::default(),
            span: Span::current(),
        }
    }

    /// Span entered while flushing; log events from transformations land in it.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    pub fn pending_state(&self) -> Option<&Value> {
        self.pending_state.as_ref()
    }

    pub fn stream_metadata(&self, stream: &str) -> Option<&StreamMetadata> {
        self.streams.get(stream)
    }

    pub fn stats(&self) -> FlushStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Decode and accept one input line; its length counts toward the byte threshold.
    pub fn accept_line(&mut self, line: &str) -> Result<(), PipelineError> {
        let message = Message::parse(line)?;
        self.accept(message, line.len())
    }

    /// Accept one decoded message whose serialized size is `byte_size`.
    pub fn accept(&mut self, message: Message, byte_size: usize) -> Result<(), PipelineError> {
        debug!(kind = message.kind(), stream = ?message.stream(), "Received message");

        match message {
            Message::Schema(schema) => {
                self.flush()?;
                self.register_stream(&schema)?;
                self.sink.emit(&Message::Schema(schema))?;
                self.sink.flush()?;
            }
            Message::Record(_) | Message::ActivateVersion(_) => {
                self.buffer(message, byte_size)?;
                if let Some(trigger) = self.flush_trigger() {
                    if let BatchState::Buffering(batch) = &self.state {
                        debug!(
                            ?trigger,
                            bytes = batch.size_bytes(),
                            messages = batch.len(),
                            seconds = self.last_flush.elapsed().as_secs_f64(),
                            "Flushing batch"
                        );
                    }
                    self.flush()?;
                }
            }
            Message::State(StateMessage { value }) => {
                self.pending_state = Some(value);
            }
        }
        Ok(())
    }

    fn register_stream(&mut self, schema: &SchemaMessage) -> Result<(), PipelineError> {
        let meta = StreamMetadata::from(schema);
        if let Some(validator) = self.validator.as_mut() {
            validator.register(&meta)?;
        }
        self.streams.insert(meta.stream_name.clone(), meta);
        Ok(())
    }

    fn buffer(&mut self, message: Message, byte_size: usize) -> Result<(), PipelineError> {
        let stream = message.stream().unwrap_or_default().to_string();
        let version = message.version();

        if matches!(&self.state, BatchState::Buffering(batch) if !batch.accepts(&stream, version)) {
            self.flush()?;
        }

        match &mut self.state {
            BatchState::Buffering(batch) => batch.push(message, byte_size),
            BatchState::Empty => {
                let mut batch = MessageBatch::new(&stream, version);
                batch.push(message, byte_size);
                self.state = BatchState::Buffering(batch);
            }
        }
        Ok(())
    }

    /// The first threshold the live batch has reached, if any.
    pub fn flush_trigger(&self) -> Option<FlushTrigger> {
        let BatchState::Buffering(batch) = &self.state else {
            return None;
        };
        if batch.size_bytes() >= self.settings.max_bytes {
            Some(FlushTrigger::Bytes)
        } else if batch.len() >= self.settings.max_records {
            Some(FlushTrigger::Records)
        } else if self.last_flush.elapsed() >= self.settings.max_delay {
            Some(FlushTrigger::Delay)
        } else {
            None
        }
    }

    /// Transform and emit the live batch, then the pending state.
    /// Does nothing when there is neither.
    pub fn flush(&mut self) -> Result<(), PipelineError> {
        let batch = match std::mem::take(&mut self.state) {
            BatchState::Buffering(batch) => Some(batch),
            BatchState::Empty => None,
        };
        if batch.is_none() && self.pending_state.is_none() {
            return Ok(());
        }

        let span = self.span.clone();
        let _enter = span.enter();

        if let Some(batch) = batch {
            let count = batch.len();
            let before = self.stats;
            for (index, message) in batch.messages.into_iter().enumerate() {
                let message = match message {
                    Message::Record(mut record) => {
                        self.transform_record(&mut record);
                        self.validate_record(index, &record)?;
                        Message::Record(record)
                    }
                    other => other,
                };
                self.sink.emit(&message)?;
            }
            self.stats.flushes += 1;
            self.stats.messages += count as u64;
            debug!(
                stream = %batch.stream,
                messages = count,
                bytes = batch.size_bytes,
                applied = self.stats.applied - before.applied,
                skipped = self.stats.skipped - before.skipped,
                failed = self.stats.failed - before.failed,
                "Batch flushed"
            );
        }

        if let Some(value) = self.pending_state.take() {
            self.sink.emit(&Message::State(StateMessage { value }))?;
        }

        self.last_flush = Instant::now();
        self.sink.flush()
    }

    fn transform_record(&mut self, message: &mut RecordMessage) {
        for rule in self.registry.rules_for(&message.stream) {
            if !message.record.contains_key(&rule.field_id) {
                continue;
            }
            let outcome = apply_rule(&message.record, rule);
            self.stats.record(&outcome);
            if let TransformOutcome::FailedKeepOriginal { cause, .. } = &outcome {
                warn!(
                    stream = %message.stream,
                    field = %rule.field_id,
                    kind = %rule.kind,
                    "Transformation failed, keeping original value: {}",
                    cause
                );
            }
            message.record.insert(rule.field_id.clone(), outcome.into_value());
        }
    }

    fn validate_record(&self, index: usize, message: &RecordMessage) -> Result<(), PipelineError> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        let meta = self
            .streams
            .get(&message.stream)
            .ok_or_else(|| PipelineError::UnknownStream(message.stream.clone()))?;
        validator.validate(meta, index, &message.record)
    }

    /// Accept every message in order, then flush whatever remains.
    pub fn consume<I>(&mut self, messages: I) -> Result<(), PipelineError>
    where
        I: IntoIterator<Item = Message>,
    {
        for message in messages {
            let byte_size = serde_json::to_vec(&message)?.len();
            self.accept(message, byte_size)?;
        }
        self.flush()
    }

    /// Accept every non-blank line of `reader`, then flush whatever remains.
    pub fn consume_lines<R: BufRead>(&mut self, reader: R) -> Result<(), PipelineError> {
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            self.accept_line(&line)?;
        }
        self.flush()
    }
}
