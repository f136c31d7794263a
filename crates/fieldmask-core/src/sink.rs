//! Output sinks for transformed messages.

use std::io::Write;

use crate::error::PipelineError;
use crate::message::Message;

/// Destination for messages leaving the batcher, in emission order.
pub trait MessageSink {
    fn emit(&mut self, message: &Message) -> Result<(), PipelineError>;

    /// Called after every batch flush and forwarded schema.
    fn flush(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Writes each message as one compact JSON line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MessageSink for JsonLinesSink<W> {
    fn emit(&mut self, message: &Message) -> Result<(), PipelineError> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PipelineError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Collects messages in memory.
impl MessageSink for Vec<Message> {
    fn emit(&mut self, message: &Message) -> Result<(), PipelineError> {
        self.push(message.clone());
        Ok(())
    }
}
