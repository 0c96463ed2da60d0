//! Wire framing
//!
//! Turns a raw HTTP byte stream into a stream of payload frames. SSE framing is
//! delegated to `eventsource-stream` (UTF-8 carry-over, `data:` extraction);
//! newline-delimited JSON is split on raw bytes before decoding, so multi-byte
//! sequences straddling chunk boundaries are never cut.

use std::pin::Pin;

use bytes::Bytes;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};

use crate::error::LlmError;

/// Payload literal that terminates OpenAI-style SSE streams.
pub const DONE_PAYLOAD: &str = "[DONE]";

/// How a protocol frames its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `data:` lines separated by blank lines.
    Sse,
    /// One complete JSON document per line.
    JsonLines,
}

/// One decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// SSE `event:` name, when the provider sends one.
    pub event: Option<String>,
    pub data: String,
}

impl Frame {
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
        }
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// The `[DONE]` terminator payload.
    pub fn is_terminator(&self) -> bool {
        self.data.trim() == DONE_PAYLOAD
    }

    pub fn is_blank(&self) -> bool {
        self.data.trim().is_empty()
    }
}

impl From<Event> for Frame {
    fn from(event: Event) -> Self {
        // eventsource-stream reports the default event type as "message"
        let name = Some(event.event).filter(|e| !e.is_empty() && e != "message");
        Self {
            event: name,
            data: event.data,
        }
    }
}

pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, LlmError>> + Send>>;

/// Frame a byte stream according to `framing`.
pub fn frames<S>(bytes: S, framing: Framing) -> FrameStream
where
    S: Stream<Item = Result<Bytes, LlmError>> + Send + 'static,
{
    match framing {
        Framing::Sse => sse_frames(bytes),
        Framing::JsonLines => json_line_frames(bytes),
    }
}

fn sse_frames<S>(bytes: S) -> FrameStream
where
    S: Stream<Item = Result<Bytes, LlmError>> + Send + 'static,
{
    Box::pin(bytes.eventsource().map(|item| match item {
        Ok(event) => Ok(Frame::from(event)),
        Err(EventStreamError::Transport(err)) => Err(err),
        Err(other) => Err(LlmError::ProtocolDecodeError(format!(
            "SSE framing error: {other}"
        ))),
    }))
}

fn json_line_frames<S>(bytes: S) -> FrameStream
where
    S: Stream<Item = Result<Bytes, LlmError>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut decoder = JsonLineDecoder::default();
        let mut bytes = Box::pin(bytes);
        let mut failed = false;
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for line in decoder.push(&chunk) {
                        yield Ok(Frame::data(line));
                    }
                }
                Err(err) => {
                    failed = true;
                    yield Err(err);
                    break;
                }
            }
        }
        if !failed {
            if let Some(line) = decoder.finish() {
                yield Ok(Frame::data(line));
            }
        }
    })
}

/// Byte buffer that yields complete, non-blank lines.
#[derive(Debug, Default)]
pub struct JsonLineDecoder {
    buffer: Vec<u8>,
}

impl JsonLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(line) = decode_line(&line[..line.len() - 1]) {
                lines.push(line);
            }
        }
        lines
    }

    /// Remaining bytes once the stream has ended without a trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches('\r').trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}
