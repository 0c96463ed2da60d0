//! Per-request stream parse state
//!
//! Every converter owns one `StreamParseState`. It routes text, reasoning and
//! tool-call fragments into canonical events and enforces the cross-cutting
//! ordering rules: thinking closes before text or a tool call, the filler
//! space precedes the first tool call, and exactly one `StreamEnd` is emitted.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::think_tags::{TagSegment, ThinkTagScanner};
use super::thinking::{ThinkingBuffer, is_reasoning_config_value};
use super::tool_calls::{FlushMode, ReadyCall, ToolCallAssembler};
use crate::error::LlmError;
use crate::reasoning_cache::ReasoningCache;
use crate::types::{ChatEvent, FinishReason, ProtocolFamily, Usage};

/// Tunables for stream conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    pub thinking_flush_interval: Duration,
    /// Emit a single `" "` text delta before the first tool call when text was streamed.
    pub emit_filler_space: bool,
    /// Emit `ToolCallDelta` as soon as a call's name is known.
    pub emit_tool_call_begin_hint: bool,
    /// Route `<think>...</think>` content as reasoning.
    pub scan_think_tags: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            thinking_flush_interval: Duration::from_millis(100),
            emit_filler_space: true,
            emit_tool_call_begin_hint: false,
            scan_think_tags: true,
        }
    }
}

#[derive(Debug)]
pub struct StreamParseState {
    family: ProtocolFamily,
    options: StreamOptions,
    tool_calls: ToolCallAssembler,
    thinking: ThinkingBuffer,
    tags: ThinkTagScanner,
    has_emitted_text: bool,
    filler_checked: bool,
    ended: bool,
    finish_reason: Option<FinishReason>,
    /// Reasoning of the whole turn, written to the cache under emitted call ids.
    turn_thinking: String,
    emitted_call_ids: Vec<String>,
    reasoning_cache: Option<Arc<ReasoningCache>>,
}

impl StreamParseState {
    pub fn new(family: ProtocolFamily, options: StreamOptions) -> Self {
        Self {
            family,
            thinking: ThinkingBuffer::new(options.thinking_flush_interval),
            options,
            tool_calls: ToolCallAssembler::new(),
            tags: ThinkTagScanner::new(),
            has_emitted_text: false,
            filler_checked: false,
            ended: false,
            finish_reason: None,
            turn_thinking: String::new(),
            emitted_call_ids: Vec::new(),
            reasoning_cache: None,
        }
    }

    pub fn with_reasoning_cache(mut self, cache: Arc<ReasoningCache>) -> Self {
        self.reasoning_cache = Some(cache);
        self
    }

    pub fn family(&self) -> ProtocolFamily {
        self.family
    }

    pub fn has_emitted_text(&self) -> bool {
        self.has_emitted_text
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.finish_reason.as_ref()
    }

    /// Content text that may embed `<think>` markers.
    pub fn push_content(&mut self, text: &str, out: &mut Vec<ChatEvent>) {
        if !self.options.scan_think_tags {
            self.push_text(text, out);
            return;
        }
        let segments = self.tags.feed(text);
        self.apply_segments(segments, out);
    }

    /// Plain answer text. Closes an open thinking sequence first.
    pub fn push_text(&mut self, text: &str, out: &mut Vec<ChatEvent>) {
        if text.is_empty() {
            return;
        }
        self.end_thinking(out);
        self.has_emitted_text = true;
        out.push(ChatEvent::TextDelta {
            text: text.to_string(),
        });
    }

    /// Reasoning from a dedicated field, as a delta or a cumulative snapshot.
    ///
    /// A configuration word is only an echo when it is the whole value at the
    /// start of a sequence; inside streamed reasoning it is an ordinary token.
    pub fn push_reasoning(&mut self, text: &str, out: &mut Vec<ChatEvent>) {
        if !self.thinking.has_seen_text() && is_reasoning_config_value(text) {
            tracing::debug!(family = %self.family, value = text.trim(), "discarding reasoning config echo");
            return;
        }
        self.push_thinking_raw(text, out);
    }

    fn push_thinking_raw(&mut self, text: &str, out: &mut Vec<ChatEvent>) {
        if text.is_empty() {
            return;
        }
        let added = self.thinking.push(text, out);
        self.turn_thinking.push_str(&added);
    }

    /// Close the open thinking sequence, flushing pending text first.
    pub fn end_thinking(&mut self, out: &mut Vec<ChatEvent>) {
        self.thinking.end(out);
    }

    pub fn thinking_deadline(&self) -> Option<Instant> {
        self.thinking.deadline()
    }

    pub fn flush_thinking(&mut self, out: &mut Vec<ChatEvent>) {
        self.thinking.flush(out);
    }

    pub fn flush_thinking_if_due(&mut self, now: Instant, out: &mut Vec<ChatEvent>) {
        self.thinking.flush_if_due(now, out);
    }

    /// Merge a streamed tool-call fragment.
    pub fn push_tool_fragment(
        &mut self,
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
        out: &mut Vec<ChatEvent>,
    ) {
        let ready = self.tool_calls.push_fragment(index, id, name, arguments);
        self.emit_begin_hint(index, out);
        if let Some(call) = ready {
            self.emit_call(call, out);
        }
    }

    /// A call delivered whole (not fragmented) by the provider.
    pub fn push_complete_call(
        &mut self,
        index: usize,
        id: Option<&str>,
        name: &str,
        arguments: &str,
        out: &mut Vec<ChatEvent>,
    ) -> Result<(), LlmError> {
        self.push_tool_fragment(index, id, Some(name), Some(arguments), out);
        self.finish_tool_call(index, out)
    }

    /// Strictly close one call when its content block stops.
    pub fn finish_tool_call(&mut self, index: usize, out: &mut Vec<ChatEvent>) -> Result<(), LlmError> {
        if let Some(call) = self.tool_calls.finish_call(index)? {
            self.emit_call(call, out);
        }
        Ok(())
    }

    pub fn is_tool_call_completed(&self, index: usize) -> bool {
        self.tool_calls.is_completed(index)
    }

    pub fn push_usage(&mut self, usage: Usage, out: &mut Vec<ChatEvent>) {
        out.push(ChatEvent::Usage { usage });
    }

    /// Record the provider's finish reason.
    ///
    /// A definitive reason (`stop`, `tool_calls`) flushes buffered tool calls
    /// strictly; anything else leaves them for the end-of-stream flush.
    pub fn finish(&mut self, reason: FinishReason, out: &mut Vec<ChatEvent>) -> Result<(), LlmError> {
        let definitive = reason.is_definitive();
        self.finish_reason = Some(reason);
        if definitive {
            self.flush_tool_calls(FlushMode::Strict, out)?;
        }
        Ok(())
    }

    /// Emit everything still buffered and the single `StreamEnd`.
    pub fn end_stream(&mut self, mode: FlushMode, out: &mut Vec<ChatEvent>) -> Result<(), LlmError> {
        if self.ended {
            return Ok(());
        }
        let segments = self.tags.finish();
        self.apply_segments(segments, out);
        self.flush_tool_calls(mode, out)?;
        self.end_thinking(out);
        self.remember_reasoning();
        self.ended = true;
        out.push(ChatEvent::StreamEnd {
            finish_reason: self.finish_reason.clone(),
        });
        Ok(())
    }

    fn flush_tool_calls(&mut self, mode: FlushMode, out: &mut Vec<ChatEvent>) -> Result<(), LlmError> {
        for call in self.tool_calls.flush(mode)? {
            self.emit_call(call, out);
        }
        Ok(())
    }

    fn apply_segments(&mut self, segments: Vec<TagSegment>, out: &mut Vec<ChatEvent>) {
        for segment in segments {
            match segment {
                TagSegment::Text(text) => self.push_text(&text, out),
                TagSegment::Thinking(text) => self.push_thinking_raw(&text, out),
                TagSegment::ThinkEnd => self.end_thinking(out),
            }
        }
    }

    fn emit_begin_hint(&mut self, index: usize, out: &mut Vec<ChatEvent>) {
        if !self.options.emit_tool_call_begin_hint {
            return;
        }
        if let Some((id, name)) = self.tool_calls.take_begin_hint(index) {
            self.end_thinking(out);
            out.push(ChatEvent::ToolCallDelta { index, id, name });
        }
    }

    fn emit_call(&mut self, call: ReadyCall, out: &mut Vec<ChatEvent>) {
        self.end_thinking(out);
        if !self.filler_checked {
            self.filler_checked = true;
            if self.options.emit_filler_space && self.has_emitted_text {
                out.push(ChatEvent::TextDelta {
                    text: " ".to_string(),
                });
            }
        }
        self.emitted_call_ids.push(call.id.clone());
        out.push(ChatEvent::ToolCall {
            id: call.id,
            name: call.name,
            arguments: call.arguments,
        });
    }

    fn remember_reasoning(&mut self) {
        let Some(cache) = &self.reasoning_cache else {
            return;
        };
        if self.turn_thinking.is_empty() {
            return;
        }
        for id in &self.emitted_call_ids {
            cache.insert(id.clone(), self.turn_thinking.clone());
        }
    }
}
