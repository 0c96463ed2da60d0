//! Thinking buffer
//!
//! Coalesces reasoning fragments into `ThinkingDelta` events. A flush is due
//! one debounce interval after the first unflushed fragment; the stream driver
//! owns the timer by racing [`ThinkingBuffer::deadline`] against the next chunk.

use std::time::Duration;

use tokio::time::Instant;

use crate::types::ChatEvent;

/// Values some providers echo in reasoning fields instead of actual reasoning.
const REASONING_CONFIG_WORDS: &[&str] = &[
    "none", "minimal", "low", "medium", "high", "xhigh", "auto", "default", "enabled",
    "disabled", "true", "false",
];

/// Whether a reasoning-shaped field holds a configuration word rather than text.
pub fn is_reasoning_config_value(raw: &str) -> bool {
    let value = raw.trim();
    REASONING_CONFIG_WORDS
        .iter()
        .any(|word| value.eq_ignore_ascii_case(word))
}

fn new_thinking_id() -> String {
    format!("thinking_{}", uuid::Uuid::new_v4().simple())
}

#[derive(Debug)]
pub struct ThinkingBuffer {
    interval: Duration,
    thinking_id: Option<String>,
    pending: String,
    /// Everything received for the open sequence; base for snapshot dedupe.
    seen: String,
    deadline: Option<Instant>,
}

impl ThinkingBuffer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            thinking_id: None,
            pending: String::new(),
            seen: String::new(),
            deadline: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.thinking_id.is_some()
    }

    pub fn thinking_id(&self) -> Option<&str> {
        self.thinking_id.as_deref()
    }

    /// When the pending text must be flushed, if anything is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the open sequence has received any text yet.
    pub fn has_seen_text(&self) -> bool {
        !self.seen.is_empty()
    }

    /// Append a reasoning fragment and return the text actually added.
    ///
    /// Providers either stream deltas or resend the cumulative text so far.
    /// A fragment that extends everything seen in this sequence contributes
    /// only its new suffix; one that is a prefix of it contributes nothing.
    /// Anything else is an ordinary delta.
    pub fn push(&mut self, fragment: &str, out: &mut Vec<ChatEvent>) -> String {
        let addition = if self.seen.is_empty() {
            fragment
        } else if let Some(suffix) = fragment.strip_prefix(self.seen.as_str()) {
            suffix
        } else if self.seen.starts_with(fragment) {
            ""
        } else {
            fragment
        };
        if addition.is_empty() {
            return String::new();
        }
        let addition = addition.to_string();

        if self.thinking_id.is_none() {
            self.thinking_id = Some(new_thinking_id());
        }
        self.pending.push_str(&addition);
        self.seen.push_str(&addition);

        if self.interval.is_zero() {
            self.flush(out);
        } else if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.interval);
        }
        addition
    }

    /// Emit pending text under the current sequence id without closing it.
    pub fn flush(&mut self, out: &mut Vec<ChatEvent>) {
        self.deadline = None;
        if self.pending.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.pending);
        if let Some(thinking_id) = &self.thinking_id {
            out.push(ChatEvent::ThinkingDelta {
                text,
                thinking_id: thinking_id.clone(),
            });
        }
    }

    /// Flush when the debounce deadline has passed.
    pub fn flush_if_due(&mut self, now: Instant, out: &mut Vec<ChatEvent>) {
        if self.deadline.is_some_and(|deadline| deadline <= now) {
            self.flush(out);
        }
    }

    /// Force a flush and close the open sequence.
    pub fn end(&mut self, out: &mut Vec<ChatEvent>) {
        self.flush(out);
        if let Some(thinking_id) = self.thinking_id.take() {
            out.push(ChatEvent::ThinkingEnd { thinking_id });
        }
        self.seen.clear();
    }
}
