//! Canonical streaming events

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    /// Map a provider's finish/stop reason string onto the canonical set.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "stop" | "end_turn" | "STOP" | "stop_sequence" | "completed" => Self::Stop,
            "length" | "max_tokens" | "MAX_TOKENS" | "max_output_tokens" => Self::Length,
            "tool_calls" | "function_call" | "tool_use" => Self::ToolCalls,
            "content_filter" | "SAFETY" | "RECITATION" | "refusal" => Self::ContentFilter,
            other => Self::Other(other.to_string()),
        }
    }

    /// Finish reasons that definitively end generation and demand a strict tool-call flush.
    pub fn is_definitive(&self) -> bool {
        matches!(self, Self::Stop | Self::ToolCalls)
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub reasoning_tokens: Option<u32>,
}

impl Usage {
    pub fn new(prompt_tokens: Option<u32>, completion_tokens: Option<u32>) -> Self {
        let total_tokens = match (prompt_tokens, completion_tokens) {
            (Some(p), Some(c)) => Some(p.saturating_add(c)),
            _ => None,
        };
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
            reasoning_tokens: None,
        }
    }
}

/// Canonical response event, consumed by the host strictly in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChatEvent {
    /// Ordinary answer text.
    TextDelta { text: String },
    /// Coalesced reasoning text belonging to one thinking sequence.
    ThinkingDelta { text: String, thinking_id: String },
    /// The thinking sequence is closed; no more deltas will carry this id.
    ThinkingEnd { thinking_id: String },
    /// A tool call has started (name known, arguments still streaming).
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: String,
    },
    /// A complete tool call with a valid JSON object as arguments.
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },
    /// Token usage.
    Usage { usage: Usage },
    /// Final event of every successful stream.
    StreamEnd { finish_reason: Option<FinishReason> },
}

/// Stream of canonical events.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatEvent, LlmError>> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reasons_normalize_across_providers() {
        assert_eq!(FinishReason::parse("end_turn"), FinishReason::Stop);
        assert_eq!(FinishReason::parse("tool_use"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::parse("MAX_TOKENS"), FinishReason::Length);
        assert_eq!(
            FinishReason::parse("weird"),
            FinishReason::Other("weird".to_string())
        );
        assert!(FinishReason::ToolCalls.is_definitive());
        assert!(!FinishReason::Length.is_definitive());
    }

    #[test]
    fn usage_totals_when_both_sides_known() {
        assert_eq!(Usage::new(Some(3), Some(4)).total_tokens, Some(7));
        assert_eq!(Usage::new(Some(3), None).total_tokens, None);
        assert_eq!(Usage::new(Some(u32::MAX), Some(1)).total_tokens, Some(u32::MAX));
    }
}
