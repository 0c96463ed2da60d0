//! OpenAI Chat Completions streaming
//!
//! Each SSE payload is a `chat.completion.chunk` carrying at most one choice.
//! Reasoning may arrive under several field names depending on the backend.

use serde_json::Value;

use crate::error::LlmError;
use crate::streaming::{Frame, StreamEventConverter, StreamParseState, parse_frame_json};
use crate::types::{ChatEvent, FinishReason, ProtocolFamily, Usage};

/// Dedicated reasoning fields, highest priority first.
const REASONING_FIELDS: [&str; 3] = ["reasoning_content", "reasoning", "thinking"];

pub struct OpenAiChatEventConverter {
    state: StreamParseState,
}

impl OpenAiChatEventConverter {
    pub fn new(state: StreamParseState) -> Self {
        Self { state }
    }

    fn convert_delta(&mut self, delta: &Value, out: &mut Vec<ChatEvent>) {
        let reasoning = REASONING_FIELDS
            .iter()
            .find_map(|field| {
                delta
                    .get(*field)
                    .and_then(Value::as_str)
                    .filter(|text| !text.is_empty())
            });
        match reasoning {
            Some(text) => self.state.push_reasoning(text, out),
            None => {
                if let Some(details) = delta.get("reasoning_details").and_then(Value::as_array) {
                    for detail in details {
                        if let Some(text) = reasoning_detail_text(detail) {
                            self.state.push_reasoning(text, out);
                        }
                    }
                }
            }
        }

        if let Some(content) = delta.get("content").and_then(Value::as_str) {
            self.state.push_content(content, out);
        }

        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for (position, call) in calls.iter().enumerate() {
                let index = call
                    .get("index")
                    .and_then(Value::as_u64)
                    .map_or(position, |i| i as usize);
                let function = call.get("function");
                self.state.push_tool_fragment(
                    index,
                    call.get("id").and_then(Value::as_str),
                    function.and_then(|f| f.get("name")).and_then(Value::as_str),
                    function.and_then(|f| f.get("arguments")).and_then(Value::as_str),
                    out,
                );
            }
        }
    }
}

/// Text of one `reasoning_details` entry (`reasoning.text` or `reasoning.summary`).
fn reasoning_detail_text(detail: &Value) -> Option<&str> {
    match detail.get("type").and_then(Value::as_str) {
        Some("reasoning.encrypted") => None,
        Some("reasoning.summary") => detail.get("summary").and_then(Value::as_str),
        _ => detail.get("text").and_then(Value::as_str),
    }
}

pub(crate) fn parse_chat_usage(usage: &Value) -> Usage {
    let count = |v: Option<&Value>| v.and_then(Value::as_u64).map(|n| n as u32);
    Usage {
        prompt_tokens: count(usage.get("prompt_tokens")),
        completion_tokens: count(usage.get("completion_tokens")),
        total_tokens: count(usage.get("total_tokens")),
        reasoning_tokens: count(usage.pointer("/completion_tokens_details/reasoning_tokens")),
    }
}

impl StreamEventConverter for OpenAiChatEventConverter {
    fn state(&self) -> &StreamParseState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StreamParseState {
        &mut self.state
    }

    fn convert_frame(&mut self, frame: &Frame, out: &mut Vec<ChatEvent>) -> Result<(), LlmError> {
        let chunk = parse_frame_json(frame)?;

        if let Some(error) = chunk.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(LlmError::ProviderError {
                family: ProtocolFamily::OpenAiChat,
                message,
            });
        }

        if let Some(choice) = chunk.get("choices").and_then(|c| c.get(0)) {
            // some compatible servers send full `message` objects instead of deltas
            if let Some(delta) = choice.get("delta").or_else(|| choice.get("message")) {
                self.convert_delta(delta, out);
            }
            if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
                self.state.finish(FinishReason::parse(reason), out)?;
            }
        }

        if let Some(usage) = chunk.get("usage").filter(|u| u.is_object()) {
            self.state.push_usage(parse_chat_usage(usage), out);
        }
        Ok(())
    }
}
