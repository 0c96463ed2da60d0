//! Anthropic Messages streaming
//!
//! Content arrives as indexed blocks: `content_block_start`, any number of
//! `content_block_delta`, then `content_block_stop`. The block type is only
//! named at start, so it is remembered per index.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::LlmError;
use crate::streaming::{FlushMode, Frame, StreamEventConverter, StreamParseState, parse_frame_json};
use crate::types::{ChatEvent, FinishReason, ProtocolFamily, Usage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
    ToolUse,
    Other,
}

pub struct AnthropicEventConverter {
    state: StreamParseState,
    blocks: HashMap<usize, BlockKind>,
    input_tokens: Option<u32>,
}

impl AnthropicEventConverter {
    pub fn new(state: StreamParseState) -> Self {
        Self {
            state,
            blocks: HashMap::new(),
            input_tokens: None,
        }
    }

    fn block_start(&mut self, index: usize, block: &Value, out: &mut Vec<ChatEvent>) {
        let kind = match block.get("type").and_then(Value::as_str) {
            Some("text") => BlockKind::Text,
            Some("thinking") => BlockKind::Thinking,
            Some("tool_use") => BlockKind::ToolUse,
            _ => BlockKind::Other,
        };
        self.blocks.insert(index, kind);

        match kind {
            BlockKind::Text => {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    self.state.push_content(text, out);
                }
            }
            BlockKind::Thinking => {
                if let Some(text) = block.get("thinking").and_then(Value::as_str) {
                    self.state.push_reasoning(text, out);
                }
            }
            BlockKind::ToolUse => {
                // `input` at start is normally `{}`; arguments follow as deltas
                let initial = block
                    .get("input")
                    .filter(|input| input.as_object().is_some_and(|o| !o.is_empty()))
                    .map(Value::to_string);
                self.state.push_tool_fragment(
                    index,
                    block.get("id").and_then(Value::as_str),
                    block.get("name").and_then(Value::as_str),
                    initial.as_deref(),
                    out,
                );
            }
            BlockKind::Other => {}
        }
    }

    fn block_delta(&mut self, index: usize, delta: &Value, out: &mut Vec<ChatEvent>) {
        match delta.get("type").and_then(Value::as_str) {
            Some("text_delta") => {
                if let Some(text) = delta.get("text").and_then(Value::as_str) {
                    self.state.push_content(text, out);
                }
            }
            Some("thinking_delta") => {
                if let Some(text) = delta.get("thinking").and_then(Value::as_str) {
                    self.state.push_reasoning(text, out);
                }
            }
            Some("input_json_delta") => {
                let fragment = delta.get("partial_json").and_then(Value::as_str);
                self.state.push_tool_fragment(index, None, None, fragment, out);
            }
            _ => {}
        }
    }

    fn block_stop(&mut self, index: usize, out: &mut Vec<ChatEvent>) -> Result<(), LlmError> {
        match self.blocks.remove(&index) {
            Some(BlockKind::ToolUse) => self.state.finish_tool_call(index, out),
            Some(BlockKind::Thinking) => {
                self.state.end_thinking(out);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn block_index(event: &Value) -> usize {
    event.get("index").and_then(Value::as_u64).unwrap_or(0) as usize
}

fn token_count(value: Option<&Value>) -> Option<u32> {
    value.and_then(Value::as_u64).map(|n| n as u32)
}

impl StreamEventConverter for AnthropicEventConverter {
    fn state(&self) -> &StreamParseState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StreamParseState {
        &mut self.state
    }

    fn convert_frame(&mut self, frame: &Frame, out: &mut Vec<ChatEvent>) -> Result<(), LlmError> {
        let event = parse_frame_json(frame)?;
        let kind = event
            .get("type")
            .and_then(Value::as_str)
            .or(frame.event.as_deref())
            .unwrap_or_default();

        match kind {
            "message_start" => {
                self.input_tokens = token_count(event.pointer("/message/usage/input_tokens"));
            }
            "content_block_start" => {
                self.block_start(block_index(&event), &event["content_block"], out);
            }
            "content_block_delta" => {
                self.block_delta(block_index(&event), &event["delta"], out);
            }
            "content_block_stop" => {
                self.block_stop(block_index(&event), out)?;
            }
            "message_delta" => {
                if let Some(reason) = event.pointer("/delta/stop_reason").and_then(Value::as_str) {
                    self.state.finish(FinishReason::parse(reason), out)?;
                }
                if let Some(output) = token_count(event.pointer("/usage/output_tokens")) {
                    let input = token_count(event.pointer("/usage/input_tokens")).or(self.input_tokens);
                    self.state.push_usage(Usage::new(input, Some(output)), out);
                }
            }
            "message_stop" => {
                self.state.end_stream(FlushMode::Strict, out)?;
            }
            "error" => {
                let message = event
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                return Err(LlmError::ProviderError {
                    family: ProtocolFamily::Anthropic,
                    message,
                });
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::StreamOptions;
    use serde_json::json;
    use std::time::Duration;

    fn converter() -> AnthropicEventConverter {
        AnthropicEventConverter::new(StreamParseState::new(
            ProtocolFamily::Anthropic,
            StreamOptions {
                thinking_flush_interval: Duration::ZERO,
                ..StreamOptions::default()
            },
        ))
    }

    fn feed(conv: &mut AnthropicEventConverter, events: &[Value]) -> Result<Vec<ChatEvent>, LlmError> {
        let mut out = Vec::new();
        for event in events {
            conv.convert_frame(&Frame::data(event.to_string()), &mut out)?;
        }
        Ok(out)
    }

    #[test]
    fn thinking_block_ends_before_text() {
        let mut conv = converter();
        let out = feed(
            &mut conv,
            &[
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "thinking", "thinking": ""}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "thinking_delta", "thinking": "Let me think"}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "signature_delta", "signature": "sig"}}),
                json!({"type": "content_block_stop", "index": 0}),
                json!({"type": "content_block_start", "index": 1, "content_block": {"type": "text", "text": ""}}),
                json!({"type": "content_block_delta", "index": 1, "delta": {"type": "text_delta", "text": "Answer"}}),
            ],
        )
        .unwrap();
        assert!(matches!(&out[0], ChatEvent::ThinkingDelta { text, .. } if text == "Let me think"));
        assert!(matches!(out[1], ChatEvent::ThinkingEnd { .. }));
        assert_eq!(out[2], ChatEvent::TextDelta { text: "Answer".into() });
    }

    #[test]
    fn tool_use_block_assembles_and_stops_strictly() {
        let mut conv = converter();
        let out = feed(
            &mut conv,
            &[
                json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {}}}),
                json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"location\": \"San"}}),
                json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": " Francisco\"}"}}),
                json!({"type": "content_block_stop", "index": 1}),
            ],
        )
        .unwrap();
        assert_eq!(
            out,
            vec![ChatEvent::ToolCall {
                id: "toolu_1".into(),
                name: "get_weather".into(),
                arguments: "{\"location\": \"San Francisco\"}".into()
            }]
        );

        let mut conv = converter();
        let err = feed(
            &mut conv,
            &[
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "t", "name": "f", "input": {}}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "{\"broken\""}}),
                json!({"type": "content_block_stop", "index": 0}),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, LlmError::ToolCallAssemblyError { .. }));
    }

    #[test]
    fn message_stop_ends_with_usage_and_reason() {
        let mut conv = converter();
        let out = feed(
            &mut conv,
            &[
                json!({"type": "message_start", "message": {"usage": {"input_tokens": 12, "output_tokens": 1}}}),
                json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 30}}),
                json!({"type": "message_stop"}),
            ],
        )
        .unwrap();
        assert_eq!(
            out,
            vec![
                ChatEvent::Usage {
                    usage: Usage::new(Some(12), Some(30))
                },
                ChatEvent::StreamEnd {
                    finish_reason: Some(FinishReason::Stop)
                },
            ]
        );
    }

    #[test]
    fn error_event_is_provider_error() {
        let mut conv = converter();
        let err = feed(
            &mut conv,
            &[json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}})],
        )
        .unwrap_err();
        assert!(matches!(err, LlmError::ProviderError { family: ProtocolFamily::Anthropic, .. }));
    }
}
