//! Gemini streaming
//!
//! Every SSE payload is a complete `GenerateContentResponse` chunk. Function
//! calls are never fragmented; they are numbered in arrival order.

use serde_json::Value;

use crate::error::LlmError;
use crate::streaming::{Frame, StreamEventConverter, StreamParseState, parse_frame_json};
use crate::types::{ChatEvent, FinishReason, ProtocolFamily, Usage};

pub struct GeminiEventConverter {
    state: StreamParseState,
    next_call_index: usize,
}

impl GeminiEventConverter {
    pub fn new(state: StreamParseState) -> Self {
        Self {
            state,
            next_call_index: 0,
        }
    }

    fn convert_part(&mut self, part: &Value, out: &mut Vec<ChatEvent>) -> Result<(), LlmError> {
        if let Some(call) = part.get("functionCall") {
            let index = self.next_call_index;
            self.next_call_index += 1;
            let name = call.get("name").and_then(Value::as_str).unwrap_or_default();
            let arguments = call
                .get("args")
                .filter(|args| !args.is_null())
                .map(Value::to_string)
                .unwrap_or_default();
            return self.state.push_complete_call(
                index,
                call.get("id").and_then(Value::as_str),
                name,
                &arguments,
                out,
            );
        }

        let Some(text) = part.get("text").and_then(Value::as_str) else {
            return Ok(());
        };
        if part.get("thought").and_then(Value::as_bool) == Some(true) {
            self.state.push_reasoning(text, out);
        } else {
            self.state.push_content(text, out);
        }
        Ok(())
    }
}

fn parse_usage(metadata: &Value) -> Usage {
    let count = |key: &str| metadata.get(key).and_then(Value::as_u64).map(|n| n as u32);
    Usage {
        prompt_tokens: count("promptTokenCount"),
        completion_tokens: count("candidatesTokenCount"),
        total_tokens: count("totalTokenCount"),
        reasoning_tokens: count("thoughtsTokenCount"),
    }
}

impl StreamEventConverter for GeminiEventConverter {
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
                family: ProtocolFamily::Gemini,
                message,
            });
        }

        let candidate = chunk.get("candidates").and_then(|c| c.get(0));
        if let Some(parts) = candidate
            .and_then(|c| c.pointer("/content/parts"))
            .and_then(Value::as_array)
        {
            for part in parts {
                self.convert_part(part, out)?;
            }
        }

        // usage metadata repeats on every chunk; only the final one is reported
        if let Some(reason) = candidate
            .and_then(|c| c.get("finishReason"))
            .and_then(Value::as_str)
        {
            self.state.finish(FinishReason::parse(reason), out)?;
            if let Some(metadata) = chunk.get("usageMetadata") {
                self.state.push_usage(parse_usage(metadata), out);
            }
        }
        Ok(())
    }
}
