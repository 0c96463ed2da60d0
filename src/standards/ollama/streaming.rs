//! Ollama streaming
//!
//! Each line is a complete JSON object. Tool calls arrive whole, with argument
//! objects rather than strings, and carry no id unless the server adds one.

use serde::Deserialize;

use crate::error::LlmError;
use crate::streaming::{FlushMode, Frame, StreamEventConverter, StreamParseState};
use crate::types::{ChatEvent, FinishReason, ProtocolFamily, Usage};

#[derive(Debug, Deserialize)]
struct OllamaStreamResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    #[serde(default)]
    id: Option<String>,
    function: OllamaFunction,
}

#[derive(Debug, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

pub struct OllamaEventConverter {
    state: StreamParseState,
    next_call_index: usize,
}

impl OllamaEventConverter {
    pub fn new(state: StreamParseState) -> Self {
        Self {
            state,
            next_call_index: 0,
        }
    }

    fn convert_message(
        &mut self,
        message: &OllamaMessage,
        out: &mut Vec<ChatEvent>,
    ) -> Result<(), LlmError> {
        if let Some(thinking) = message.thinking.as_deref() {
            self.state.push_reasoning(thinking, out);
        }
        if let Some(content) = message.content.as_deref() {
            self.state.push_content(content, out);
        }
        for call in &message.tool_calls {
            let index = self.next_call_index;
            self.next_call_index += 1;
            let arguments = match &call.function.arguments {
                serde_json::Value::Null => String::new(),
                // some models double-encode arguments as a JSON string
                serde_json::Value::String(raw) => raw.clone(),
                other => other.to_string(),
            };
            self.state.push_complete_call(
                index,
                call.id.as_deref(),
                &call.function.name,
                &arguments,
                out,
            )?;
        }
        Ok(())
    }
}

impl StreamEventConverter for OllamaEventConverter {
    fn state(&self) -> &StreamParseState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StreamParseState {
        &mut self.state
    }

    fn convert_frame(&mut self, frame: &Frame, out: &mut Vec<ChatEvent>) -> Result<(), LlmError> {
        let response: OllamaStreamResponse = serde_json::from_str(&frame.data)
            .map_err(|e| LlmError::ProtocolDecodeError(format!("invalid Ollama line: {e}")))?;

        if let Some(message) = response.error {
            return Err(LlmError::ProviderError {
                family: ProtocolFamily::Ollama,
                message,
            });
        }

        if let Some(message) = &response.message {
            self.convert_message(message, out)?;
        }

        if response.done {
            let reason = FinishReason::parse(response.done_reason.as_deref().unwrap_or("stop"));
            self.state.finish(reason, out)?;
            if response.prompt_eval_count.is_some() || response.eval_count.is_some() {
                self.state.push_usage(
                    Usage::new(response.prompt_eval_count, response.eval_count),
                    out,
                );
            }
            self.state.end_stream(FlushMode::Strict, out)?;
        }
        Ok(())
    }
}
