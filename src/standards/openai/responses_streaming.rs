//! OpenAI Responses API streaming
//!
//! Named events (`response.output_text.delta`, `response.function_call_arguments.delta`,
//! `response.completed`, ...). Tool calls are keyed by `output_index`. The
//! `*.done` and completion events repeat content already streamed as deltas,
//! so they only contribute what the deltas did not surface.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::LlmError;
use crate::streaming::{FlushMode, Frame, StreamEventConverter, StreamParseState, parse_frame_json};
use crate::types::{ChatEvent, FinishReason, ProtocolFamily, Usage};

pub struct OpenAiResponsesEventConverter {
    state: StreamParseState,
    text_streamed: bool,
    reasoning_streamed: bool,
    /// Output indices whose arguments arrived as deltas.
    argument_deltas: HashSet<usize>,
}

impl OpenAiResponsesEventConverter {
    pub fn new(state: StreamParseState) -> Self {
        Self {
            state,
            text_streamed: false,
            reasoning_streamed: false,
            argument_deltas: HashSet::new(),
        }
    }

    fn provider_error(message: impl Into<String>) -> LlmError {
        LlmError::ProviderError {
            family: ProtocolFamily::OpenAiResponses,
            message: message.into(),
        }
    }

    /// Apply a finished output item unless deltas already covered it.
    fn apply_output_item(
        &mut self,
        index: usize,
        item: &Value,
        out: &mut Vec<ChatEvent>,
    ) -> Result<(), LlmError> {
        match item.get("type").and_then(Value::as_str) {
            Some("function_call") => {
                if self.state.is_tool_call_completed(index) {
                    return Ok(());
                }
                let id = item
                    .get("call_id")
                    .or_else(|| item.get("id"))
                    .and_then(Value::as_str);
                let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
                if self.argument_deltas.contains(&index) {
                    self.state.push_tool_fragment(index, id, Some(name), None, out);
                    self.state.finish_tool_call(index, out)
                } else {
                    let arguments = item.get("arguments").and_then(Value::as_str).unwrap_or_default();
                    self.state.push_complete_call(index, id, name, arguments, out)
                }
            }
            Some("message") if !self.text_streamed => {
                let text: String = item
                    .get("content")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect();
                if !text.is_empty() {
                    self.text_streamed = true;
                    self.state.push_content(&text, out);
                }
                Ok(())
            }
            Some("reasoning") if !self.reasoning_streamed => {
                let parts = item
                    .get("summary")
                    .and_then(Value::as_array)
                    .into_iter()
                    .chain(item.get("content").and_then(Value::as_array))
                    .flatten()
                    .filter_map(|part| part.get("text").and_then(Value::as_str));
                let mut any = false;
                for text in parts {
                    any = true;
                    self.state.push_reasoning(text, out);
                }
                self.reasoning_streamed |= any;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn complete(&mut self, response: &Value, out: &mut Vec<ChatEvent>) -> Result<(), LlmError> {
        if let Some(items) = response.get("output").and_then(Value::as_array) {
            for (index, item) in items.iter().enumerate() {
                self.apply_output_item(index, item, out)?;
            }
        }

        if let Some(usage) = response.get("usage").filter(|u| u.is_object()) {
            self.state.push_usage(parse_responses_usage(usage), out);
        }

        let reason = match response.get("status").and_then(Value::as_str) {
            Some("incomplete") => response
                .pointer("/incomplete_details/reason")
                .and_then(Value::as_str)
                .map_or(FinishReason::Length, FinishReason::parse),
            _ if has_function_call(response) => FinishReason::ToolCalls,
            _ => FinishReason::Stop,
        };
        self.state.finish(reason, out)?;
        self.state.end_stream(FlushMode::Strict, out)
    }
}

fn has_function_call(response: &Value) -> bool {
    response
        .get("output")
        .and_then(Value::as_array)
        .is_some_and(|items| items.iter().any(|i| i["type"] == "function_call"))
}

fn parse_responses_usage(usage: &Value) -> Usage {
    let count = |v: Option<&Value>| v.and_then(Value::as_u64).map(|n| n as u32);
    Usage {
        prompt_tokens: count(usage.get("input_tokens")),
        completion_tokens: count(usage.get("output_tokens")),
        total_tokens: count(usage.get("total_tokens")),
        reasoning_tokens: count(usage.pointer("/output_tokens_details/reasoning_tokens")),
    }
}

fn output_index(event: &Value) -> usize {
    event
        .get("output_index")
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize
}

impl StreamEventConverter for OpenAiResponsesEventConverter {
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
        let str_field = |name: &str| event.get(name).and_then(Value::as_str).unwrap_or_default();

        match kind {
            "response.output_text.delta" => {
                let delta = str_field("delta");
                if !delta.is_empty() {
                    self.text_streamed = true;
                    self.state.push_content(delta, out);
                }
            }
            "response.output_text.done" => {
                let text = str_field("text");
                if !self.text_streamed && !text.is_empty() {
                    self.text_streamed = true;
                    self.state.push_content(text, out);
                }
            }
            "response.reasoning_summary_text.delta" | "response.reasoning_text.delta" => {
                let delta = str_field("delta");
                if !delta.is_empty() {
                    self.reasoning_streamed = true;
                    self.state.push_reasoning(delta, out);
                }
            }
            "response.reasoning_summary_text.done" | "response.reasoning_text.done" => {
                let text = str_field("text");
                if !self.reasoning_streamed && !text.is_empty() {
                    self.reasoning_streamed = true;
                    self.state.push_reasoning(text, out);
                }
            }
            "response.output_item.added" => {
                let item = &event["item"];
                if item["type"] == "function_call" {
                    let index = output_index(&event);
                    self.state.push_tool_fragment(
                        index,
                        item.get("call_id").and_then(Value::as_str),
                        item.get("name").and_then(Value::as_str),
                        None,
                        out,
                    );
                }
            }
            "response.function_call_arguments.delta" => {
                let index = output_index(&event);
                self.argument_deltas.insert(index);
                self.state
                    .push_tool_fragment(index, None, None, Some(str_field("delta")), out);
            }
            "response.function_call_arguments.done" => {
                let index = output_index(&event);
                if !self.argument_deltas.contains(&index) {
                    self.argument_deltas.insert(index);
                    self.state
                        .push_tool_fragment(index, None, None, Some(str_field("arguments")), out);
                }
                self.state.finish_tool_call(index, out)?;
            }
            "response.output_item.done" => {
                let index = output_index(&event);
                self.apply_output_item(index, &event["item"], out)?;
            }
            "response.completed" | "response.done" | "response.incomplete" => {
                self.complete(&event["response"], out)?;
            }
            "response.failed" => {
                let message = event
                    .pointer("/response/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("response failed");
                return Err(Self::provider_error(message));
            }
            "error" => {
                let message = event
                    .get("message")
                    .or_else(|| event.pointer("/error/message"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(Self::provider_error(message));
            }
            other => {
                tracing::trace!(event = other, "ignoring responses event");
            }
        }
        Ok(())
    }
}
