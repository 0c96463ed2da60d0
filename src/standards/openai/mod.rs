//! OpenAI API Standard
//!
//! Two wire formats share this module: chat/completions, implemented by a long
//! tail of compatible servers, and the newer "responses" event stream.

pub mod chat;
pub mod chat_streaming;
pub mod responses;
pub mod responses_streaming;

pub use chat::build_chat_request;
pub use chat_streaming::OpenAiChatEventConverter;
pub use responses::build_responses_request;
pub use responses_streaming::OpenAiResponsesEventConverter;

use serde_json::{Value, json};

use crate::types::ToolDefinition;

/// Tools in chat/completions shape.
pub(crate) fn chat_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters(),
                }
            })
        })
        .collect()
}

/// Tools in the flattened responses shape.
pub(crate) fn responses_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters(),
            })
        })
        .collect()
}
