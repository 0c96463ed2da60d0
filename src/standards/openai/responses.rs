//! OpenAI Responses API request builder
//!
//! System text becomes `instructions`; every other turn becomes one or more
//! input items. The last user message item is sent with `status: "incomplete"`.

use serde_json::{Map, Value, json};

use super::responses_tools;
use crate::error::LlmError;
use crate::standards::{
    BuildContext, BuiltRequest, Diagnostics, data_uri, insert_f64, insert_u32, merge_extra,
    preflight, usable_images,
};
use crate::types::{ChatMessage, ModelConfig, ProtocolFamily, ReasoningConfig, RequestOptions, Role};

const DEEP_MERGE_KEYS: &[&str] = &["reasoning", "text"];

pub fn build_responses_request(
    messages: &[ChatMessage],
    model: &ModelConfig,
    options: &RequestOptions,
    ctx: &BuildContext<'_>,
) -> Result<BuiltRequest, LlmError> {
    let required = preflight(messages, options)?;
    let mut diagnostics = Diagnostics::new(ProtocolFamily::OpenAiResponses);

    let mut instructions = Vec::new();
    let mut input = Vec::new();
    for message in messages {
        convert_message(message, model, &mut diagnostics, &mut instructions, &mut input);
    }
    mark_last_user_incomplete(&mut input);

    let mut body = Map::new();
    body.insert("model".into(), json!(model.id));
    if !instructions.is_empty() {
        body.insert("instructions".into(), json!(instructions.join("\n\n")));
    }
    body.insert("input".into(), Value::Array(input));
    body.insert("stream".into(), json!(true));

    insert_u32(&mut body, "max_output_tokens", model.max_output_tokens);
    insert_f64(&mut body, "temperature", model.temperature.resolve(ctx.sampling.temperature));
    insert_f64(&mut body, "top_p", model.top_p.resolve(ctx.sampling.top_p));

    if let Some(reasoning) = model.reasoning.as_ref().and_then(reasoning_object) {
        body.insert("reasoning".into(), reasoning);
    }

    if !options.tools.is_empty() {
        body.insert("tools".into(), Value::Array(responses_tools(&options.tools)));
        if let Some(tool) = required {
            body.insert("tool_choice".into(), json!({ "type": "function", "name": tool.name }));
        }
    }

    merge_extra(&mut body, &model.extra, DEEP_MERGE_KEYS);
    Ok(diagnostics.finish(body))
}

fn reasoning_object(reasoning: &ReasoningConfig) -> Option<Value> {
    if reasoning.enabled == Some(false) {
        return None;
    }
    match &reasoning.effort {
        Some(effort) => Some(json!({ "effort": effort, "summary": "auto" })),
        None if reasoning.enabled == Some(true) => Some(json!({ "summary": "auto" })),
        None => None,
    }
}

fn convert_message(
    message: &ChatMessage,
    model: &ModelConfig,
    diagnostics: &mut Diagnostics,
    instructions: &mut Vec<String>,
    input: &mut Vec<Value>,
) {
    for result in &message.tool_results {
        input.push(json!({
            "type": "function_call_output",
            "call_id": result.call_id,
            "output": result.content,
        }));
    }

    match message.role {
        Role::System => {
            if message.has_text() {
                instructions.push(message.joined_text());
            }
        }
        Role::User => {
            let mut content = Vec::new();
            if message.has_text() {
                content.push(json!({ "type": "input_text", "text": message.joined_text() }));
            }
            for image in usable_images(message, model, diagnostics) {
                content.push(json!({ "type": "input_image", "image_url": data_uri(image) }));
            }
            if !content.is_empty() {
                input.push(json!({ "type": "message", "role": "user", "content": content }));
            }
        }
        Role::Assistant => {
            if !message.thinking.is_empty() {
                tracing::debug!("responses input has no plain-text reasoning item; skipping thinking");
            }
            if message.has_text() {
                input.push(json!({
                    "type": "message",
                    "role": "assistant",
                    "content": [{ "type": "output_text", "text": message.joined_text() }],
                }));
            }
            for call in &message.tool_calls {
                input.push(json!({
                    "type": "function_call",
                    "call_id": call.id,
                    "name": call.name,
                    "arguments": call.arguments,
                }));
            }
        }
        Role::Tool => {}
    }
}

fn mark_last_user_incomplete(input: &mut [Value]) {
    let last_user = input
        .iter_mut()
        .rev()
        .find(|item| item["type"] == "message" && item["role"] == "user");
    if let Some(Value::Object(item)) = last_user {
        item.insert("status".into(), json!("incomplete"));
    }
}
