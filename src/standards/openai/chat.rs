//! OpenAI Chat Completions request builder

use serde_json::{Map, Value, json};

use super::chat_tools;
use crate::error::LlmError;
use crate::standards::{
    BuildContext, BuiltRequest, Diagnostics, data_uri, insert_f64, insert_u32, merge_extra,
    preflight, usable_images,
};
use crate::types::{ChatMessage, ModelConfig, ProtocolFamily, ReasoningConfig, RequestOptions, Role};

/// Keys of `extra` that augment rather than replace computed fields.
const DEEP_MERGE_KEYS: &[&str] = &["reasoning"];

/// Build a streaming chat/completions body.
pub fn build_chat_request(
    messages: &[ChatMessage],
    model: &ModelConfig,
    options: &RequestOptions,
    ctx: &BuildContext<'_>,
) -> Result<BuiltRequest, LlmError> {
    let required = preflight(messages, options)?;
    let mut diagnostics = Diagnostics::new(ProtocolFamily::OpenAiChat);

    let mut wire_messages = Vec::with_capacity(messages.len());
    for message in messages {
        convert_message(message, model, ctx, &mut diagnostics, &mut wire_messages);
    }

    let mut body = Map::new();
    body.insert("model".into(), json!(model.id));
    body.insert("messages".into(), Value::Array(wire_messages));
    body.insert("stream".into(), json!(true));
    body.insert("stream_options".into(), json!({ "include_usage": true }));

    insert_u32(&mut body, "max_tokens", model.max_output_tokens);
    insert_f64(&mut body, "temperature", model.temperature.resolve(ctx.sampling.temperature));
    insert_f64(&mut body, "top_p", model.top_p.resolve(ctx.sampling.top_p));
    insert_u32(&mut body, "top_k", model.top_k.value());
    insert_f64(&mut body, "min_p", model.min_p.value());
    insert_f64(&mut body, "presence_penalty", model.presence_penalty.value());
    insert_f64(&mut body, "frequency_penalty", model.frequency_penalty.value());
    insert_f64(&mut body, "repetition_penalty", model.repetition_penalty.value());

    if let Some(reasoning) = model.reasoning.as_ref().and_then(reasoning_object) {
        body.insert("reasoning".into(), reasoning);
    }

    if !options.tools.is_empty() {
        body.insert("tools".into(), Value::Array(chat_tools(&options.tools)));
        if let Some(tool) = required {
            body.insert(
                "tool_choice".into(),
                json!({ "type": "function", "function": { "name": tool.name } }),
            );
        }
    }

    merge_extra(&mut body, &model.extra, DEEP_MERGE_KEYS);
    Ok(diagnostics.finish(body))
}

fn reasoning_object(reasoning: &ReasoningConfig) -> Option<Value> {
    let mut object = Map::new();
    if let Some(effort) = &reasoning.effort {
        object.insert("effort".into(), json!(effort));
    }
    if let Some(max_tokens) = reasoning.max_tokens {
        object.insert("max_tokens".into(), json!(max_tokens));
    }
    if let Some(enabled) = reasoning.enabled {
        object.insert("enabled".into(), json!(enabled));
    }
    if let Some(exclude) = reasoning.exclude {
        object.insert("exclude".into(), json!(exclude));
    }
    (!object.is_empty()).then_some(Value::Object(object))
}

fn convert_message(
    message: &ChatMessage,
    model: &ModelConfig,
    ctx: &BuildContext<'_>,
    diagnostics: &mut Diagnostics,
    out: &mut Vec<Value>,
) {
    // tool results ride ahead of the message's own content
    for result in &message.tool_results {
        out.push(json!({
            "role": "tool",
            "tool_call_id": result.call_id,
            "content": result.content,
        }));
    }

    match message.role {
        Role::System => {
            if message.has_text() {
                out.push(json!({ "role": "system", "content": message.joined_text() }));
            }
        }
        Role::User => {
            let images = usable_images(message, model, diagnostics);
            if images.is_empty() {
                if message.has_text() {
                    out.push(json!({ "role": "user", "content": message.joined_text() }));
                }
                return;
            }
            let mut parts = Vec::new();
            if message.has_text() {
                parts.push(json!({ "type": "text", "text": message.joined_text() }));
            }
            parts.extend(images.iter().map(|image| {
                json!({ "type": "image_url", "image_url": { "url": data_uri(image) } })
            }));
            out.push(json!({ "role": "user", "content": parts }));
        }
        Role::Assistant => {
            if !message.images.is_empty() {
                diagnostics.warn("dropping image(s) on assistant turn");
            }
            if !message.has_text() && message.tool_calls.is_empty() {
                return;
            }

            let mut wire = Map::new();
            wire.insert("role".into(), json!("assistant"));
            wire.insert(
                "content".into(),
                if message.has_text() {
                    json!(message.joined_text())
                } else {
                    Value::Null
                },
            );
            if let Some(reasoning) = assistant_reasoning(message, ctx) {
                wire.insert("reasoning_content".into(), json!(reasoning));
            }
            if !message.tool_calls.is_empty() {
                let calls: Vec<Value> = message
                    .tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": { "name": call.name, "arguments": call.arguments },
                        })
                    })
                    .collect();
                wire.insert("tool_calls".into(), Value::Array(calls));
            }
            out.push(Value::Object(wire));
        }
        // already emitted above
        Role::Tool => {}
    }
}

/// Reasoning for an assistant turn: its own thinking, else the cached
/// reasoning of one of its tool calls.
fn assistant_reasoning(message: &ChatMessage, ctx: &BuildContext<'_>) -> Option<String> {
    let thinking = message.joined_thinking();
    if !thinking.is_empty() {
        return Some(thinking);
    }
    let cache = ctx.reasoning_cache?;
    message
        .tool_calls
        .iter()
        .find_map(|call| cache.get(&call.id))
}
