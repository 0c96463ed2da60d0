//! Ollama `/api/chat` request builder

use serde_json::{Map, Value, json};

use crate::error::LlmError;
use crate::standards::openai::chat_tools;
use crate::standards::{
    BuildContext, BuiltRequest, Diagnostics, arguments_object, base64_data, insert_f64,
    insert_u32, merge_extra, preflight, usable_images,
};
use crate::types::{ChatMessage, ModelConfig, ProtocolFamily, ReasoningConfig, RequestOptions, Role};

const DEEP_MERGE_KEYS: &[&str] = &["options"];

pub fn build_ollama_chat_request(
    messages: &[ChatMessage],
    model: &ModelConfig,
    options: &RequestOptions,
    ctx: &BuildContext<'_>,
) -> Result<BuiltRequest, LlmError> {
    // Ollama has no tool-choice field, but the constraint is still validated
    preflight(messages, options)?;
    let mut diagnostics = Diagnostics::new(ProtocolFamily::Ollama);

    let mut wire_messages = Vec::with_capacity(messages.len());
    for message in messages {
        convert_message(message, model, &mut diagnostics, &mut wire_messages);
    }

    let mut body = Map::new();
    body.insert("model".into(), json!(model.id));
    body.insert("messages".into(), Value::Array(wire_messages));
    body.insert("stream".into(), json!(true));

    let mut runtime = Map::new();
    insert_f64(&mut runtime, "temperature", model.temperature.resolve(ctx.sampling.temperature));
    insert_f64(&mut runtime, "top_p", model.top_p.resolve(ctx.sampling.top_p));
    insert_u32(&mut runtime, "top_k", model.top_k.value());
    insert_f64(&mut runtime, "min_p", model.min_p.value());
    insert_f64(&mut runtime, "presence_penalty", model.presence_penalty.value());
    insert_f64(&mut runtime, "frequency_penalty", model.frequency_penalty.value());
    insert_f64(&mut runtime, "repeat_penalty", model.repetition_penalty.value());
    insert_u32(&mut runtime, "num_predict", model.max_output_tokens);
    insert_u32(&mut runtime, "num_ctx", model.context_length);
    if !runtime.is_empty() {
        body.insert("options".into(), Value::Object(runtime));
    }

    if let Some(think) = model.reasoning.as_ref().and_then(think_value) {
        body.insert("think".into(), think);
    }

    if !options.tools.is_empty() {
        body.insert("tools".into(), Value::Array(chat_tools(&options.tools)));
    }

    merge_extra(&mut body, &model.extra, DEEP_MERGE_KEYS);
    Ok(diagnostics.finish(body))
}

/// `think` is an effort level when one is configured, else a plain flag.
fn think_value(reasoning: &ReasoningConfig) -> Option<Value> {
    if reasoning.enabled == Some(false) {
        return Some(json!(false));
    }
    match &reasoning.effort {
        Some(effort) => Some(json!(effort)),
        None => reasoning.enabled.map(Value::Bool),
    }
}

fn convert_message(
    message: &ChatMessage,
    model: &ModelConfig,
    diagnostics: &mut Diagnostics,
    out: &mut Vec<Value>,
) {
    for result in &message.tool_results {
        out.push(json!({
            "role": "tool",
            "content": result.content,
            "tool_call_id": result.call_id,
        }));
    }
    if message.role == Role::Tool {
        return;
    }

    let images: Vec<String> = usable_images(message, model, diagnostics)
        .iter()
        .map(base64_data)
        .collect();
    let thinking = message.joined_thinking();
    if !message.has_text() && images.is_empty() && message.tool_calls.is_empty() && thinking.is_empty() {
        return;
    }

    let mut wire = Map::new();
    wire.insert("role".into(), json!(message.role.to_string()));
    wire.insert("content".into(), json!(message.joined_text()));
    if !images.is_empty() {
        wire.insert("images".into(), json!(images));
    }
    if message.role == Role::Assistant && !thinking.is_empty() {
        wire.insert("thinking".into(), json!(thinking));
    }
    if !message.tool_calls.is_empty() {
        let calls: Vec<Value> = message
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "function": {
                        "name": call.name,
                        "arguments": arguments_object(&call.arguments),
                    }
                })
            })
            .collect();
        wire.insert("tool_calls".into(), Value::Array(calls));
    }
    out.push(Value::Object(wire));
}
