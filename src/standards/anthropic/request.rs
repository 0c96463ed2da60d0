//! Anthropic Messages request builder
//!
//! System text is lifted into the top-level `system` field. The remaining turns
//! must alternate, so consecutive turns with the same wire role are merged.
//! Tool results may only ride on user turns.

use serde_json::{Map, Value, json};

use super::DEFAULT_MAX_TOKENS;
use crate::error::LlmError;
use crate::standards::{
    BuildContext, BuiltRequest, Diagnostics, arguments_object, base64_data, insert_f64,
    merge_extra, preflight, usable_images,
};
use crate::types::{ChatMessage, ModelConfig, ProtocolFamily, ReasoningConfig, RequestOptions, Role};

const DEEP_MERGE_KEYS: &[&str] = &["thinking", "metadata"];

/// Default thinking budget when reasoning is enabled without an explicit size.
const DEFAULT_THINKING_BUDGET: u32 = 1024;

pub fn build_messages_request(
    messages: &[ChatMessage],
    model: &ModelConfig,
    options: &RequestOptions,
    ctx: &BuildContext<'_>,
) -> Result<BuiltRequest, LlmError> {
    let required = preflight(messages, options)?;
    let mut diagnostics = Diagnostics::new(ProtocolFamily::Anthropic);

    let mut system = Vec::new();
    let mut turns: Vec<(&'static str, Vec<Value>)> = Vec::new();
    for message in messages {
        if message.role == Role::System {
            if !message.tool_results.is_empty() {
                diagnostics.warn(format!(
                    "dropping {} tool result(s) attached to a system turn",
                    message.tool_results.len()
                ));
            }
            if message.has_text() {
                system.push(message.joined_text());
            }
            continue;
        }

        let (role, blocks) = convert_turn(message, model, &mut diagnostics);
        if blocks.is_empty() {
            continue;
        }
        match turns.last_mut() {
            Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
            _ => turns.push((role, blocks)),
        }
    }

    let wire_messages: Vec<Value> = turns
        .into_iter()
        .map(|(role, content)| json!({ "role": role, "content": content }))
        .collect();

    let mut body = Map::new();
    body.insert("model".into(), json!(model.id));
    if !system.is_empty() {
        body.insert("system".into(), json!(system.join("\n\n")));
    }
    body.insert("messages".into(), Value::Array(wire_messages));
    body.insert(
        "max_tokens".into(),
        json!(model.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
    );
    body.insert("stream".into(), json!(true));

    insert_f64(&mut body, "temperature", model.temperature.resolve(ctx.sampling.temperature));
    insert_f64(&mut body, "top_p", model.top_p.resolve(ctx.sampling.top_p));
    if let Some(top_k) = model.top_k.value() {
        body.insert("top_k".into(), json!(top_k));
    }

    if let Some(thinking) = model.reasoning.as_ref().and_then(thinking_object) {
        body.insert("thinking".into(), thinking);
    }

    if !options.tools.is_empty() {
        let tools: Vec<Value> = options
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.parameters(),
                })
            })
            .collect();
        body.insert("tools".into(), Value::Array(tools));
        let choice = match required {
            Some(tool) => json!({ "type": "tool", "name": tool.name }),
            None => json!({ "type": "auto" }),
        };
        body.insert("tool_choice".into(), choice);
    }

    merge_extra(&mut body, &model.extra, DEEP_MERGE_KEYS);
    Ok(diagnostics.finish(body))
}

fn thinking_object(reasoning: &ReasoningConfig) -> Option<Value> {
    if reasoning.enabled == Some(false) {
        return None;
    }
    if reasoning.max_tokens.is_none() && reasoning.enabled != Some(true) {
        return None;
    }
    Some(json!({
        "type": "enabled",
        "budget_tokens": reasoning.max_tokens.unwrap_or(DEFAULT_THINKING_BUDGET),
    }))
}

/// Wire role and content blocks of one non-system turn.
fn convert_turn(
    message: &ChatMessage,
    model: &ModelConfig,
    diagnostics: &mut Diagnostics,
) -> (&'static str, Vec<Value>) {
    let mut blocks = Vec::new();
    let role = match message.role {
        Role::Assistant => "assistant",
        _ => "user",
    };

    if role == "user" {
        for result in &message.tool_results {
            blocks.push(json!({
                "type": "tool_result",
                "tool_use_id": result.call_id,
                "content": result.content,
            }));
        }
    } else if !message.tool_results.is_empty() {
        diagnostics.warn(format!(
            "dropping {} tool result(s) attached to an assistant turn",
            message.tool_results.len()
        ));
    }

    // thinking blocks in history must carry the provider's signature, which
    // canonical messages do not keep
    let thinking = message.thinking.iter().filter(|t| !t.is_empty()).count();
    if role == "assistant" && thinking > 0 {
        diagnostics.warn(format!(
            "dropping {thinking} unsigned thinking segment(s) from an assistant turn"
        ));
    }
    if message.has_text() {
        blocks.push(json!({ "type": "text", "text": message.joined_text() }));
    }
    for image in usable_images(message, model, diagnostics) {
        blocks.push(json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": image.mime_type,
                "data": base64_data(image),
            }
        }));
    }
    for call in &message.tool_calls {
        blocks.push(json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.name,
            "input": arguments_object(&call.arguments),
        }));
    }
    (role, blocks)
}
