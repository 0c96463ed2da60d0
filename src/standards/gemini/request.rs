//! Gemini generate-content request builder
//!
//! Function responses are addressed by function name, not call id, so the name
//! is recovered from the assistant turn that issued the call.

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::error::LlmError;
use crate::standards::{
    BuildContext, BuiltRequest, Diagnostics, arguments_object, base64_data, insert_f64,
    insert_u32, merge_extra, preflight, usable_images,
};
use crate::types::{ChatMessage, ModelConfig, ProtocolFamily, ReasoningConfig, RequestOptions, Role};

const DEEP_MERGE_KEYS: &[&str] = &["generationConfig"];

pub fn build_generate_content_request(
    messages: &[ChatMessage],
    model: &ModelConfig,
    options: &RequestOptions,
    ctx: &BuildContext<'_>,
) -> Result<BuiltRequest, LlmError> {
    let required = preflight(messages, options)?;
    let mut diagnostics = Diagnostics::new(ProtocolFamily::Gemini);

    let call_names: HashMap<&str, &str> = messages
        .iter()
        .flat_map(|m| m.tool_calls.iter())
        .map(|call| (call.id.as_str(), call.name.as_str()))
        .collect();

    let mut system_parts = Vec::new();
    let mut contents: Vec<Value> = Vec::new();
    for message in messages {
        if message.role == Role::System {
            if message.has_text() {
                system_parts.push(json!({ "text": message.joined_text() }));
            }
            if !message.tool_results.is_empty() {
                diagnostics.warn("dropping tool result(s) attached to a system turn");
            }
            continue;
        }

        let role = if message.role == Role::Assistant { "model" } else { "user" };
        let parts = convert_parts(message, model, &call_names, &mut diagnostics);
        if parts.is_empty() {
            continue;
        }
        // consecutive same-role turns share one content entry
        if let Some(last) = contents.last_mut()
            && last["role"] == role
            && let Some(existing) = last["parts"].as_array_mut()
        {
            existing.extend(parts);
            continue;
        }
        contents.push(json!({ "role": role, "parts": parts }));
    }

    let mut body = Map::new();
    body.insert("contents".into(), Value::Array(contents));
    if !system_parts.is_empty() {
        body.insert("systemInstruction".into(), json!({ "parts": system_parts }));
    }

    let mut generation = Map::new();
    insert_f64(&mut generation, "temperature", model.temperature.resolve(ctx.sampling.temperature));
    insert_f64(&mut generation, "topP", model.top_p.resolve(ctx.sampling.top_p));
    insert_u32(&mut generation, "topK", model.top_k.value());
    insert_u32(&mut generation, "maxOutputTokens", model.max_output_tokens);
    insert_f64(&mut generation, "presencePenalty", model.presence_penalty.value());
    insert_f64(&mut generation, "frequencyPenalty", model.frequency_penalty.value());
    if let Some(thinking) = model.reasoning.as_ref().and_then(thinking_config) {
        generation.insert("thinkingConfig".into(), thinking);
    }
    if !generation.is_empty() {
        body.insert("generationConfig".into(), Value::Object(generation));
    }

    if !options.tools.is_empty() {
        let declarations: Vec<Value> = options
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters(),
                })
            })
            .collect();
        body.insert("tools".into(), json!([{ "functionDeclarations": declarations }]));
        if let Some(tool) = required {
            body.insert(
                "toolConfig".into(),
                json!({
                    "functionCallingConfig": {
                        "mode": "ANY",
                        "allowedFunctionNames": [tool.name],
                    }
                }),
            );
        }
    }

    merge_extra(&mut body, &model.extra, DEEP_MERGE_KEYS);
    Ok(diagnostics.finish(body))
}

fn thinking_config(reasoning: &ReasoningConfig) -> Option<Value> {
    let mut config = Map::new();
    match (reasoning.enabled, reasoning.max_tokens) {
        (Some(false), _) => {
            config.insert("thinkingBudget".into(), json!(0));
        }
        (_, Some(budget)) => {
            config.insert("thinkingBudget".into(), json!(budget));
        }
        _ => {}
    }
    if reasoning.enabled != Some(false) && reasoning.exclude != Some(true) {
        config.insert("includeThoughts".into(), json!(true));
    }
    (!config.is_empty()).then_some(Value::Object(config))
}

fn convert_parts(
    message: &ChatMessage,
    model: &ModelConfig,
    call_names: &HashMap<&str, &str>,
    diagnostics: &mut Diagnostics,
) -> Vec<Value> {
    let mut parts = Vec::new();

    for result in &message.tool_results {
        match call_names.get(result.call_id.as_str()) {
            Some(name) => parts.push(json!({
                "functionResponse": {
                    "name": name,
                    "response": { "content": result.content },
                }
            })),
            None => diagnostics.warn(format!(
                "dropping tool result for unknown call id '{}'",
                result.call_id
            )),
        }
    }

    if message.role == Role::Assistant {
        for thinking in message.thinking.iter().filter(|t| !t.is_empty()) {
            parts.push(json!({ "text": thinking, "thought": true }));
        }
    }
    if message.has_text() {
        parts.push(json!({ "text": message.joined_text() }));
    }
    for image in usable_images(message, model, diagnostics) {
        parts.push(json!({
            "inlineData": { "mimeType": image.mime_type, "data": base64_data(image) }
        }));
    }
    for call in &message.tool_calls {
        parts.push(json!({
            "functionCall": { "name": call.name, "args": arguments_object(&call.arguments) }
        }));
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ToolDefinition, ToolMode};

    fn model() -> ModelConfig {
        ModelConfig::new(
            "gemini-test",
            ProtocolFamily::Gemini,
            "https://generativelanguage.googleapis.com/v1beta",
        )
    }

    #[test]
    fn roles_and_system_instruction() {
        let messages = vec![
            ChatMessage::system("Be kind."),
            ChatMessage::user("Hi"),
            ChatMessage::assistant("Hello!"),
        ];
        let body = build_generate_content_request(&messages, &model(), &RequestOptions::new(), &BuildContext::new())
            .unwrap()
            .body;
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be kind.");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn function_response_recovers_name_from_call() {
        let messages = vec![
            ChatMessage::user("time?"),
            ChatMessage::new(Role::Assistant).with_tool_call("c1", "clock", "{\"tz\":\"UTC\"}"),
            ChatMessage::tool_result("c1", "12:00"),
            ChatMessage::tool_result("missing", "??"),
        ];
        let built = build_generate_content_request(&messages, &model(), &RequestOptions::new(), &BuildContext::new())
            .unwrap();
        let contents = built.body["contents"].as_array().unwrap();
        assert_eq!(contents[1]["parts"][0]["functionCall"]["args"], json!({"tz": "UTC"}));
        assert_eq!(contents[2]["parts"][0]["functionResponse"]["name"], "clock");
        assert_eq!(contents[2]["parts"].as_array().unwrap().len(), 1);
        assert_eq!(built.warnings.len(), 1);
    }

    #[test]
    fn generation_config_deep_merges_extra() {
        let model = model()
            .with_temperature(0.3)
            .with_max_output_tokens(256)
            .with_extra("generationConfig", json!({"candidateCount": 1}));
        let body = build_generate_content_request(&[ChatMessage::user("x")], &model, &RequestOptions::new(), &BuildContext::new())
            .unwrap()
            .body;
        assert_eq!(
            body["generationConfig"],
            json!({"temperature": 0.3, "maxOutputTokens": 256, "candidateCount": 1})
        );
    }

    #[test]
    fn required_tool_uses_any_mode() {
        let options = RequestOptions::new()
            .with_tools(vec![ToolDefinition::new("clock", "time")])
            .with_tool_mode(ToolMode::Required);
        let body = build_generate_content_request(&[ChatMessage::user("x")], &model(), &options, &BuildContext::new())
            .unwrap()
            .body;
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "clock");
        assert_eq!(body["toolConfig"]["functionCallingConfig"]["mode"], "ANY");
    }

    #[test]
    fn reasoning_maps_to_thinking_config() {
        let model = model().with_reasoning(ReasoningConfig {
            max_tokens: Some(512),
            ..Default::default()
        });
        let body = build_generate_content_request(&[ChatMessage::user("x")], &model, &RequestOptions::new(), &BuildContext::new())
            .unwrap()
            .body;
        assert_eq!(
            body["generationConfig"]["thinkingConfig"],
            json!({"thinkingBudget": 512, "includeThoughts": true})
        );
    }
}
