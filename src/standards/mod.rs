//! API Standards Layer
//!
//! One request builder and one stream converter per wire format. Builders turn
//! canonical messages plus a `ModelConfig` into a JSON body; converters turn
//! provider frames into canonical events.
//!
//! ## Available Standards
//!
//! - `openai`: chat/completions and responses
//! - `anthropic`: messages
//! - `gemini`: generate-content
//! - `ollama`: native `/api/chat`

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Value};

use crate::error::LlmError;
use crate::reasoning_cache::ReasoningCache;
use crate::types::{
    ChatMessage, ImagePart, ModelConfig, ProtocolFamily, RequestOptions, ToolDefinition,
    validate_messages,
};

/// Fallbacks for sampling fields left unset in the model configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SamplingDefaults {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
}

/// Shared inputs a builder may consult besides the conversation itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildContext<'a> {
    pub reasoning_cache: Option<&'a ReasoningCache>,
    pub sampling: SamplingDefaults,
}

impl<'a> BuildContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reasoning_cache(mut self, cache: &'a ReasoningCache) -> Self {
        self.reasoning_cache = Some(cache);
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingDefaults) -> Self {
        self.sampling = sampling;
        self
    }
}

/// A request body plus diagnostics for every item that had to be dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltRequest {
    pub body: Value,
    pub warnings: Vec<String>,
}

/// Signature shared by every request builder.
pub type BuildFn = fn(
    &[ChatMessage],
    &ModelConfig,
    &RequestOptions,
    &BuildContext<'_>,
) -> Result<BuiltRequest, LlmError>;

/// Collects dropped-item diagnostics for one build.
#[derive(Debug)]
pub(crate) struct Diagnostics {
    family: ProtocolFamily,
    warnings: Vec<String>,
}

impl Diagnostics {
    pub(crate) fn new(family: ProtocolFamily) -> Self {
        Self {
            family,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(family = %self.family, "{}", message);
        self.warnings.push(message);
    }

    pub(crate) fn finish(self, body: Map<String, Value>) -> BuiltRequest {
        BuiltRequest {
            body: Value::Object(body),
            warnings: self.warnings,
        }
    }
}

/// Validate the conversation and the tool constraint before building.
pub(crate) fn preflight<'o>(
    messages: &[ChatMessage],
    options: &'o RequestOptions,
) -> Result<Option<&'o ToolDefinition>, LlmError> {
    validate_messages(messages)?;
    options.required_tool()
}

/// Images the model may receive; the rest are dropped with a diagnostic.
pub(crate) fn usable_images<'m>(
    message: &'m ChatMessage,
    model: &ModelConfig,
    diagnostics: &mut Diagnostics,
) -> &'m [ImagePart] {
    if message.images.is_empty() || model.vision {
        return &message.images;
    }
    diagnostics.warn(format!(
        "dropping {} image(s): model '{}' does not accept image input",
        message.images.len(),
        model.id
    ));
    &[]
}

pub fn base64_data(image: &ImagePart) -> String {
    BASE64.encode(&image.data)
}

pub fn data_uri(image: &ImagePart) -> String {
    format!("data:{};base64,{}", image.mime_type, base64_data(image))
}

/// Parse stored tool-call arguments back into a JSON object.
pub(crate) fn arguments_object(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        _ if raw.trim().is_empty() => Value::Object(Map::new()),
        _ => {
            tracing::debug!(arguments = raw, "tool call arguments are not an object");
            Value::Object(Map::new())
        }
    }
}

pub(crate) fn insert_f64(body: &mut Map<String, Value>, key: &str, value: Option<f64>) {
    if let Some(value) = value {
        body.insert(key.to_string(), Value::from(value));
    }
}

pub(crate) fn insert_u32(body: &mut Map<String, Value>, key: &str, value: Option<u32>) {
    if let Some(value) = value {
        body.insert(key.to_string(), Value::from(value));
    }
}

/// Recursively merge `patch` into `target`; non-object values overwrite.
pub fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Merge model `extra` params last: shallow overwrite, except `deep_keys`.
pub fn merge_extra(body: &mut Map<String, Value>, extra: &Map<String, Value>, deep_keys: &[&str]) {
    for (key, value) in extra {
        if deep_keys.contains(&key.as_str())
            && let Some(existing) = body.get_mut(key)
        {
            deep_merge(existing, value);
            continue;
        }
        body.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extra_overwrites_shallow_keys_and_augments_deep_ones() {
        let mut body = json!({
            "temperature": 0.2,
            "reasoning": {"effort": "high", "exclude": false}
        })
        .as_object()
        .cloned()
        .unwrap();
        let extra = json!({
            "temperature": 0.9,
            "reasoning": {"exclude": true},
            "seed": 7
        })
        .as_object()
        .cloned()
        .unwrap();

        merge_extra(&mut body, &extra, &["reasoning"]);
        assert_eq!(
            Value::Object(body),
            json!({
                "temperature": 0.9,
                "reasoning": {"effort": "high", "exclude": true},
                "seed": 7
            })
        );
    }

    #[test]
    fn non_deep_object_keys_are_replaced() {
        let mut body = json!({"metadata": {"a": 1}}).as_object().cloned().unwrap();
        let extra = json!({"metadata": {"b": 2}}).as_object().cloned().unwrap();
        merge_extra(&mut body, &extra, &[]);
        assert_eq!(body["metadata"], json!({"b": 2}));
    }

    #[test]
    fn data_uri_encodes_bytes() {
        let image = ImagePart {
            mime_type: "image/png".into(),
            data: vec![1, 2, 3],
        };
        assert_eq!(data_uri(&image), "data:image/png;base64,AQID");
    }

    #[test]
    fn invalid_arguments_become_empty_object() {
        assert_eq!(arguments_object("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(arguments_object(""), json!({}));
        assert_eq!(arguments_object("[1]"), json!({}));
    }
}
