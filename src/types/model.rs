//! Per-model configuration

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Supported provider wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolFamily {
    /// OpenAI-style `chat/completions` streaming.
    #[default]
    OpenAiChat,
    /// OpenAI "responses" event stream.
    OpenAiResponses,
    /// Anthropic-style message blocks.
    Anthropic,
    /// Google-style generate-content.
    Gemini,
    /// Ollama native JSON-lines protocol.
    Ollama,
}

impl ProtocolFamily {
    pub const ALL: [ProtocolFamily; 5] = [
        Self::OpenAiChat,
        Self::OpenAiResponses,
        Self::Anthropic,
        Self::Gemini,
        Self::Ollama,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAiChat => "openai-chat",
            Self::OpenAiResponses => "openai-responses",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
        }
    }
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state sampling value.
///
/// A field missing from the settings is `Unset` (fall back to a default, if any);
/// an explicit JSON `null` is `Null` (omit the field from the request entirely).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sampling<T> {
    Unset,
    Null,
    Value(T),
}

impl<T> Default for Sampling<T> {
    fn default() -> Self {
        Self::Unset
    }
}

impl<T: Copy> Sampling<T> {
    /// Resolve against a fallback used only when the value is `Unset`.
    pub fn resolve(&self, default: Option<T>) -> Option<T> {
        match self {
            Self::Unset => default,
            Self::Null => None,
            Self::Value(v) => Some(*v),
        }
    }

    /// The explicit value, ignoring any default.
    pub fn value(&self) -> Option<T> {
        self.resolve(None)
    }
}

impl<T> Sampling<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

impl<T> From<T> for Sampling<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Sampling<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Only reached when the key is present; absent keys use `Default`.
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Self::Value(v),
            None => Self::Null,
        })
    }
}

impl<T: Serialize> Serialize for Sampling<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Value(v) => v.serialize(serializer),
            Self::Unset | Self::Null => serializer.serialize_none(),
        }
    }
}

/// Reasoning/thinking knobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<bool>,
}

/// Settings for one model, loaded once per request and read-only afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Model id sent to the provider.
    pub id: String,
    /// Disambiguates several configurations of the same model id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
    #[serde(default)]
    pub family: ProtocolFamily,
    #[serde(default)]
    pub base_url: String,
    /// Credential key looked up first; defaults to the family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Sampling::is_unset")]
    pub temperature: Sampling<f64>,
    #[serde(default, skip_serializing_if = "Sampling::is_unset")]
    pub top_p: Sampling<f64>,
    #[serde(default, skip_serializing_if = "Sampling::is_unset")]
    pub top_k: Sampling<u32>,
    #[serde(default, skip_serializing_if = "Sampling::is_unset")]
    pub min_p: Sampling<f64>,
    #[serde(default, skip_serializing_if = "Sampling::is_unset")]
    pub presence_penalty: Sampling<f64>,
    #[serde(default, skip_serializing_if = "Sampling::is_unset")]
    pub frequency_penalty: Sampling<f64>,
    #[serde(default, skip_serializing_if = "Sampling::is_unset")]
    pub repetition_penalty: Sampling<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningConfig>,
    /// Whether the model accepts image input.
    #[serde(default)]
    pub vision: bool,
    /// Merged verbatim into the request body after everything else.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// Extra HTTP headers; these win over computed headers.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Per-model inter-request delay, overriding the adapter-wide setting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
}

impl ModelConfig {
    pub fn new(
        id: impl Into<String>,
        family: ProtocolFamily,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            family,
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_config_id(mut self, config_id: impl Into<String>) -> Self {
        self.config_id = Some(config_id.into());
        self
    }

    pub fn with_credential_ref(mut self, credential_ref: impl Into<String>) -> Self {
        self.credential_ref = Some(credential_ref.into());
        self
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    pub fn with_temperature(mut self, temperature: impl Into<Sampling<f64>>) -> Self {
        self.temperature = temperature.into();
        self
    }

    pub fn with_top_p(mut self, top_p: impl Into<Sampling<f64>>) -> Self {
        self.top_p = top_p.into();
        self
    }

    pub fn with_reasoning(mut self, reasoning: ReasoningConfig) -> Self {
        self.reasoning = Some(reasoning);
        self
    }

    pub fn with_vision(mut self, vision: bool) -> Self {
        self.vision = vision;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_request_delay_ms(mut self, delay_ms: u64) -> Self {
        self.request_delay_ms = Some(delay_ms);
        self
    }

    /// Credential key for the provider-specific lookup.
    pub fn credential_key(&self) -> &str {
        self.credential_ref
            .as_deref()
            .filter(|k| !k.is_empty())
            .unwrap_or(self.family.as_str())
    }
}

/// Exact `id` + `config_id` match.
pub fn find_model_config_exact<'a>(
    configs: &'a [ModelConfig],
    id: &str,
    config_id: Option<&str>,
) -> Option<&'a ModelConfig> {
    configs
        .iter()
        .find(|c| c.id == id && c.config_id.as_deref() == config_id)
}

/// First configuration with a matching `id`, regardless of `config_id`.
pub fn find_model_config_by_id<'a>(configs: &'a [ModelConfig], id: &str) -> Option<&'a ModelConfig> {
    configs.iter().find(|c| c.id == id)
}

/// Two-tier lookup: exact `id` + `config_id`, else the first `id`-only match.
pub fn find_model_config<'a>(
    configs: &'a [ModelConfig],
    id: &str,
    config_id: Option<&str>,
) -> Option<&'a ModelConfig> {
    find_model_config_exact(configs, id, config_id).or_else(|| find_model_config_by_id(configs, id))
}
