//! HTTP request assembly
//!
//! URL joining, per-family header construction and a single send attempt.
//! Retries wrap `send_once`; once a successful response is returned the body is
//! streamed and never retried.

use std::collections::HashMap;

use bytes::Bytes;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};

use super::{CredentialScheme, ProtocolAdapter};
use crate::error::LlmError;
use crate::streaming::Framing;
use crate::types::{ModelConfig, ProtocolFamily};

/// Join the model's base URL with the family's path suffix.
pub fn endpoint_url(adapter: &ProtocolAdapter, model: &ModelConfig) -> Result<String, LlmError> {
    let base = model.base_url.trim().trim_end_matches('/');
    if base.is_empty() {
        return Err(LlmError::InvalidConfiguration(format!(
            "model '{}' has no base URL",
            model.id
        )));
    }
    let url = format!("{base}{}", (adapter.path)(model));
    reqwest::Url::parse(&url).map_err(|e| {
        LlmError::InvalidConfiguration(format!("invalid base URL '{}': {e}", model.base_url))
    })?;
    Ok(url)
}

/// Builder for outgoing request headers.
#[derive(Debug, Default)]
pub struct HeaderBuilder {
    headers: HeaderMap,
}

impl HeaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json_content_type(mut self) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self
    }

    pub fn with_accept(mut self, framing: Framing) -> Self {
        let accept = match framing {
            Framing::Sse => "text/event-stream",
            Framing::JsonLines => "application/x-ndjson",
        };
        self.headers.insert(ACCEPT, HeaderValue::from_static(accept));
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Result<Self, LlmError> {
        let value = HeaderValue::from_str(user_agent)
            .map_err(|e| LlmError::InvalidConfiguration(format!("Invalid user agent: {e}")))?;
        self.headers.insert(USER_AGENT, value);
        Ok(self)
    }

    pub fn with_bearer_auth(mut self, token: &SecretString) -> Result<Self, LlmError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|e| LlmError::InvalidConfiguration(format!("Invalid API key format: {e}")))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    pub fn with_api_key_header(mut self, name: &'static str, key: &SecretString) -> Result<Self, LlmError> {
        let mut value = HeaderValue::from_str(key.expose_secret())
            .map_err(|e| LlmError::InvalidConfiguration(format!("Invalid API key format: {e}")))?;
        value.set_sensitive(true);
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(self)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, LlmError> {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            LlmError::InvalidConfiguration(format!("Invalid header name '{name}': {e}"))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            LlmError::InvalidConfiguration(format!("Invalid header value for '{name}': {e}"))
        })?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Custom headers replace computed ones on collision.
    pub fn with_custom_headers(mut self, custom: &HashMap<String, String>) -> Result<Self, LlmError> {
        for (name, value) in custom {
            self = self.with_header(name, value)?;
        }
        Ok(self)
    }

    pub fn build(self) -> HeaderMap {
        self.headers
    }
}

/// Headers for one request: JSON content type, client id, credential and the
/// model's custom headers.
pub fn build_headers(
    adapter: &ProtocolAdapter,
    model: &ModelConfig,
    credential: Option<&SecretString>,
    user_agent: &str,
) -> Result<HeaderMap, LlmError> {
    let mut builder = HeaderBuilder::new()
        .with_json_content_type()
        .with_accept(adapter.framing)
        .with_user_agent(user_agent)?;

    builder = match (adapter.credential, credential) {
        (CredentialScheme::Bearer | CredentialScheme::OptionalBearer, Some(key)) => {
            builder.with_bearer_auth(key)?
        }
        (CredentialScheme::ApiKeyHeader(name), Some(key)) => builder.with_api_key_header(name, key)?,
        (CredentialScheme::OptionalBearer, None) => builder,
        (_, None) => {
            return Err(LlmError::InvalidConfiguration(format!(
                "missing credential for {} model '{}'",
                adapter.family, model.id
            )));
        }
    };

    for (name, value) in adapter.static_headers {
        builder = builder.with_header(name, value)?;
    }
    Ok(builder.with_custom_headers(&model.headers)?.build())
}

/// One POST attempt. Non-success statuses become `TransportError` carrying the
/// status and the response body.
pub async fn send_once(
    client: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
    body: Bytes,
    family: ProtocolFamily,
) -> Result<reqwest::Response, LlmError> {
    let response = client
        .post(url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| LlmError::from(e).with_family(family))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.ok();
    Err(LlmError::transport(
        Some(family),
        Some(status.as_u16()),
        status.canonical_reason().unwrap_or("request failed"),
        body,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::adapter_for;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[test]
    fn url_joins_without_double_slash() {
        let model = ModelConfig::new("gpt", ProtocolFamily::OpenAiChat, "https://api.example.com/v1/");
        let url = endpoint_url(adapter_for(ProtocolFamily::OpenAiChat), &model).unwrap();
        assert_eq!(url, "https://api.example.com/v1/chat/completions");

        let model = ModelConfig::new("models/gemini-x", ProtocolFamily::Gemini, "https://g.example.com/v1beta");
        let url = endpoint_url(adapter_for(ProtocolFamily::Gemini), &model).unwrap();
        assert_eq!(url, "https://g.example.com/v1beta/models/gemini-x:streamGenerateContent?alt=sse");
    }

    #[test]
    fn missing_or_bad_base_url_is_configuration_error() {
        let adapter = adapter_for(ProtocolFamily::Ollama);
        let empty = ModelConfig::new("llama", ProtocolFamily::Ollama, "  ");
        assert!(matches!(endpoint_url(adapter, &empty), Err(LlmError::InvalidConfiguration(_))));

        let relative = ModelConfig::new("llama", ProtocolFamily::Ollama, "localhost-no-scheme");
        assert!(matches!(endpoint_url(adapter, &relative), Err(LlmError::InvalidConfiguration(_))));
    }

    #[test]
    fn anthropic_uses_key_header_and_version() {
        let adapter = adapter_for(ProtocolFamily::Anthropic);
        let model = ModelConfig::new("claude", ProtocolFamily::Anthropic, "https://a.example.com/v1");
        let headers = build_headers(adapter, &model, Some(&secret("sk-ant")), "llm-wire/test").unwrap();
        assert_eq!(headers["x-api-key"], "sk-ant");
        assert_eq!(headers["anthropic-version"], "2023-06-01");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[USER_AGENT], "llm-wire/test");
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn custom_headers_win() {
        let adapter = adapter_for(ProtocolFamily::OpenAiChat);
        let model = ModelConfig::new("gpt", ProtocolFamily::OpenAiChat, "https://x")
            .with_header("Authorization", "Bearer override")
            .with_header("X-Trace", "1");
        let headers = build_headers(adapter, &model, Some(&secret("sk-1")), "ua").unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer override");
        assert_eq!(headers["x-trace"], "1");
    }

    #[test]
    fn ollama_without_credential_has_no_authorization() {
        let adapter = adapter_for(ProtocolFamily::Ollama);
        let model = ModelConfig::new("llama", ProtocolFamily::Ollama, "http://localhost:11434");
        let headers = build_headers(adapter, &model, None, "ua").unwrap();
        assert!(headers.get(AUTHORIZATION).is_none());
        assert_eq!(headers[ACCEPT], "application/x-ndjson");

        let gemini = adapter_for(ProtocolFamily::Gemini);
        assert!(build_headers(gemini, &model, None, "ua").is_err());
    }
}
