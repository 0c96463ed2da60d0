//! Core error type for llm-wire.

use crate::types::ProtocolFamily;
use thiserror::Error;

/// Errors surfaced by request building, transport and stream parsing.
///
/// Propagation rules differ per variant: decode errors are swallowed per line by
/// the stream driver, assembly and configuration errors terminate the request,
/// and transport errors are retried according to the active `RetryPolicy`.
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// Network or HTTP failure. `status` is present for non-success responses.
    #[error("{}", describe_transport(.family, .status, .message, .body))]
    TransportError {
        family: Option<ProtocolFamily>,
        status: Option<u16>,
        message: String,
        body: Option<String>,
    },

    /// A single stream line could not be decoded.
    #[error("Protocol decode error: {0}")]
    ProtocolDecodeError(String),

    /// A buffered tool call never became a valid JSON object by the end of the stream.
    #[error("Tool call {index} has invalid JSON arguments: {snippet}")]
    ToolCallAssemblyError { index: String, snippet: String },

    /// Missing or invalid configuration detected before any network call.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The caller demanded a single mandatory tool call but the tool list does not allow it.
    #[error("Invalid tool constraint: {0}")]
    InvalidToolConstraint(String),

    /// The provider reported an error inside an otherwise healthy stream.
    #[error("Provider error ({family}): {message}")]
    ProviderError {
        family: ProtocolFamily,
        message: String,
    },

    /// The host cancelled the request.
    #[error("Request cancelled")]
    Cancelled,

    /// JSON serialization failure while building a request.
    #[error("JSON error: {0}")]
    JsonError(String),
}

fn describe_transport(
    family: &Option<ProtocolFamily>,
    status: &Option<u16>,
    message: &str,
    body: &Option<String>,
) -> String {
    let mut out = String::from("Transport error");
    if let Some(family) = family {
        out.push_str(&format!(" ({family})"));
    }
    if let Some(status) = status {
        out.push_str(&format!(" status {status}"));
    }
    out.push_str(": ");
    out.push_str(message);
    if let Some(body) = body.as_deref().filter(|b| !b.trim().is_empty()) {
        out.push_str(" - ");
        out.push_str(body);
    }
    out
}

impl LlmError {
    /// Create a transport error.
    pub fn transport(
        family: Option<ProtocolFamily>,
        status: Option<u16>,
        message: impl Into<String>,
        body: Option<String>,
    ) -> Self {
        Self::TransportError {
            family,
            status,
            message: message.into(),
            body,
        }
    }

    /// HTTP status code embedded in the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::TransportError { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether this error may be retried given a set of retryable status codes.
    ///
    /// Only transport errors that carry a status code qualify.
    pub fn is_retryable_with(&self, status_codes: &[u16]) -> bool {
        self.status_code()
            .is_some_and(|code| status_codes.contains(&code))
    }

    /// Configuration-class failures are raised before any network call.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration(_) | Self::InvalidToolConstraint(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Attach the protocol family to a transport error that does not have one yet.
    pub fn with_family(self, family: ProtocolFamily) -> Self {
        match self {
            Self::TransportError {
                family: None,
                status,
                message,
                body,
            } => Self::TransportError {
                family: Some(family),
                status,
                message,
                body,
            },
            other => other,
        }
    }

    /// Single human-readable message for display in the host UI.
    pub fn user_message(&self) -> String {
        match self {
            Self::TransportError {
                family,
                status,
                message,
                body,
            } => {
                let family = family
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "provider".to_string());
                let mut out = match status {
                    Some(code) => format!("Request to {family} failed with status {code}"),
                    None => format!("Request to {family} failed: {message}"),
                };
                if let Some(detail) = body.as_deref().and_then(extract_provider_message) {
                    out.push_str(": ");
                    out.push_str(&detail);
                }
                out
            }
            Self::Cancelled => "Request was cancelled".to_string(),
            other => other.to_string(),
        }
    }
}

/// Pull the provider's own error message out of a response body when it is JSON,
/// falling back to the raw (trimmed) body text.
fn extract_provider_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let message = value
            .pointer("/error/message")
            .or_else(|| value.get("message"))
            .or_else(|| value.get("error"))
            .and_then(|v| v.as_str());
        if let Some(message) = message {
            return Some(message.to_string());
        }
    }
    Some(body.chars().take(500).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_only_with_listed_status() {
        let err = LlmError::transport(None, Some(503), "unavailable", None);
        assert!(err.is_retryable_with(&[429, 503]));
        assert!(!err.is_retryable_with(&[429]));

        let no_status = LlmError::transport(None, None, "connection refused", None);
        assert!(!no_status.is_retryable_with(&[429, 503]));
        assert!(!LlmError::Cancelled.is_retryable_with(&[429]));
    }

    #[test]
    fn user_message_includes_family_status_and_body() {
        let err = LlmError::transport(
            Some(ProtocolFamily::Anthropic),
            Some(400),
            "Bad Request",
            Some(r#"{"error":{"message":"max_tokens too large"}}"#.to_string()),
        );
        assert_eq!(
            err.user_message(),
            "Request to anthropic failed with status 400: max_tokens too large"
        );
    }

    #[test]
    fn user_message_falls_back_to_raw_body() {
        let err = LlmError::transport(
            Some(ProtocolFamily::Ollama),
            Some(502),
            "Bad Gateway",
            Some("<html>bad gateway</html>".to_string()),
        );
        assert_eq!(
            err.user_message(),
            "Request to ollama failed with status 502: <html>bad gateway</html>"
        );
    }

    #[test]
    fn with_family_fills_missing_family_only() {
        let err = LlmError::transport(None, Some(500), "boom", None)
            .with_family(ProtocolFamily::Gemini);
        assert!(matches!(
            err,
            LlmError::TransportError {
                family: Some(ProtocolFamily::Gemini),
                ..
            }
        ));

        let err = LlmError::Cancelled.with_family(ProtocolFamily::Gemini);
        assert!(err.is_cancelled());
    }

    #[test]
    fn configuration_errors_are_classified() {
        assert!(LlmError::InvalidConfiguration("x".into()).is_configuration_error());
        assert!(LlmError::InvalidToolConstraint("x".into()).is_configuration_error());
        assert!(!LlmError::ProtocolDecodeError("x".into()).is_configuration_error());
    }
}
