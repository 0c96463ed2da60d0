//! Canonical message model

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// Inline image payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePart {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A tool call previously made by the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallPart {
    pub id: String,
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
}

/// Result of executing a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultPart {
    pub call_id: String,
    pub content: String,
}

/// One conversation turn in canonical form.
///
/// Built fresh from host history for every request and treated as immutable
/// afterwards. A `Tool` message carries exactly one tool result and nothing else;
/// see [`ChatMessage::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub text: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImagePart>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallPart>,
    #[serde(default)]
    pub tool_results: Vec<ToolResultPart>,
    #[serde(default)]
    pub thinking: Vec<String>,
}

impl ChatMessage {
    /// Empty message for the given role.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            text: Vec::new(),
            images: Vec::new(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            thinking: Vec::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System).with_text(text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User).with_text(text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant).with_text(text)
    }

    /// Tool-role message carrying a single result.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::Tool).with_tool_result(call_id, content)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text.push(text.into());
        self
    }

    pub fn with_image(mut self, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.images.push(ImagePart {
            mime_type: mime_type.into(),
            data,
        });
        self
    }

    pub fn with_tool_call(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        self.tool_calls.push(ToolCallPart {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        });
        self
    }

    pub fn with_tool_result(
        mut self,
        call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        self.tool_results.push(ToolResultPart {
            call_id: call_id.into(),
            content: content.into(),
        });
        self
    }

    pub fn with_thinking(mut self, thinking: impl Into<String>) -> Self {
        self.thinking.push(thinking.into());
        self
    }

    /// Text segments concatenated in order.
    pub fn joined_text(&self) -> String {
        self.text.concat()
    }

    /// Thinking segments concatenated in order.
    pub fn joined_thinking(&self) -> String {
        self.thinking.concat()
    }

    /// True when the message has at least one non-empty text segment.
    pub fn has_text(&self) -> bool {
        self.text.iter().any(|t| !t.is_empty())
    }

    /// Enforce the tool-role invariant.
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.role != Role::Tool {
            return Ok(());
        }
        let extra_content = self.has_text()
            || !self.images.is_empty()
            || !self.tool_calls.is_empty()
            || !self.thinking.is_empty();
        if self.tool_results.len() != 1 || extra_content {
            return Err(LlmError::InvalidConfiguration(format!(
                "tool message must carry exactly one tool result and no other content (found {} results)",
                self.tool_results.len()
            )));
        }
        Ok(())
    }
}

/// Validate every message of a conversation.
pub fn validate_messages(messages: &[ChatMessage]) -> Result<(), LlmError> {
    messages.iter().try_for_each(ChatMessage::validate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_message_with_single_result_is_valid() {
        let msg = ChatMessage::tool_result("call_1", "42");
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn tool_message_with_text_is_rejected() {
        let msg = ChatMessage::tool_result("call_1", "42").with_text("extra");
        assert!(matches!(
            msg.validate(),
            Err(LlmError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn tool_message_with_two_results_is_rejected() {
        let msg = ChatMessage::tool_result("call_1", "a").with_tool_result("call_2", "b");
        assert!(msg.validate().is_err());
        assert!(validate_messages(&[ChatMessage::user("hi"), msg]).is_err());
    }

    #[test]
    fn joined_text_preserves_segment_order() {
        let msg = ChatMessage::user("Hello, ").with_text("world");
        assert_eq!(msg.joined_text(), "Hello, world");
        assert!(msg.has_text());
        assert!(!ChatMessage::new(Role::User).has_text());
    }
}
