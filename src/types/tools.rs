//! Tool definitions and per-request options

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Tool advertised by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the argument object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: None,
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Parameter schema, defaulting to an empty object schema.
    pub fn parameters(&self) -> serde_json::Value {
        self.input_schema
            .clone()
            .unwrap_or_else(|| serde_json::json!({ "type": "object", "properties": {} }))
    }
}

/// Tool-use mode requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolMode {
    #[default]
    Auto,
    /// Exactly one mandatory tool call.
    Required,
}

/// Per-request options supplied by the host next to the conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub tool_mode: ToolMode,
    /// Whether credential resolution may fall back to an interactive prompt.
    #[serde(default)]
    pub allow_credential_prompt: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_mode(mut self, mode: ToolMode) -> Self {
        self.tool_mode = mode;
        self
    }

    pub fn with_credential_prompt(mut self, allow: bool) -> Self {
        self.allow_credential_prompt = allow;
        self
    }

    /// The single forced tool when the mode is `Required`.
    ///
    /// Fails with `InvalidToolConstraint` unless exactly one tool is present.
    pub fn required_tool(&self) -> Result<Option<&ToolDefinition>, LlmError> {
        match self.tool_mode {
            ToolMode::Auto => Ok(None),
            ToolMode::Required => match self.tools.as_slice() {
                [tool] => Ok(Some(tool)),
                tools => Err(LlmError::InvalidToolConstraint(format!(
                    "a required tool call needs exactly one tool, got {}",
                    tools.len()
                ))),
            },
        }
    }
}
