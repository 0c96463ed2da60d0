//! Anthropic Messages API Standard

pub mod request;
pub mod streaming;

pub use request::build_messages_request;
pub use streaming::AnthropicEventConverter;

/// Value of the `anthropic-version` header.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// `max_tokens` is mandatory in this protocol.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
