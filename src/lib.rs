//! llm-wire
//!
//! Protocol adapter between a chat host and LLM backends. Canonical messages go
//! in; provider-specific request bodies go out; streamed provider responses come
//! back as one ordered stream of canonical [`ChatEvent`](types::ChatEvent)s.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use futures::StreamExt;
//! use llm_wire::prelude::*;
//!
//! # async fn run() -> Result<(), LlmError> {
//! let credentials = StaticCredentials::new().with("openai-chat", "sk-...");
//! let dispatcher = Dispatcher::new(AdapterConfig::default(), Arc::new(credentials))?;
//! let model = ModelConfig::new("gpt-4o-mini", ProtocolFamily::OpenAiChat, "https://api.openai.com/v1");
//!
//! let mut events = dispatcher
//!     .chat_stream(&[ChatMessage::user("Hello")], &model, &RequestOptions::new(), CancelHandle::new())
//!     .await?;
//! while let Some(event) = events.next().await {
//!     if let ChatEvent::TextDelta { text } = event? {
//!         print!("{text}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod reasoning_cache;
pub mod retry;
pub mod standards;
pub mod streaming;
pub mod types;
pub mod utils;

pub use error::LlmError;

pub mod prelude {
    pub use crate::auth::{CredentialPrompt, CredentialStore, StaticCredentials};
    pub use crate::config::{AdapterConfig, HttpConfig};
    pub use crate::dispatch::Dispatcher;
    pub use crate::error::LlmError;
    pub use crate::retry::RetryPolicy;
    pub use crate::types::*;
    pub use crate::utils::CancelHandle;
}
