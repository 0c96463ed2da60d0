//! Ollama native chat Standard
//!
//! `/api/chat` streams newline-delimited JSON; every line is a complete
//! message delta rather than an SSE event.

pub mod request;
pub mod streaming;

pub use request::build_ollama_chat_request;
pub use streaming::OllamaEventConverter;
