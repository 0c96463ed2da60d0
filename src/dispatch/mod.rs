//! Protocol dispatch
//!
//! A closed lookup table maps each [`ProtocolFamily`] to its request builder,
//! stream framing, converter constructor, path suffix and credential scheme.
//! [`Dispatcher`] runs one chat turn end to end on top of it.

mod dispatcher;
pub mod http;
pub mod pacing;

pub use dispatcher::Dispatcher;
pub use http::{HeaderBuilder, build_headers, endpoint_url, send_once};
pub use pacing::{PacePermit, RequestPacer};

use crate::standards::anthropic::{ANTHROPIC_VERSION, AnthropicEventConverter, build_messages_request};
use crate::standards::gemini::{
    GeminiEventConverter, build_generate_content_request, stream_generate_content_path,
};
use crate::standards::ollama::{OllamaEventConverter, build_ollama_chat_request};
use crate::standards::openai::{
    OpenAiChatEventConverter, OpenAiResponsesEventConverter, build_chat_request,
    build_responses_request,
};
use crate::standards::BuildFn;
use crate::streaming::{Framing, StreamEventConverter, StreamParseState};
use crate::types::{ModelConfig, ProtocolFamily};

/// How the resolved credential is attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialScheme {
    /// `Authorization: Bearer <key>`; the key is mandatory.
    Bearer,
    /// Bearer token when a key is present, nothing otherwise.
    OptionalBearer,
    /// The key goes verbatim into the named header.
    ApiKeyHeader(&'static str),
}

pub type ConverterFn = fn(StreamParseState) -> Box<dyn StreamEventConverter>;
pub type PathFn = fn(&ModelConfig) -> String;

/// Everything that differs between protocol families.
pub struct ProtocolAdapter {
    pub family: ProtocolFamily,
    pub build: BuildFn,
    pub framing: Framing,
    pub converter: ConverterFn,
    pub path: PathFn,
    pub credential: CredentialScheme,
    pub static_headers: &'static [(&'static str, &'static str)],
}

impl std::fmt::Debug for ProtocolAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolAdapter")
            .field("family", &self.family)
            .field("framing", &self.framing)
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

impl ProtocolAdapter {
    /// Converter for a fresh stream.
    pub fn new_converter(&self, state: StreamParseState) -> Box<dyn StreamEventConverter> {
        (self.converter)(state)
    }
}

fn openai_chat_converter(state: StreamParseState) -> Box<dyn StreamEventConverter> {
    Box::new(OpenAiChatEventConverter::new(state))
}

fn openai_responses_converter(state: StreamParseState) -> Box<dyn StreamEventConverter> {
    Box::new(OpenAiResponsesEventConverter::new(state))
}

fn anthropic_converter(state: StreamParseState) -> Box<dyn StreamEventConverter> {
    Box::new(AnthropicEventConverter::new(state))
}

fn gemini_converter(state: StreamParseState) -> Box<dyn StreamEventConverter> {
    Box::new(GeminiEventConverter::new(state))
}

fn ollama_converter(state: StreamParseState) -> Box<dyn StreamEventConverter> {
    Box::new(OllamaEventConverter::new(state))
}

fn chat_completions_path(_: &ModelConfig) -> String {
    "/chat/completions".to_string()
}

fn responses_path(_: &ModelConfig) -> String {
    "/responses".to_string()
}

fn messages_path(_: &ModelConfig) -> String {
    "/messages".to_string()
}

fn generate_content_path(model: &ModelConfig) -> String {
    stream_generate_content_path(&model.id)
}

fn ollama_chat_path(_: &ModelConfig) -> String {
    "/api/chat".to_string()
}

static ADAPTERS: [ProtocolAdapter; 5] = [
    ProtocolAdapter {
        family: ProtocolFamily::OpenAiChat,
        build: build_chat_request,
        framing: Framing::Sse,
        converter: openai_chat_converter,
        path: chat_completions_path,
        credential: CredentialScheme::Bearer,
        static_headers: &[],
    },
    ProtocolAdapter {
        family: ProtocolFamily::OpenAiResponses,
        build: build_responses_request,
        framing: Framing::Sse,
        converter: openai_responses_converter,
        path: responses_path,
        credential: CredentialScheme::Bearer,
        static_headers: &[],
    },
    ProtocolAdapter {
        family: ProtocolFamily::Anthropic,
        build: build_messages_request,
        framing: Framing::Sse,
        converter: anthropic_converter,
        path: messages_path,
        credential: CredentialScheme::ApiKeyHeader("x-api-key"),
        static_headers: &[("anthropic-version", ANTHROPIC_VERSION)],
    },
    ProtocolAdapter {
        family: ProtocolFamily::Gemini,
        build: build_generate_content_request,
        framing: Framing::Sse,
        converter: gemini_converter,
        path: generate_content_path,
        credential: CredentialScheme::ApiKeyHeader("x-goog-api-key"),
        static_headers: &[],
    },
    ProtocolAdapter {
        family: ProtocolFamily::Ollama,
        build: build_ollama_chat_request,
        framing: Framing::JsonLines,
        converter: ollama_converter,
        path: ollama_chat_path,
        credential: CredentialScheme::OptionalBearer,
        static_headers: &[],
    },
];

/// Adapter entry for `family`.
pub fn adapter_for(family: ProtocolFamily) -> &'static ProtocolAdapter {
    match family {
        ProtocolFamily::OpenAiChat => &ADAPTERS[0],
        ProtocolFamily::OpenAiResponses => &ADAPTERS[1],
        ProtocolFamily::Anthropic => &ADAPTERS[2],
        ProtocolFamily::Gemini => &ADAPTERS[3],
        ProtocolFamily::Ollama => &ADAPTERS[4],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_family_has_its_own_entry() {
        for family in ProtocolFamily::ALL {
            assert_eq!(adapter_for(family).family, family);
        }
    }

    #[test]
    fn only_ollama_uses_json_lines_and_optional_credentials() {
        for family in ProtocolFamily::ALL {
            let adapter = adapter_for(family);
            let is_ollama = family == ProtocolFamily::Ollama;
            assert_eq!(adapter.framing == Framing::JsonLines, is_ollama);
            assert_eq!(adapter.credential == CredentialScheme::OptionalBearer, is_ollama);
        }
    }
}
