//! Test fixture utilities: load recorded provider streams and drive them
//! through the public framing + converter pipeline.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use llm_wire::dispatch::adapter_for;
use llm_wire::error::LlmError;
use llm_wire::reasoning_cache::ReasoningCache;
use llm_wire::streaming::{StreamOptions, StreamParseState, drive_stream, frames};
use llm_wire::types::{ChatEvent, ChatStream, ProtocolFamily};
use llm_wire::utils::CancelHandle;

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

pub fn load_fixture(name: &str) -> Vec<u8> {
    let raw = std::fs::read(fixture_path(name)).expect("fixture exists");
    // recorded on different platforms; the wire always uses \n here
    String::from_utf8(raw)
        .expect("fixture is UTF-8")
        .replace("\r\n", "\n")
        .into_bytes()
}

/// Split `raw` into network-sized chunks of at most `chunk_size` bytes.
pub fn chunked(raw: &[u8], chunk_size: usize) -> Vec<Result<Bytes, LlmError>> {
    raw.chunks(chunk_size.max(1))
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect()
}

/// Options with immediate thinking flushes so event order is deterministic.
pub fn eager_options() -> StreamOptions {
    StreamOptions {
        thinking_flush_interval: Duration::ZERO,
        ..StreamOptions::default()
    }
}

pub fn stream_chunks(
    family: ProtocolFamily,
    chunks: Vec<Result<Bytes, LlmError>>,
    options: StreamOptions,
    cache: Option<Arc<ReasoningCache>>,
) -> ChatStream {
    let adapter = adapter_for(family);
    let mut state = StreamParseState::new(family, options);
    if let Some(cache) = cache {
        state = state.with_reasoning_cache(cache);
    }
    drive_stream(
        frames(futures::stream::iter(chunks), adapter.framing),
        adapter.new_converter(state),
        CancelHandle::new(),
    )
}

/// Every item of the stream, errors included.
pub async fn collect_results(mut stream: ChatStream) -> Vec<Result<ChatEvent, LlmError>> {
    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        items.push(item);
    }
    items
}

/// Every event of a stream that must not fail.
pub async fn collect_events(stream: ChatStream) -> Vec<ChatEvent> {
    collect_results(stream)
        .await
        .into_iter()
        .map(|item| item.expect("stream event"))
        .collect()
}

pub async fn replay_fixture(family: ProtocolFamily, name: &str, chunk_size: usize) -> Vec<ChatEvent> {
    let raw = load_fixture(name);
    collect_events(stream_chunks(family, chunked(&raw, chunk_size), eager_options(), None)).await
}

pub fn text_of(events: &[ChatEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::TextDelta { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

pub fn thinking_of(events: &[ChatEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::ThinkingDelta { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// `(id, name, arguments as JSON)` of every emitted tool call.
pub fn tool_calls_of(events: &[ChatEvent]) -> Vec<(String, String, serde_json::Value)> {
    events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::ToolCall { id, name, arguments } => Some((
                id.clone(),
                name.clone(),
                serde_json::from_str(arguments).expect("arguments are JSON"),
            )),
            _ => None,
        })
        .collect()
}

pub fn stream_ends(events: &[ChatEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ChatEvent::StreamEnd { .. }))
        .count()
}
