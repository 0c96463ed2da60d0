//! Build a request, echo its assistant turn back in the family's own stream
//! format, parse it, and recover the original text and tool call.

use llm_wire::dispatch::adapter_for;
use llm_wire::standards::{BuildContext, BuiltRequest};
use llm_wire::streaming::StreamOptions;
use llm_wire::types::{ChatMessage, ModelConfig, ProtocolFamily, RequestOptions};
use serde_json::{Value, json};

#[path = "support/stream_fixture.rs"]
mod support;

use support::{chunked, collect_events, eager_options, stream_chunks, text_of, tool_calls_of};

const ASSISTANT_TEXT: &str = "Searching the crate index for serde now.";
const CALL_ID: &str = "call_rt_1";
const CALL_NAME: &str = "search_crates";
const CALL_ARGUMENTS: &str = r#"{"query":"serde","limit":3,"features":["derive"]}"#;
const CHUNK_SIZES: [usize; 3] = [usize::MAX, 11, 3];

fn conversation() -> Vec<ChatMessage> {
    vec![
        ChatMessage::user("Find me a serialization crate"),
        ChatMessage::assistant(ASSISTANT_TEXT).with_tool_call(CALL_ID, CALL_NAME, CALL_ARGUMENTS),
    ]
}

fn build(family: ProtocolFamily) -> BuiltRequest {
    let model = ModelConfig::new("round-trip-model", family, "https://llm.example.com/v1");
    (adapter_for(family).build)(
        &conversation(),
        &model,
        &RequestOptions::new(),
        &BuildContext::new(),
    )
    .expect("request builds")
}

fn halves(text: &str) -> (&str, &str) {
    let mut mid = text.len() / 2;
    while !text.is_char_boundary(mid) {
        mid += 1;
    }
    text.split_at(mid)
}

fn sse(events: &[Value]) -> String {
    events
        .iter()
        .map(|event| format!("data: {event}\n\n"))
        .collect()
}

fn json_lines(lines: &[Value]) -> String {
    lines.iter().map(|line| format!("{line}\n")).collect()
}

/// Replay `raw` at every chunk size and check the recovered turn.
async fn assert_round_trip(family: ProtocolFamily, raw: &str, provider_ids: bool) {
    let options = StreamOptions {
        emit_filler_space: false,
        ..eager_options()
    };
    for chunk_size in CHUNK_SIZES {
        let events = collect_events(stream_chunks(
            family,
            chunked(raw.as_bytes(), chunk_size),
            options.clone(),
            None,
        ))
        .await;

        assert_eq!(text_of(&events), ASSISTANT_TEXT, "{family} text at chunk {chunk_size}");
        let calls = tool_calls_of(&events);
        assert_eq!(calls.len(), 1, "{family} calls at chunk {chunk_size}");
        let (id, name, arguments) = &calls[0];
        if provider_ids {
            assert_eq!(id, CALL_ID);
        } else {
            assert!(id.starts_with("call_"), "{family} synthesized id {id}");
        }
        assert_eq!(name, CALL_NAME);
        assert_eq!(arguments, &serde_json::from_str::<Value>(CALL_ARGUMENTS).unwrap());
    }
}

#[tokio::test]
async fn openai_chat_round_trip() {
    let body = build(ProtocolFamily::OpenAiChat).body;
    let assistant = &body["messages"][1];
    let call = &assistant["tool_calls"][0];
    let (text_a, text_b) = halves(assistant["content"].as_str().unwrap());
    let (args_a, args_b) = halves(call["function"]["arguments"].as_str().unwrap());

    let mut raw = sse(&[
        json!({"choices": [{"index": 0, "delta": {"role": "assistant", "content": text_a}}]}),
        json!({"choices": [{"index": 0, "delta": {"content": text_b}}]}),
        json!({"choices": [{"index": 0, "delta": {"tool_calls": [{
            "index": 0,
            "id": call["id"],
            "type": "function",
            "function": {"name": call["function"]["name"], "arguments": args_a}
        }]}}]}),
        json!({"choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "function": {"arguments": args_b}}]}}]}),
        json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]}),
    ]);
    raw.push_str("data: [DONE]\n\n");

    assert_round_trip(ProtocolFamily::OpenAiChat, &raw, true).await;
}

#[tokio::test]
async fn openai_responses_round_trip() {
    let body = build(ProtocolFamily::OpenAiResponses).body;
    let input = body["input"].as_array().unwrap();
    let message = input
        .iter()
        .find(|item| item["type"] == "message" && item["role"] == "assistant")
        .unwrap();
    let call = input.iter().find(|item| item["type"] == "function_call").unwrap();
    let text = message["content"][0]["text"].as_str().unwrap();
    let arguments = call["arguments"].as_str().unwrap();
    let (text_a, text_b) = halves(text);
    let (args_a, args_b) = halves(arguments);

    let raw = sse(&[
        json!({"type": "response.created", "response": {"status": "in_progress"}}),
        json!({"type": "response.output_item.added", "output_index": 0,
               "item": {"type": "message", "role": "assistant", "content": []}}),
        json!({"type": "response.output_text.delta", "output_index": 0, "delta": text_a}),
        json!({"type": "response.output_text.delta", "output_index": 0, "delta": text_b}),
        json!({"type": "response.output_text.done", "output_index": 0, "text": text}),
        json!({"type": "response.output_item.added", "output_index": 1,
               "item": {"type": "function_call", "call_id": call["call_id"], "name": call["name"], "arguments": ""}}),
        json!({"type": "response.function_call_arguments.delta", "output_index": 1, "delta": args_a}),
        json!({"type": "response.function_call_arguments.delta", "output_index": 1, "delta": args_b}),
        json!({"type": "response.function_call_arguments.done", "output_index": 1, "arguments": arguments}),
        json!({"type": "response.completed", "response": {
            "status": "completed",
            "output": [
                {"type": "message", "role": "assistant", "content": [{"type": "output_text", "text": text}]},
                {"type": "function_call", "call_id": call["call_id"], "name": call["name"], "arguments": arguments}
            ]
        }}),
    ]);

    assert_round_trip(ProtocolFamily::OpenAiResponses, &raw, true).await;
}

#[tokio::test]
async fn anthropic_round_trip() {
    let body = build(ProtocolFamily::Anthropic).body;
    let blocks = body["messages"][1]["content"].as_array().unwrap();
    let text = blocks
        .iter()
        .find(|b| b["type"] == "text")
        .and_then(|b| b["text"].as_str())
        .unwrap();
    let tool_use = blocks.iter().find(|b| b["type"] == "tool_use").unwrap();
    let input = tool_use["input"].to_string();
    let (text_a, text_b) = halves(text);
    let (args_a, args_b) = halves(&input);

    let raw = sse(&[
        json!({"type": "message_start", "message": {"usage": {"input_tokens": 12}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text_a}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text_b}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "content_block_start", "index": 1, "content_block": {
            "type": "tool_use", "id": tool_use["id"], "name": tool_use["name"], "input": {}
        }}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": args_a}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": args_b}}),
        json!({"type": "content_block_stop", "index": 1}),
        json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 20}}),
        json!({"type": "message_stop"}),
    ]);

    assert_round_trip(ProtocolFamily::Anthropic, &raw, true).await;
}

#[tokio::test]
async fn gemini_round_trip() {
    let body = build(ProtocolFamily::Gemini).body;
    let parts = body["contents"][1]["parts"].as_array().unwrap();
    let text = parts
        .iter()
        .find_map(|p| p.get("text").and_then(Value::as_str))
        .unwrap();
    let call = parts.iter().find_map(|p| p.get("functionCall")).unwrap();
    let (text_a, text_b) = halves(text);

    let raw = sse(&[
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text_a}]}}]}),
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text_b}]}}]}),
        json!({"candidates": [{"content": {"role": "model", "parts": [{"functionCall": call}]},
               "finishReason": "STOP"}]}),
    ]);

    // generate-content history carries no call ids
    assert_round_trip(ProtocolFamily::Gemini, &raw, false).await;
}

#[tokio::test]
async fn ollama_round_trip() {
    let body = build(ProtocolFamily::Ollama).body;
    let assistant = &body["messages"][1];
    let (text_a, text_b) = halves(assistant["content"].as_str().unwrap());
    let function = &assistant["tool_calls"][0]["function"];

    let raw = json_lines(&[
        json!({"message": {"role": "assistant", "content": text_a}, "done": false}),
        json!({"message": {"role": "assistant", "content": text_b}, "done": false}),
        json!({"message": {"role": "assistant", "content": "", "tool_calls": [{"function": function}]}, "done": false}),
        json!({"message": {"role": "assistant", "content": ""}, "done": true, "done_reason": "stop",
               "prompt_eval_count": 9, "eval_count": 14}),
    ]);

    assert_round_trip(ProtocolFamily::Ollama, &raw, false).await;
}
