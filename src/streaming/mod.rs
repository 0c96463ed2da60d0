//! Streaming
//!
//! Shared machinery behind every protocol converter:
//! - `lines`: SSE and JSON-lines framing
//! - `tool_calls`: fragment assembly into complete calls
//! - `thinking`: debounced reasoning accumulation
//! - `think_tags`: inline `<think>` marker routing
//! - `state`: per-request parse state tying the above together
//! - `factory`: the converter trait and the stream driver

pub mod factory;
pub mod lines;
pub mod state;
pub mod think_tags;
pub mod thinking;
pub mod tool_calls;

pub use factory::{StreamEventConverter, drive_stream, parse_frame_json};
pub use lines::{DONE_PAYLOAD, Frame, FrameStream, Framing, JsonLineDecoder, frames};
pub use state::{StreamOptions, StreamParseState};
pub use think_tags::{TagSegment, ThinkTagScanner};
pub use thinking::{ThinkingBuffer, is_reasoning_config_value};
pub use tool_calls::{FlushMode, ReadyCall, ToolCallAssembler};
