//! Stream driver
//!
//! Connects a framed byte stream to a protocol-specific converter and yields
//! canonical events in order. The driver is the only place that suspends: it
//! races cancellation, the thinking debounce deadline and the next frame.

use futures::StreamExt;
use serde_json::Value;
use tokio::time::Instant;

use super::lines::{Frame, FrameStream};
use super::state::StreamParseState;
use super::tool_calls::FlushMode;
use crate::error::LlmError;
use crate::types::{ChatEvent, ChatStream, ProtocolFamily};
use crate::utils::cancel::CancelHandle;

/// Converts provider frames into canonical events.
///
/// A `ProtocolDecodeError` returned from [`convert_frame`] is logged and the
/// frame skipped; any other error terminates the stream.
///
/// [`convert_frame`]: StreamEventConverter::convert_frame
pub trait StreamEventConverter: Send {
    fn state(&self) -> &StreamParseState;

    fn state_mut(&mut self) -> &mut StreamParseState;

    fn family(&self) -> ProtocolFamily {
        self.state().family()
    }

    /// Convert one frame, pushing zero or more events.
    fn convert_frame(&mut self, frame: &Frame, out: &mut Vec<ChatEvent>) -> Result<(), LlmError>;

    /// The `[DONE]` payload: flush leniently and end.
    fn handle_terminator(&mut self, out: &mut Vec<ChatEvent>) -> Result<(), LlmError> {
        self.state_mut().end_stream(FlushMode::Lenient, out)
    }

    /// The byte stream ended; no-op when the protocol already ended the stream.
    fn handle_stream_end(&mut self, out: &mut Vec<ChatEvent>) -> Result<(), LlmError> {
        self.state_mut().end_stream(FlushMode::Lenient, out)
    }
}

/// Parse a frame's payload as JSON, mapping failures to a skippable decode error.
pub fn parse_frame_json(frame: &Frame) -> Result<Value, LlmError> {
    serde_json::from_str(&frame.data).map_err(|e| {
        let snippet: String = frame.data.chars().take(200).collect();
        LlmError::ProtocolDecodeError(format!("{e}: {snippet}"))
    })
}

enum Step {
    Cancelled,
    FlushThinking,
    Frame(Option<Result<Frame, LlmError>>),
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Drive `frames` through `converter` until the stream ends, fails or is cancelled.
pub fn drive_stream(
    mut frames: FrameStream,
    mut converter: Box<dyn StreamEventConverter>,
    cancel: CancelHandle,
) -> ChatStream {
    Box::pin(async_stream::stream! {
        let family = converter.family();
        let mut out: Vec<ChatEvent> = Vec::new();
        loop {
            let deadline = converter.state().thinking_deadline();
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                _ = wait_for(deadline) => Step::FlushThinking,
                frame = frames.next() => Step::Frame(frame),
            };

            let result = match step {
                Step::Cancelled => {
                    tracing::debug!(%family, "stream cancelled by host");
                    yield Err(LlmError::Cancelled);
                    break;
                }
                Step::FlushThinking => {
                    converter.state_mut().flush_thinking_if_due(Instant::now(), &mut out);
                    Ok(())
                }
                Step::Frame(None) => converter.handle_stream_end(&mut out),
                Step::Frame(Some(Err(LlmError::ProtocolDecodeError(message)))) => {
                    tracing::warn!(%family, %message, "skipping undecodable stream frame");
                    Ok(())
                }
                Step::Frame(Some(Err(err))) => {
                    yield Err(err.with_family(family));
                    break;
                }
                Step::Frame(Some(Ok(frame))) => {
                    if frame.is_blank() {
                        continue;
                    }
                    if frame.is_terminator() {
                        converter.handle_terminator(&mut out)
                    } else {
                        converter.convert_frame(&frame, &mut out)
                    }
                }
            };

            for event in out.drain(..) {
                yield Ok(event);
            }

            match result {
                Ok(()) => {}
                Err(LlmError::ProtocolDecodeError(message)) => {
                    tracing::warn!(%family, %message, "skipping malformed stream line");
                }
                Err(err) => {
                    yield Err(err);
                    break;
                }
            }

            if converter.state().is_ended() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::state::StreamOptions;
    use std::time::Duration;

    /// Minimal converter: `{"t": ..}` text, `{"r": ..}` reasoning, `{"end": true}` end.
    struct EchoConverter {
        state: StreamParseState,
    }

    impl EchoConverter {
        fn boxed(interval: Duration) -> Box<dyn StreamEventConverter> {
            Box::new(Self {
                state: StreamParseState::new(
                    ProtocolFamily::Ollama,
                    StreamOptions {
                        thinking_flush_interval: interval,
                        ..StreamOptions::default()
                    },
                ),
            })
        }
    }

    impl StreamEventConverter for EchoConverter {
        fn state(&self) -> &StreamParseState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut StreamParseState {
            &mut self.state
        }

        fn convert_frame(&mut self, frame: &Frame, out: &mut Vec<ChatEvent>) -> Result<(), LlmError> {
            let value = parse_frame_json(frame)?;
            if let Some(text) = value["t"].as_str() {
                self.state.push_content(text, out);
            }
            if let Some(text) = value["r"].as_str() {
                self.state.push_reasoning(text, out);
            }
            if value["end"].as_bool() == Some(true) {
                self.state.end_stream(FlushMode::Strict, out)?;
            }
            Ok(())
        }
    }

    fn frame_stream(lines: Vec<&str>) -> FrameStream {
        let frames: Vec<Result<Frame, LlmError>> =
            lines.into_iter().map(|l| Ok(Frame::data(l))).collect();
        Box::pin(futures::stream::iter(frames))
    }

    async fn collect(stream: ChatStream) -> Vec<Result<ChatEvent, LlmError>> {
        stream.collect().await
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn malformed_lines_are_logged_and_skipped() {
        let events = collect(drive_stream(
            frame_stream(vec![r#"{"t":"a"}"#, "{not json", r#"{"t":"b"}"#]),
            EchoConverter::boxed(Duration::ZERO),
            CancelHandle::new(),
        ))
        .await;

        let events: Vec<ChatEvent> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            events,
            vec![
                ChatEvent::TextDelta { text: "a".into() },
                ChatEvent::TextDelta { text: "b".into() },
                ChatEvent::StreamEnd { finish_reason: None },
            ]
        );
        assert!(logs_contain("skipping malformed stream line"));
    }

    #[tokio::test]
    async fn nothing_after_protocol_end() {
        let events = collect(drive_stream(
            frame_stream(vec![r#"{"end":true}"#, r#"{"t":"late"}"#]),
            EchoConverter::boxed(Duration::ZERO),
            CancelHandle::new(),
        ))
        .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Ok(ChatEvent::StreamEnd { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn thinking_flushes_on_deadline_while_stream_is_idle() {
        let (tx, rx) = futures::channel::mpsc::unbounded::<Result<Frame, LlmError>>();
        let mut stream = drive_stream(
            Box::pin(rx),
            EchoConverter::boxed(Duration::from_millis(100)),
            CancelHandle::new(),
        );

        tx.unbounded_send(Ok(Frame::data(r#"{"r":"Hel"}"#))).unwrap();
        tx.unbounded_send(Ok(Frame::data(r#"{"r":"lo world"}"#))).unwrap();

        // the paused clock auto-advances to the debounce deadline
        let first = stream.next().await.unwrap().unwrap();
        assert!(matches!(
            first,
            ChatEvent::ThinkingDelta { ref text, .. } if text == "Hello world"
        ));

        drop(tx);
        let rest: Vec<_> = stream.map(Result::unwrap).collect().await;
        assert!(matches!(rest[0], ChatEvent::ThinkingEnd { .. }));
        assert!(matches!(rest[1], ChatEvent::StreamEnd { .. }));
    }

    #[tokio::test]
    async fn cancellation_stops_the_stream() {
        let (_tx, rx) = futures::channel::mpsc::unbounded::<Result<Frame, LlmError>>();
        let cancel = CancelHandle::new();
        let stream = drive_stream(Box::pin(rx), EchoConverter::boxed(Duration::ZERO), cancel.clone());
        cancel.cancel();
        let events = collect(stream).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(LlmError::Cancelled)));
    }

    #[tokio::test]
    async fn transport_error_terminates_with_family() {
        let frames: Vec<Result<Frame, LlmError>> = vec![
            Ok(Frame::data(r#"{"t":"partial"}"#)),
            Err(LlmError::transport(None, None, "reset", None)),
        ];
        let events = collect(drive_stream(
            Box::pin(futures::stream::iter(frames)),
            EchoConverter::boxed(Duration::ZERO),
            CancelHandle::new(),
        ))
        .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1],
            Err(LlmError::TransportError {
                family: Some(ProtocolFamily::Ollama),
                ..
            })
        ));
    }
}
