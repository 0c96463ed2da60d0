//! Utility modules for llm-wire

pub mod cancel;

pub use cancel::{CancelHandle, sleep_cancellable};
