//! Error Handling Module
//!
//! This module provides the error taxonomy shared by every protocol family:
//! - Core error type (`LlmError`)
//! - Classification helpers used by the retry executor
//! - Type conversions from common error types
//!
//! # Example
//!
//! ```rust
//! use llm_wire::error::LlmError;
//!
//! let error = LlmError::transport(None, Some(429), "Too Many Requests", None);
//! assert_eq!(error.status_code(), Some(429));
//! assert!(error.is_retryable_with(&[429]));
//! ```

mod conversions;
pub mod types;

pub use types::*;
