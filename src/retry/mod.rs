//! Retry module
//! - policy.rs: fixed-interval, status-code driven retries

pub mod policy;

pub use policy::*;
