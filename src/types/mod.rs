//! Canonical, backend-agnostic types
//!
//! Everything the host hands in (messages, model configuration, tool
//! advertisements) and everything it receives back (canonical events).

mod events;
mod message;
mod model;
mod tools;

pub use events::*;
pub use message::*;
pub use model::*;
pub use tools::*;
