//! The message-handling loop and its lazy context builder.

pub mod context;
pub mod handler;

pub use context::{build_context, estimate_tokens, truncate_context};
pub use handler::{Agent, MAX_TOOL_ROUNDS, MessageOptions};
