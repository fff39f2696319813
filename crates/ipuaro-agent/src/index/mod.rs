//! Project indexing: scanning, AST summarization, derived metadata and the
//! global aggregates, orchestrated by [`indexer::execute_index`].

pub mod ast;
pub mod builder;
pub mod indexer;
pub mod meta;
pub mod scanner;
pub mod types;

pub use indexer::{IndexPhase, IndexProgress, IndexStats, execute_index};
