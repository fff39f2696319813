//! Command-line argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ipuaro", version, about = "Local-LLM coding agent over an indexed codebase")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a default .ipuaro.json into the project.
    Init {
        /// Project directory (defaults to the current directory).
        path: Option<PathBuf>,
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },
    /// Build or rebuild the project index.
    Index {
        path: Option<PathBuf>,
    },
    /// Run the pre-flight health checks.
    Onboard {
        path: Option<PathBuf>,
    },
    /// Open an interactive chat session against the indexed project.
    Chat {
        path: Option<PathBuf>,
        /// Resume a specific session id.
        #[arg(long)]
        session: Option<String>,
        /// Start a fresh session even if one could be resumed.
        #[arg(long)]
        new: bool,
        /// Apply edits without asking for confirmation.
        #[arg(long)]
        auto_apply: bool,
    },
    /// List or clear stored sessions.
    Sessions {
        path: Option<PathBuf>,
        /// Delete every stored session.
        #[arg(long)]
        clear: bool,
    },
}
