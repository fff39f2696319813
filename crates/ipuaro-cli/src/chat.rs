//! Line-oriented chat REPL and the stdin confirmation prompt.

use anyhow::Result;
use async_trait::async_trait;
use std::io::{BufRead, Write};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use ipuaro_agent::session::StartOptions;
use ipuaro_agent::tools::Confirmation;
use ipuaro_agent::{Agent, MessageOptions};

/// Asks y/n on the terminal. Runs on a blocking thread so the agent loop
/// stays responsive.
pub struct StdinConfirm;

#[async_trait]
impl Confirmation for StdinConfirm {
    async fn request(&self, summary: &str) -> bool {
        let summary = summary.to_string();
        tokio::task::spawn_blocking(move || {
            print!("\n  {summary}\n  apply? [y/N] ");
            let _ = std::io::stdout().flush();
            let mut answer = String::new();
            if std::io::stdin().lock().read_line(&mut answer).is_err() {
                return false;
            }
            matches!(answer.trim(), "y" | "Y" | "yes")
        })
        .await
        .unwrap_or(false)
    }
}

pub struct ChatArgs {
    pub session_id: Option<String>,
    pub force_new: bool,
    pub show_stats: bool,
}

/// Read prompts from stdin until EOF, streaming answers to stdout.
///
/// `undo` and `exit` are handled locally; everything else goes through the
/// agent loop.
pub async fn run_repl(agent: Arc<Agent>, project: &str, root: &std::path::Path, args: ChatArgs) -> Result<()> {
    let started = agent
        .sessions()
        .start_session(
            project,
            StartOptions {
                session_id: args.session_id,
                force_new: args.force_new,
            },
        )
        .await?;
    let mut session = started.session;
    if started.is_new {
        println!("new session {}", session.id);
    } else {
        println!("resumed session {} ({} messages)", session.id, session.history.len());
    }

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line {
            "exit" | "quit" => break,
            "undo" => {
                match agent.sessions().undo_last(&mut session, root).await? {
                    Some(outcome) => println!("reverted {} ({})", outcome.file_path, outcome.description),
                    None => println!("nothing to undo"),
                }
                continue;
            }
            _ => {}
        }

        let cancel = CancellationToken::new();
        let on_text = |chunk: &str| {
            print!("{chunk}");
            let _ = std::io::stdout().flush();
        };
        let opts = MessageOptions {
            cancel,
            on_text: Some(&on_text),
        };
        match agent.handle_message(&mut session, line, &opts).await {
            Ok(_) => println!(),
            Err(e) => eprintln!("\nerror: {e}"),
        }

        if args.show_stats {
            let stats = &session.stats;
            println!(
                "[tokens {} | tools {} | edits {}/{} rejected | {} ms]",
                stats.total_tokens,
                stats.tool_calls,
                stats.edits_applied,
                stats.edits_rejected,
                stats.total_time_ms
            );
        }
    }
    Ok(())
}
