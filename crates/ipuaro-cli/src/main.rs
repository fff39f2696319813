//! ipuaro CLI: thin shell over the core surface.
//!
//! Exit codes: 0 on success, 1 on any fatal core error.

mod chat;
mod cli;

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use ipuaro_agent::{
    Agent, IndexProgress, OnboardingOptions, connect_store, execute_index, load_config,
    project_slug, provider_from_config, run_onboarding, write_default_config,
};

use crate::chat::{ChatArgs, StdinConfirm};
use crate::cli::{Cli, Command};

fn resolve_root(path: Option<PathBuf>) -> Result<PathBuf> {
    let root = match path {
        Some(p) => p,
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    root.canonicalize()
        .with_context(|| format!("project directory {} does not exist", root.display()))
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Init { path, force } => {
            let root = resolve_root(path)?;
            let written = write_default_config(&root, force)?;
            println!("wrote {}", written.display());
        }

        Command::Index { path } => {
            let root = resolve_root(path)?;
            let config = load_config(&root)?;
            let store = connect_store(&config.redis, &project_slug(&root)).await?;
            let stats = execute_index(
                &store,
                &root,
                &config.project.ignore_patterns,
                &mut print_progress,
            )
            .await?;
            println!(
                "indexed {} files, {} symbols, {} parse errors in {} ms",
                stats.files_indexed, stats.parse_errors, stats.symbols, stats.duration_ms
            );
        }

        Command::Onboard { path } => {
            let root = resolve_root(path)?;
            let config = load_config(&root)?;
            let store = connect_store(&config.redis, &project_slug(&root)).await?;
            let provider = provider_from_config(&config.llm)?;
            let report = run_onboarding(
                &store,
                &provider,
                &root,
                &config.project.ignore_patterns,
                OnboardingOptions::default(),
            )
            .await;

            for (name, outcome) in [
                ("store", &report.store),
                ("provider", &report.provider),
                ("model", &report.model),
                ("project", &report.project),
            ] {
                let mark = if outcome.ok { "ok" } else { "FAIL" };
                match &outcome.error {
                    Some(error) => println!("{name:<10} {mark}  {error}"),
                    None => println!("{name:<10} {mark}"),
                }
            }
            for warning in &report.warnings {
                println!("warning: {warning}");
            }
            println!("{} supported files", report.file_count);
            if !report.success {
                bail!("onboarding failed");
            }
        }

        Command::Chat {
            path,
            session,
            new,
            auto_apply,
        } => {
            let root = resolve_root(path)?;
            let config = load_config(&root)?;
            let project = project_slug(&root);
            let store = connect_store(&config.redis, &project).await?;
            let provider = provider_from_config(&config.llm)?;

            // A stale index is rebuilt silently before the first prompt.
            if store.get_project_config("last_indexed").await?.is_none() {
                println!("no index yet; indexing {}", root.display());
                execute_index(&store, &root, &config.project.ignore_patterns, &mut print_progress)
                    .await?;
            }

            let agent = Arc::new(Agent::new(
                store,
                provider,
                root.clone(),
                auto_apply || config.edit.auto_apply,
                Arc::new(StdinConfirm),
            ));
            chat::run_repl(
                agent,
                &project,
                &root,
                ChatArgs {
                    session_id: session,
                    force_new: new,
                    show_stats: config.display.show_stats,
                },
            )
            .await?;
        }

        Command::Sessions { path, clear } => {
            let root = resolve_root(path)?;
            let config = load_config(&root)?;
            let project = project_slug(&root);
            let store = connect_store(&config.redis, &project).await?;
            let manager = ipuaro_agent::SessionManager::new(store);

            if clear {
                let removed = manager.clear_all_sessions().await?;
                println!("removed {removed} sessions");
            } else {
                let sessions = manager.list_sessions(Some(&project)).await?;
                if sessions.is_empty() {
                    println!("no sessions for {project}");
                }
                for session in sessions {
                    println!(
                        "{}  {}  {} messages  last active {}",
                        session.id,
                        session.project_name,
                        session.history.len(),
                        session.last_activity_at
                    );
                }
            }
        }
    }
    Ok(())
}

fn print_progress(progress: IndexProgress) {
    match progress.current_file {
        Some(file) => log::debug!(
            "[{}] {}/{} {file}",
            progress.phase,
            progress.current,
            progress.total
        ),
        None => log::debug!("[{}] {}/{}", progress.phase, progress.current, progress.total),
    }
}
