//! Core runtime for the ipuaro coding agent.
//!
//! ipuaro indexes a TypeScript/JavaScript project into a Redis-backed store,
//! gives a local LLM tool-mediated lazy access to that index, applies edits
//! under confirmation with a bounded undo stack, and persists sessions
//! across restarts.
//!
//! The pieces, leaves first: [`store`] (typed facade over the key-value
//! transport), [`index`] (scan → parse → analyze → build pipeline),
//! [`tools`] (the 18 operations a model may request), [`session`] (dialogue
//! state and undo), [`agent`] (the per-message loop), [`onboarding`]
//! (pre-flight checks) and [`safety`] (path containment, command vetting).

pub mod agent;
pub mod config;
pub mod error;
pub mod hash;
pub mod index;
pub mod onboarding;
pub mod safety;
pub mod session;
pub mod store;
pub mod tools;

pub use agent::{Agent, MessageOptions};
pub use config::{CONFIG_FILE_NAME, Config, ProviderKind, load_config, write_default_config};
pub use error::{AgentError, AgentResult};
pub use hash::project_slug;
pub use index::{IndexPhase, IndexProgress, IndexStats, execute_index};
pub use onboarding::{OnboardingOptions, OnboardingReport, run_onboarding};
pub use session::{Session, SessionManager, StartOptions};
pub use store::{IndexStore, MemoryKv, RedisKv};
pub use tools::{Confirmation, ToolRegistry};

use std::sync::Arc;

/// Build the chat provider described by the config. The OpenAI key falls
/// back to `OPENAI_API_KEY` when the config omits it.
pub fn provider_from_config(
    config: &config::LlmConfig,
) -> AgentResult<Arc<dyn ipuaro_llm::ChatProvider>> {
    let provider: Arc<dyn ipuaro_llm::ChatProvider> = match config.provider {
        ProviderKind::Ollama => Arc::new(
            ipuaro_llm::ollama::Ollama::new(
                config.host.as_deref(),
                &config.model,
                Some(config.temperature),
            )
            .map_err(|e| AgentError::Validation(e.to_string()))?,
        ),
        ProviderKind::Openai => Arc::new(
            ipuaro_llm::openai::OpenAi::new(
                config.api_base.as_deref(),
                config.api_key.as_deref(),
                &config.model,
                Some(config.temperature),
            )
            .map_err(|e| AgentError::Validation(e.to_string()))?,
        ),
    };
    Ok(provider)
}

/// Connect to the configured Redis instance and scope it to the project.
pub async fn connect_store(
    config: &config::RedisConfig,
    project: &str,
) -> AgentResult<IndexStore> {
    let kv = RedisKv::connect(&config.url())
        .await
        .map_err(AgentError::from)?;
    Ok(IndexStore::new(Arc::new(kv), project))
}
