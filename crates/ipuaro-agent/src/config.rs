//! `.ipuaro.json` configuration loading.
//!
//! Deserialization is strict: unknown keys anywhere in the document are
//! rejected, with serde's error naming the offending field and location.
//! Every section and field has a default so an empty object `{}` is a valid
//! config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AgentError, AgentResult};

pub const CONFIG_FILE_NAME: &str = ".ipuaro.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct Config {
    pub redis: RedisConfig,
    pub llm: LlmConfig,
    pub project: ProjectConfig,
    pub edit: EditConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
        }
    }
}

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    Openai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub temperature: f32,
    /// Ollama host, e.g. `http://127.0.0.1:11434`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// OpenAI-compatible base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Falls back to `OPENAI_API_KEY` when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            model: "qwen2.5-coder:7b".to_string(),
            temperature: 0.2,
            host: None,
            api_base: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ProjectConfig {
    pub ignore_patterns: Vec<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct EditConfig {
    pub auto_apply: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct DisplayConfig {
    pub show_stats: bool,
    pub show_tool_calls: bool,
    pub theme: Theme,
    pub bell_on_complete: bool,
    pub progress_bar: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_stats: true,
            show_tool_calls: true,
            theme: Theme::Dark,
            bell_on_complete: false,
            progress_bar: true,
        }
    }
}

/// Load the config file from `root`, or defaults when absent.
pub fn load_config(root: &Path) -> AgentResult<Config> {
    let path = root.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(&path)
        .map_err(|e| AgentError::Internal(format!("read {}: {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| AgentError::Validation(format!("{}: {e}", path.display())))
}

/// Write the default config. Refuses to overwrite an existing file unless
/// `force` is set. Returns the written path.
pub fn write_default_config(root: &Path, force: bool) -> AgentResult<PathBuf> {
    let path = root.join(CONFIG_FILE_NAME);
    if path.exists() && !force {
        return Err(AgentError::Conflict(format!(
            "{} already exists (use force to overwrite)",
            path.display()
        )));
    }
    let text = serde_json::to_string_pretty(&Config::default())
        .map_err(|e| AgentError::Internal(e.to_string()))?;
    std::fs::write(&path, text)
        .map_err(|e| AgentError::Internal(format!("write {}: {e}", path.display())))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_object_is_valid() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.redis.port, 6379);
        assert_eq!(cfg.llm.provider, ProviderKind::Ollama);
        assert!(!cfg.edit.auto_apply);
        assert_eq!(cfg.display.theme, Theme::Dark);
    }

    #[test]
    fn unknown_key_is_rejected_with_its_name() {
        let err = serde_json::from_str::<Config>(r#"{"llm":{"modle":"x"}}"#).unwrap_err();
        assert!(err.to_string().contains("modle"), "{err}");
    }

    #[test]
    fn camel_case_keys_parse() {
        let cfg: Config = serde_json::from_str(
            r#"{
                "llm": {"provider": "openai", "model": "gpt-4o-mini", "apiBase": "https://llm.local/v1"},
                "project": {"ignorePatterns": ["generated"]},
                "edit": {"autoApply": true},
                "display": {"showStats": false, "theme": "light"}
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.llm.provider, ProviderKind::Openai);
        assert_eq!(cfg.llm.api_base.as_deref(), Some("https://llm.local/v1"));
        assert_eq!(cfg.project.ignore_patterns, vec!["generated"]);
        assert!(cfg.edit.auto_apply);
        assert_eq!(cfg.display.theme, Theme::Light);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = load_config(dir.path()).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn init_writes_and_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = write_default_config(dir.path(), false).unwrap();
        assert!(path.exists());
        let loaded = load_config(dir.path()).unwrap();
        assert_eq!(loaded, Config::default());

        let err = write_default_config(dir.path(), false).unwrap_err();
        assert!(matches!(err, AgentError::Conflict(_)));
        assert!(write_default_config(dir.path(), true).is_ok());
    }

    #[test]
    fn redis_url_shape() {
        let cfg = RedisConfig::default();
        assert_eq!(cfg.url(), "redis://127.0.0.1:6379/");
    }
}
