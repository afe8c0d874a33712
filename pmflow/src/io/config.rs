//! Flow configuration stored in `pmflow.toml`, plus secrets from the environment.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::invariants::DEFAULT_MIN_CARDS;

/// Flow configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the values
/// the flow was tuned with. Credentials never live here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct PmflowConfig {
    pub llm: LlmConfig,
    pub board: BoardConfig,
    pub search: SearchConfig,
    pub engine: EngineConfig,
    pub flow: FlowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LlmConfig {
    /// Model for research and planning agents.
    pub model: String,
    /// Model for the board-writing agent in `agent` execution mode.
    pub execution_model: String,
    /// OpenAI-compatible API root (no trailing `/chat/completions`).
    pub base_url: String,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            execution_model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            max_tokens: 4096,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BoardConfig {
    pub base_url: String,
    /// Per-call timeout for board requests.
    pub request_timeout_secs: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.trello.com/1".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    pub base_url: String,
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://google.serper.dev".to_string(),
            max_results: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum model calls per task.
    pub max_agent_steps: u32,
    /// Wall-clock budget per task in seconds.
    pub agent_timeout_secs: u64,
    /// Per-call budget for tool invocations in seconds.
    pub tool_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_agent_steps: 25,
            agent_timeout_secs: 10 * 60,
            tool_timeout_secs: 30,
        }
    }
}

/// How card specifications are turned into board entities.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Deterministic card → checklist → items → labels sequence.
    #[default]
    Direct,
    /// An agent drives the board tools for each card.
    Agent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FlowConfig {
    /// Maximum card executions in flight at once.
    pub execution_concurrency: usize,
    pub min_card_specs: usize,
    pub checklist_name: String,
    pub execution_mode: ExecutionMode,
    /// Ask the coordinator agent whether to research; otherwise use the
    /// description-length heuristic.
    pub research_coordinator: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            execution_concurrency: 2,
            min_card_specs: DEFAULT_MIN_CARDS,
            checklist_name: "Acceptance Criteria".to_string(),
            execution_mode: ExecutionMode::Direct,
            research_coordinator: true,
        }
    }
}

impl PmflowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() || self.llm.execution_model.trim().is_empty() {
            return Err(anyhow!("llm.model and llm.execution_model must be non-empty"));
        }
        if self.llm.base_url.trim().is_empty() {
            return Err(anyhow!("llm.base_url must be non-empty"));
        }
        if self.llm.max_tokens == 0 {
            return Err(anyhow!("llm.max_tokens must be > 0"));
        }
        if self.llm.request_timeout_secs == 0 {
            return Err(anyhow!("llm.request_timeout_secs must be > 0"));
        }
        if self.board.base_url.trim().is_empty() {
            return Err(anyhow!("board.base_url must be non-empty"));
        }
        if self.board.request_timeout_secs == 0 {
            return Err(anyhow!("board.request_timeout_secs must be > 0"));
        }
        if self.search.max_results == 0 {
            return Err(anyhow!("search.max_results must be > 0"));
        }
        if self.engine.max_agent_steps == 0 {
            return Err(anyhow!("engine.max_agent_steps must be > 0"));
        }
        if self.engine.agent_timeout_secs == 0 || self.engine.tool_timeout_secs == 0 {
            return Err(anyhow!(
                "engine.agent_timeout_secs and engine.tool_timeout_secs must be > 0"
            ));
        }
        if self.flow.execution_concurrency == 0 {
            return Err(anyhow!("flow.execution_concurrency must be > 0"));
        }
        if self.flow.checklist_name.trim().is_empty() {
            return Err(anyhow!("flow.checklist_name must be non-empty"));
        }
        Ok(())
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.agent_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.tool_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PmflowConfig::default()`.
pub fn load_config(path: &Path) -> Result<PmflowConfig> {
    if !path.exists() {
        let cfg = PmflowConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PmflowConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PmflowConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

/// API credentials read from the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub openai_api_key: String,
    pub board_api_key: String,
    pub board_api_token: String,
    pub serper_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("serper_api_key", &self.serper_api_key.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Read `OPENAI_API_KEY`, `TRELLO_API_KEY`, `TRELLO_API_TOKEN` and the
    /// optional `SERPER_API_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| anyhow!("missing environment variable {key}"))
        };
        Ok(Self {
            openai_api_key: required("OPENAI_API_KEY")?,
            board_api_key: required("TRELLO_API_KEY")?,
            board_api_token: required("TRELLO_API_TOKEN")?,
            serper_api_key: lookup("SERPER_API_KEY")
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        })
    }
}
