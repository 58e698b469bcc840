//! Loopboard configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::state::StoreConfig;
use crate::supervisor::{AgentCommand, DEFAULT_LOG_CAP, SupervisorConfig};
use crate::worktree::ProvisionerConfig;

/// Main Loopboard configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ticket persistence
    pub store: StoreSection,

    /// External agent process
    pub agent: AgentConfig,

    /// Workspace provisioning
    pub worktree: WorktreeConfig,

    /// PRD generation
    pub prd: PrdConfig,

    /// Status event logging
    pub events: EventsConfig,

    /// Directory with `.pmt` files overriding the embedded templates
    #[serde(rename = "templates-dir")]
    pub templates_dir: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .loopboard.yml
        let local_config = PathBuf::from(".loopboard.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/loopboard/loopboard.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("loopboard").join("loopboard.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Ticket store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Path of the JSON snapshot
    pub path: PathBuf,

    /// Delay between a mutation and the snapshot write
    #[serde(rename = "flush-debounce-ms")]
    pub flush_debounce_ms: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/loopboard on Linux)
        let path = dirs::data_local_dir()
            .map(|d| d.join("loopboard"))
            .unwrap_or_else(|| PathBuf::from(".loopboard"))
            .join("tickets.json");

        Self {
            path,
            flush_debounce_ms: 500,
        }
    }
}

impl StoreSection {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            path: self.path.clone(),
            flush_debounce: Duration::from_millis(self.flush_debounce_ms),
        }
    }
}

/// Agent process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Program to run inside the workspace
    pub command: String,

    /// Arguments passed to the program
    pub args: Vec<String>,

    /// Delay between SIGTERM and SIGKILL when stopping
    #[serde(rename = "grace-period-ms")]
    pub grace_period_ms: u64,

    /// Characters of output kept per run
    #[serde(rename = "log-cap")]
    pub log_cap: usize,

    /// Hidden directory in the workspace holding the prompt
    #[serde(rename = "prompt-dir")]
    pub prompt_dir: String,

    #[serde(rename = "prompt-file")]
    pub prompt_file: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            args: vec!["--print".to_string()],
            grace_period_ms: 500,
            log_cap: DEFAULT_LOG_CAP,
            prompt_dir: ".loopboard".to_string(),
            prompt_file: "PROMPT.md".to_string(),
        }
    }
}

impl AgentConfig {
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            command: AgentCommand::new(self.command.clone(), self.args.clone()),
            grace_period: Duration::from_millis(self.grace_period_ms),
            log_cap: self.log_cap,
            prompt_dir: self.prompt_dir.clone(),
            prompt_file: self.prompt_file.clone(),
        }
    }
}

/// Workspace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorktreeConfig {
    /// Base directory for tickets that have none of their own
    #[serde(rename = "default-base-dir")]
    pub default_base_dir: Option<PathBuf>,

    /// Manifest written at the workspace root
    #[serde(rename = "manifest-file")]
    pub manifest_file: String,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            default_base_dir: None,
            manifest_file: "TICKET.md".to_string(),
        }
    }
}

impl WorktreeConfig {
    pub fn provisioner_config(&self) -> ProvisionerConfig {
        ProvisionerConfig {
            manifest_file: self.manifest_file.clone(),
        }
    }
}

/// How PRDs are produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrdGeneratorKind {
    /// Render from ticket fields
    #[default]
    Template,
    /// Ask an external command
    Command,
}

/// PRD generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrdConfig {
    pub generator: PrdGeneratorKind,

    /// Argv of the generator command; the request arrives on stdin
    pub command: Vec<String>,

    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for PrdConfig {
    fn default() -> Self {
        Self {
            generator: PrdGeneratorKind::Template,
            command: vec!["claude".to_string(), "--print".to_string()],
            timeout_ms: 120_000,
        }
    }
}

/// Status event logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Directory for per-ticket `status.jsonl` files; disabled when unset
    #[serde(rename = "log-dir")]
    pub log_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.store.path.ends_with("tickets.json"));
        assert_eq!(config.store.flush_debounce_ms, 500);
        assert_eq!(config.agent.command, "claude");
        assert_eq!(config.agent.grace_period_ms, 500);
        assert_eq!(config.agent.log_cap, 10_000);
        assert_eq!(config.worktree.manifest_file, "TICKET.md");
        assert_eq!(config.prd.generator, PrdGeneratorKind::Template);
        assert!(config.events.log_dir.is_none());
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
store:
  path: /tmp/board.json
  flush-debounce-ms: 50

agent:
  command: sh
  args: ["-c", "cat"]
  grace-period-ms: 100
  log-cap: 2000
  prompt-dir: .agent

worktree:
  default-base-dir: /srv/work
  manifest-file: README.md

prd:
  generator: command
  command: ["llm", "-m", "small"]
  timeout-ms: 1000

events:
  log-dir: /tmp/events

templates-dir: /etc/loopboard/templates
log-level: DEBUG
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.store.path, PathBuf::from("/tmp/board.json"));
        assert_eq!(config.store.store_config().flush_debounce, Duration::from_millis(50));

        let supervisor = config.agent.supervisor_config();
        assert_eq!(supervisor.command.program, "sh");
        assert_eq!(supervisor.command.args, vec!["-c", "cat"]);
        assert_eq!(supervisor.grace_period, Duration::from_millis(100));
        assert_eq!(supervisor.log_cap, 2000);
        assert_eq!(supervisor.prompt_dir, ".agent");
        // Unset keys keep their defaults
        assert_eq!(supervisor.prompt_file, "PROMPT.md");

        assert_eq!(config.worktree.default_base_dir, Some(PathBuf::from("/srv/work")));
        assert_eq!(config.worktree.provisioner_config().manifest_file, "README.md");
        assert_eq!(config.prd.generator, PrdGeneratorKind::Command);
        assert_eq!(config.prd.command, vec!["llm", "-m", "small"]);
        assert_eq!(config.prd.timeout_ms, 1000);
        assert_eq!(config.events.log_dir, Some(PathBuf::from("/tmp/events")));
        assert_eq!(config.templates_dir, Some(PathBuf::from("/etc/loopboard/templates")));
        assert_eq!(config.log_level.as_deref(), Some("DEBUG"));
    }

    #[test]
    fn test_partial_config() {
        let config: Config = serde_yaml::from_str("agent:\n  command: codex\n").unwrap();
        assert_eq!(config.agent.command, "codex");
        assert_eq!(config.agent.args, vec!["--print"]);
        assert_eq!(config.store.flush_debounce_ms, 500);
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("custom.yml");
        fs::write(&path, "log-level: WARN\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("WARN"));
    }

    #[test]
    fn test_load_explicit_path_missing() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("missing.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
