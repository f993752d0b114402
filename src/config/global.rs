//! Global configuration.
//!
//! Loaded from ~/.config/ralphloop/ralphloop.yml or .ralphloop.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ralphloop::process::AgentCommand;
use ralphloop::runner::EngineConfig;

/// Global configuration for ralphloop.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Agent binary and flags.
    pub agent: AgentConfig,

    /// Run loop settings.
    pub engine: EngineSettings,

    /// Rate-limit backoff.
    #[serde(rename = "rate-limit")]
    pub rate_limit: RateLimitConfig,

    /// Usage statistics persistence.
    pub stats: StatsConfig,

    /// Log level when RUST_LOG is unset.
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl GlobalConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .ralphloop.yml in current directory
    /// 3. ~/.config/ralphloop/ralphloop.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(".ralphloop.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .ralphloop.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .ralphloop.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("ralphloop").join("ralphloop.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.agent.command.trim().is_empty() {
            eyre::bail!("agent.command must not be empty");
        }
        if self.engine.queue_capacity == 0 {
            eyre::bail!("engine.queue-capacity must be > 0");
        }
        if self.engine.max_line_bytes == 0 {
            eyre::bail!("engine.max-line-bytes must be > 0");
        }
        Ok(())
    }

    /// Command line for the agent process
    pub fn agent_command(&self) -> AgentCommand {
        AgentCommand::new(self.agent.command.clone())
            .with_args(self.agent.args.clone())
            .with_model(self.agent.model.clone())
    }

    /// Engine tunables
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            sleep_between: Duration::from_millis(self.engine.sleep_ms),
            queue_capacity: self.engine.queue_capacity,
            max_line_bytes: self.engine.max_line_bytes,
            drain_timeout: Duration::from_millis(self.engine.drain_timeout_ms),
        }
    }

    /// Where usage statistics live
    pub fn stats_path(&self) -> PathBuf {
        self.stats.path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ralphloop")
                .join("stats.json")
        })
    }
}

/// Agent binary settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Binary to run each iteration.
    pub command: String,

    /// Extra flags appended after the built-in ones.
    pub args: Vec<String>,

    /// Passed as --model when set.
    pub model: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            args: Vec::new(),
            model: None,
        }
    }
}

/// Run loop settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Default number of iterations.
    pub iterations: u32,

    /// Pause between iterations in milliseconds.
    #[serde(rename = "sleep-ms")]
    pub sleep_ms: u64,

    /// Signal queue capacity.
    #[serde(rename = "queue-capacity")]
    pub queue_capacity: usize,

    /// Longest accepted output line.
    #[serde(rename = "max-line-bytes")]
    pub max_line_bytes: usize,

    /// Wait for output readers after a kill, in milliseconds.
    #[serde(rename = "drain-timeout-ms")]
    pub drain_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            iterations: 1,
            sleep_ms: 2000,
            queue_capacity: 100,
            max_line_bytes: 10 * 1024 * 1024,
            drain_timeout_ms: 5000,
        }
    }
}

/// Rate-limit backoff.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Hibernation length when a rejection has no reset time.
    #[serde(rename = "default-backoff-secs")]
    pub default_backoff_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_backoff_secs: 300,
        }
    }
}

impl RateLimitConfig {
    pub fn default_backoff(&self) -> Duration {
        Duration::from_secs(self.default_backoff_secs)
    }
}

/// Usage statistics persistence.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Stats file; defaults under the local data dir.
    pub path: Option<PathBuf>,

    /// Whether to save stats on exit.
    pub enabled: bool,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            path: None,
            enabled: true,
        }
    }
}
