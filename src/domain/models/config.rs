//! Main configuration structure for Pentecter.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Pretty
    }
}

/// Logging configuration, mirroring the concerns (level, format, optional
/// file output) a session actually needs — no rotation/retention, since a
/// Pentecter session does not outlive a single process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    pub log_dir: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub enable_stdout: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            enable_stdout: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_true() -> bool {
    true
}

/// Top-level Pentecter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PentecterConfig {
    /// `ReconTree::max_parallel` for every target's tree.
    #[serde(default = "default_max_parallel_recon")]
    pub max_parallel_recon: usize,

    /// Default turn budget for a `SmartSubAgent` when its `SpawnTask`
    /// action doesn't specify one.
    #[serde(default = "default_max_sub_agent_turns")]
    pub max_sub_agent_turns: u32,

    /// Turn budget `ReconRunner` gives its web-recon sub-agents.
    #[serde(default = "default_web_recon_max_turns")]
    pub web_recon_max_turns: u32,

    /// Consecutive command failures before a `Loop` declares a stall.
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold: u32,

    /// Brain-call retry attempts per turn before the `Loop` gives up.
    #[serde(default = "default_think_retry_attempts")]
    pub think_retry_attempts: u32,

    /// Base backoff, doubled-ish per attempt (1s, 2s, ...).
    #[serde(default = "default_think_retry_base_ms")]
    pub think_retry_base_ms: u64,

    /// Root directory for persisted raw command output. `None` disables
    /// memory persistence.
    pub memory_dir: Option<PathBuf>,

    #[serde(default)]
    pub log: LogConfig,

    /// Commands run once at `Loop` startup (before the first turn),
    /// substituting `{target}` with the host.
    #[serde(default)]
    pub initial_scan_commands: Vec<String>,
}

const fn default_max_parallel_recon() -> usize {
    2
}

const fn default_max_sub_agent_turns() -> u32 {
    10
}

const fn default_web_recon_max_turns() -> u32 {
    50
}

const fn default_stall_threshold() -> u32 {
    3
}

const fn default_think_retry_attempts() -> u32 {
    3
}

const fn default_think_retry_base_ms() -> u64 {
    1000
}

impl Default for PentecterConfig {
    fn default() -> Self {
        Self {
            max_parallel_recon: default_max_parallel_recon(),
            max_sub_agent_turns: default_max_sub_agent_turns(),
            web_recon_max_turns: default_web_recon_max_turns(),
            stall_threshold: default_stall_threshold(),
            think_retry_attempts: default_think_retry_attempts(),
            think_retry_base_ms: default_think_retry_base_ms(),
            memory_dir: None,
            log: LogConfig::default(),
            initial_scan_commands: Vec::new(),
        }
    }
}
