//! Configuration for the makercheck pipeline.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (MAKERCHECK_HOME, MAKERCHECK_MODEL_URL,
//!    MAKERCHECK_SEARCH_URL, MAKERCHECK_API_KEY)
//! 2. Config file (.makercheck/config.yaml)
//! 3. Defaults (~/.makercheck, pipeline defaults below)
//!
//! Config file discovery searches the current directory and parents for
//! .makercheck/config.yaml. The API key is env-only; it has no config
//! file field.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::retry::RetryPolicy;

/// Tunables of the orchestration state machine.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum additional Maker invocations triggered by Checker
    /// rejection (default: 1). Zero disables refinement entirely.
    #[serde(default = "default_refine_limit")]
    pub refine_limit: u32,

    /// Per-capability-call deadline in seconds (default: 30)
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_seconds: u64,

    /// Transient-retry policy for backend calls
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Whether the soft irrelevance category blocks on its own
    /// (default: false, annotate only)
    #[serde(default)]
    pub irrelevance_blocks: bool,

    /// Character budget for audit-trail snapshots (default: 480)
    #[serde(default = "default_snapshot_max_chars")]
    pub snapshot_max_chars: usize,

    /// Passages requested per retrieval (default: 5)
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_refine_limit() -> u32 {
    1
}
fn default_stage_timeout() -> u64 {
    30
}
fn default_snapshot_max_chars() -> usize {
    480
}
fn default_top_k() -> usize {
    5
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            refine_limit: default_refine_limit(),
            stage_timeout_seconds: default_stage_timeout(),
            retry: RetryPolicy::default(),
            irrelevance_blocks: false,
            snapshot_max_chars: default_snapshot_max_chars(),
            top_k: default_top_k(),
        }
    }
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_seconds)
    }
}

/// Backend wiring.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendsConfig {
    /// HTTP model endpoint. Takes precedence over the local binary.
    pub model_url: Option<String>,

    /// Model name forwarded to the HTTP endpoint
    pub model_name: Option<String>,

    /// HTTP search endpoint; absent means the static retriever
    pub search_url: Option<String>,

    /// Local model binary for subprocess mode
    pub model_binary: Option<String>,

    /// Extra arguments for the model binary
    #[serde(default)]
    pub model_args: Vec<String>,

    /// YAML file of `{source_id, text}` passages for the static
    /// retriever (relative paths resolve against the config file)
    pub corpus_file: Option<String>,
}

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// Home directory override (relative to the config file's project
    /// root)
    pub home: Option<String>,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub backends: BackendsConfig,
}

/// Resolved configuration with absolute paths and env overrides applied.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to makercheck home (persisted trails live under
    /// `<home>/runs`)
    pub home: PathBuf,

    pub pipeline: PipelineConfig,
    pub backends: BackendsConfig,

    /// Bearer token for the HTTP model endpoint (env-only)
    pub api_key: Option<String>,

    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Directory holding persisted audit trails.
    pub fn runs_dir(&self) -> PathBuf {
        self.home.join("runs")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".makercheck").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to a base directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path_str)
    }
}

/// Load configuration from all sources.
pub fn load() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("failed to determine home directory")?
        .join(".makercheck");

    let config_file = find_config_file();

    let (file_cfg, base_dir) = match &config_file {
        Some(path) => {
            let cfg = load_config_file(path)?;
            // Project root: parent of the .makercheck/ directory.
            let base = path
                .parent()
                .and_then(|p| p.parent())
                .unwrap_or(Path::new("."))
                .to_path_buf();
            (cfg, base)
        }
        None => (ConfigFile::default(), PathBuf::from(".")),
    };

    let home = if let Ok(env_home) = std::env::var("MAKERCHECK_HOME") {
        PathBuf::from(env_home)
    } else if let Some(ref home) = file_cfg.home {
        resolve_path(&base_dir, home)
    } else {
        default_home
    };

    let mut backends = file_cfg.backends;
    if let Ok(url) = std::env::var("MAKERCHECK_MODEL_URL") {
        backends.model_url = Some(url);
    }
    if let Ok(url) = std::env::var("MAKERCHECK_SEARCH_URL") {
        backends.search_url = Some(url);
    }
    if let Some(corpus) = backends.corpus_file.take() {
        backends.corpus_file = Some(resolve_path(&base_dir, &corpus).display().to_string());
    }

    let api_key = std::env::var("MAKERCHECK_API_KEY").ok();

    Ok(ResolvedConfig {
        home,
        pipeline: file_cfg.pipeline,
        backends,
        api_key,
        config_file,
    })
}
