use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::search::Strategy;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Retrieval and ranking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of results to return
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Strategy families run for every query variant
    #[serde(default = "Strategy::default_set")]
    pub strategies: Vec<Strategy>,

    /// RRF k constant (higher = smoother rank influence)
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,

    /// Each strategy run returns `top_k * candidate_multiplier` results
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,

    /// Rerank fused candidates against the original query embedding
    #[serde(default = "default_true")]
    pub enable_rerank: bool,

    /// Weight of the rerank similarity in the final score (0.0 - 1.0)
    #[serde(default = "default_rerank_weight")]
    pub rerank_weight: f32,

    /// Ask the query expander for paraphrases
    #[serde(default = "default_true")]
    pub enable_expansion: bool,

    /// Maximum paraphrases used in addition to the original query
    #[serde(default = "default_max_variants")]
    pub max_variants: usize,

    /// Maximum number of strategy runs executing at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-run timeout in milliseconds (None = no timeout)
    #[serde(default)]
    pub run_timeout_ms: Option<u64>,

    /// BM25 term-frequency saturation
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f32,

    /// BM25 length normalization
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            strategies: Strategy::default_set(),
            rrf_k: default_rrf_k(),
            candidate_multiplier: default_candidate_multiplier(),
            enable_rerank: true,
            rerank_weight: default_rerank_weight(),
            enable_expansion: true,
            max_variants: default_max_variants(),
            max_concurrency: default_max_concurrency(),
            run_timeout_ms: None,
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
        }
    }
}

impl SearchConfig {
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }
}

fn default_top_k() -> usize {
    10
}

fn default_rrf_k() -> f32 {
    60.0
}

fn default_candidate_multiplier() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_rerank_weight() -> f32 {
    0.7
}

fn default_max_variants() -> usize {
    3
}

fn default_max_concurrency() -> usize {
    num_cpus::get()
}

fn default_bm25_k1() -> f32 {
    1.5
}

fn default_bm25_b() -> f32 {
    0.75
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write logs to rolling files
    #[serde(default)]
    pub enabled: bool,

    /// Write logs to stderr
    #[serde(default = "default_true")]
    pub stderr: bool,

    /// File log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log directory, relative paths resolve against the base directory
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,

    /// Log file name prefix
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Rotation: minutely, hourly, daily, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            stderr: true,
            level: default_log_level(),
            directory: default_log_directory(),
            file_prefix: default_file_prefix(),
            rotation: default_rotation(),
        }
    }
}

fn default_log_level() -> String {
    "debug".to_string()
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_file_prefix() -> String {
    "hybrid-rank.log".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults if it is missing
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;

            Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", path))
        } else {
            Ok(Config::default())
        }
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as TOML, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        Ok(())
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        let search = &self.search;
        if search.strategies.is_empty() {
            bail!("search.strategies must name at least one strategy");
        }
        for (position, strategy) in search.strategies.iter().enumerate() {
            if search.strategies[..position].contains(strategy) {
                bail!("search.strategies lists {} more than once", strategy);
            }
        }
        if !(search.rrf_k > 0.0 && search.rrf_k.is_finite()) {
            bail!("search.rrf_k must be positive, got {}", search.rrf_k);
        }
        if !(0.0..=1.0).contains(&search.rerank_weight) {
            bail!(
                "search.rerank_weight must be within [0, 1], got {}",
                search.rerank_weight
            );
        }
        if search.candidate_multiplier == 0 {
            bail!("search.candidate_multiplier must be at least 1");
        }
        if search.max_concurrency == 0 {
            bail!("search.max_concurrency must be at least 1");
        }
        if search.bm25_k1 < 0.0 || !(0.0..=1.0).contains(&search.bm25_b) {
            bail!(
                "search.bm25_k1 must be non-negative and search.bm25_b within [0, 1], got k1={} b={}",
                search.bm25_k1,
                search.bm25_b
            );
        }
        Ok(())
    }
}
