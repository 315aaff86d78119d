use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub lorevat: LorevatConfig,
    pub wiki: WikiConfig,
    pub chunking: ChunkingConfig,
    pub embeddings: EmbeddingsConfig,
    pub index: IndexConfig,
}

/// Pipeline-wide configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LorevatConfig {
    /// Root directory for pipeline state: page logs under `interim/`,
    /// chunk logs under `jsonl/`, summary stores under `interim/summaries/`.
    pub data_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Wiki source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WikiConfig {
    pub base_url: String,
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Requests per second ceiling; 0 disables the rate gate.
    #[serde(default = "default_rate_limit_rps")]
    pub rate_limit_rps: f64,
}

/// Chunk windowing configuration (~4 chars per token).
///
/// Budgets are counted in UTF-8 bytes: multibyte-heavy text splits earlier
/// than `chunk_size` characters, never later, so a window always fits the
/// token budget the size was derived from.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

/// Embeddings configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub batch_size: usize,
    pub dimensions: usize,
}

/// Vector index configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    /// Index host URL, e.g. "https://lore-xxxx.svc.us-east-1.pinecone.io"
    pub host: String,
    pub api_key_env: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> usize {
    5
}

fn default_rate_limit_rps() -> f64 {
    2.0
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in LOREVAT_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let config_path = std::env::var("LOREVAT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .context("Failed to parse config.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.wiki.base_url.trim().is_empty() {
            anyhow::bail!("wiki.base_url must not be empty");
        }

        if !self.wiki.base_url.starts_with("http://") && !self.wiki.base_url.starts_with("https://")
        {
            anyhow::bail!("wiki.base_url must be an http(s) URL: {}", self.wiki.base_url);
        }

        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be greater than 0");
        }

        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            anyhow::bail!("chunking.chunk_overlap must be less than chunk_size");
        }

        if self.embeddings.batch_size == 0 {
            anyhow::bail!("embeddings.batch_size must be greater than 0");
        }

        if self.embeddings.dimensions == 0 {
            anyhow::bail!("embeddings.dimensions must be greater than 0");
        }

        if self.wiki.rate_limit_rps < 0.0 {
            anyhow::bail!("wiki.rate_limit_rps must not be negative");
        }

        Ok(())
    }

    /// Resolve a required credential for the embed stage.
    ///
    /// Missing credentials are fatal at stage start; the harvest and chunk
    /// stages never call this, so they run without any keys configured.
    pub fn require_env(&self, var: &str) -> Result<String> {
        std::env::var(var).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                var
            )
        })
    }

    /// Directory holding per-category page logs (NDJSON)
    pub fn interim_dir(&self) -> PathBuf {
        self.lorevat.data_dir.join("interim")
    }

    /// Directory holding per-corpus chunk logs (JSONL)
    pub fn jsonl_dir(&self) -> PathBuf {
        self.lorevat.data_dir.join("jsonl")
    }

    /// Directory holding derived summary stores
    pub fn summaries_dir(&self) -> PathBuf {
        self.interim_dir().join("summaries")
    }

    /// Progress ledger path (already-embedded chunk ids, one per line)
    pub fn progress_file(&self) -> PathBuf {
        self.interim_dir().join("embedding_progress.txt")
    }

    /// Root data directory
    pub fn data_dir(&self) -> &Path {
        &self.lorevat.data_dir
    }
}
