//! Application configuration for askdocs.
//!
//! User config lives at `~/.askdocs/askdocs.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AskDocsError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "askdocs.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".askdocs";

// ---------------------------------------------------------------------------
// Config structs (matching askdocs.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Pipeline limits.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Text splitting parameters.
    #[serde(default)]
    pub split: SplitConfig,

    /// Embedding offload settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Message channel settings.
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Retrieval settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// OpenRouter settings for the answering model.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of documents accepted per run.
    #[serde(default = "default_max_documents")]
    pub max_documents: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_documents: default_max_documents(),
        }
    }
}

fn default_max_documents() -> usize {
    3
}

/// `[split]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Maximum characters per segment.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Characters of overlap carried between adjacent segments.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap: default_overlap(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap() -> usize {
    100
}

/// `[embedding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Maximum segments per published sub-batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Deadline for one embedding round-trip, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Vector dimension produced by the backend.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Number of concurrent embed workers in the local pool.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Optional OpenAI-compatible embeddings endpoint. When unset, the
    /// deterministic local backend is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Model requested from the embeddings endpoint.
    #[serde(default = "default_embed_model")]
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            dimension: default_dimension(),
            worker_count: default_worker_count(),
            endpoint: None,
            model: default_embed_model(),
        }
    }
}

impl EmbeddingConfig {
    /// The configured round-trip deadline as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_batch_size() -> usize {
    16
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_dimension() -> usize {
    384
}
fn default_worker_count() -> usize {
    2
}
fn default_embed_model() -> String {
    "text-embedding-3-small".into()
}

/// `[channel]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Topic carrying outbound embedding requests.
    #[serde(default = "default_request_topic")]
    pub request_topic: String,

    /// Topic carrying inbound embedding results.
    #[serde(default = "default_result_topic")]
    pub result_topic: String,

    /// Per-topic buffer capacity before slow subscribers lag.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            request_topic: default_request_topic(),
            result_topic: default_result_topic(),
            capacity: default_capacity(),
        }
    }
}

fn default_request_topic() -> String {
    "embeddings.requests".into()
}
fn default_result_topic() -> String {
    "embeddings.results".into()
}
fn default_capacity() -> usize {
    256
}

/// `[retrieval]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of segments handed to the answerer.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum cosine similarity for a segment to count as relevant.
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_min_score() -> f32 {
    0.1
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Default model used for answering.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Chat completions endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            endpoint: default_endpoint(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "moonshotai/kimi-k2.5".into()
}
fn default_endpoint() -> String {
    "https://openrouter.ai/api/v1/chat/completions".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.askdocs/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AskDocsError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.askdocs/askdocs.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AskDocsError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| AskDocsError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| AskDocsError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AskDocsError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AskDocsError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the OpenRouter API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(AskDocsError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}
