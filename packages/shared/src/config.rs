//! Application configuration for vidlore.
//!
//! User config lives at `~/.vidlore/vidlore.toml`. Absent file or absent
//! fields fall back to defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VidloreError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "vidlore.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".vidlore";

// ---------------------------------------------------------------------------
// Config structs (matching vidlore.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Local generative-service (Ollama) settings.
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Transcript fetching settings.
    #[serde(default)]
    pub transcripts: TranscriptsConfig,

    /// Curation thresholds.
    #[serde(default)]
    pub curation: CurationConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.vidlore/vidlore.db".into()
}

/// `[ollama]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server.
    #[serde(default = "default_ollama_url")]
    pub url: String,

    /// Model used for extraction, bias scanning, and curation.
    #[serde(default = "default_model")]
    pub model: String,

    /// Target words per transcript chunk.
    #[serde(default = "default_chunk_target_words")]
    pub chunk_target_words: usize,

    /// Trailing words carried into the next chunk for context.
    #[serde(default = "default_chunk_overlap_words")]
    pub chunk_overlap_words: usize,

    /// Maximum retries after the initial attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff, in seconds.
    #[serde(default = "default_retry_base_delay_secs")]
    pub retry_base_delay_secs: f64,

    /// Cap on any single backoff delay, in seconds.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: f64,

    /// Per-request timeout, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_model(),
            chunk_target_words: default_chunk_target_words(),
            chunk_overlap_words: default_chunk_overlap_words(),
            max_retries: default_max_retries(),
            retry_base_delay_secs: default_retry_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".into()
}
fn default_model() -> String {
    "qwen2.5:14b".into()
}
fn default_chunk_target_words() -> usize {
    2000
}
fn default_chunk_overlap_words() -> usize {
    100
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_secs() -> f64 {
    2.0
}
fn default_max_delay_secs() -> f64 {
    60.0
}
fn default_request_timeout_secs() -> u64 {
    300
}

/// `[transcripts]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptsConfig {
    /// Language codes tried in order when fetching transcripts.
    #[serde(default = "default_preferred_languages")]
    pub preferred_languages: Vec<String>,
}

impl Default for TranscriptsConfig {
    fn default() -> Self {
        Self {
            preferred_languages: default_preferred_languages(),
        }
    }
}

fn default_preferred_languages() -> Vec<String> {
    vec!["en".into(), "en-US".into(), "en-GB".into()]
}

/// `[curation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationConfig {
    /// Entries per bias-scan batch.
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,

    /// Entries per category/tag fill batch.
    #[serde(default = "default_fill_batch_size")]
    pub fill_batch_size: usize,

    /// Analyzed videos with fewer entries than this are re-ingest candidates.
    #[serde(default = "default_min_entries")]
    pub min_entries: i64,

    /// Analyzed videos with lower average confidence are re-ingest candidates.
    #[serde(default = "default_min_avg_confidence")]
    pub min_avg_confidence: f64,

    /// Entries below this confidence are deletion candidates...
    #[serde(default = "default_garbage_confidence")]
    pub garbage_confidence: f64,

    /// ...when their content is also shorter than this many characters.
    #[serde(default = "default_garbage_content_len")]
    pub garbage_content_len: i64,

    /// Cap on any single corroboration confidence boost.
    #[serde(default = "default_max_boost")]
    pub max_boost: f64,

    /// Boost contributed per distinct corroborating video.
    #[serde(default = "default_boost_per_video")]
    pub boost_per_video: f64,

    /// Boosted confidence never exceeds this ceiling.
    #[serde(default = "default_confidence_ceiling")]
    pub confidence_ceiling: f64,

    /// Advisor conversation history cap, in question/answer exchanges.
    #[serde(default = "default_max_history_exchanges")]
    pub max_history_exchanges: usize,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            scan_batch_size: default_scan_batch_size(),
            fill_batch_size: default_fill_batch_size(),
            min_entries: default_min_entries(),
            min_avg_confidence: default_min_avg_confidence(),
            garbage_confidence: default_garbage_confidence(),
            garbage_content_len: default_garbage_content_len(),
            max_boost: default_max_boost(),
            boost_per_video: default_boost_per_video(),
            confidence_ceiling: default_confidence_ceiling(),
            max_history_exchanges: default_max_history_exchanges(),
        }
    }
}

fn default_scan_batch_size() -> usize {
    15
}
fn default_fill_batch_size() -> usize {
    10
}
fn default_min_entries() -> i64 {
    3
}
fn default_min_avg_confidence() -> f64 {
    0.5
}
fn default_garbage_confidence() -> f64 {
    0.3
}
fn default_garbage_content_len() -> i64 {
    50
}
fn default_max_boost() -> f64 {
    0.15
}
fn default_boost_per_video() -> f64 {
    0.05
}
fn default_confidence_ceiling() -> f64 {
    0.95
}
fn default_max_history_exchanges() -> usize {
    10
}

// ---------------------------------------------------------------------------
// Runtime configs (derived views handed to individual components)
// ---------------------------------------------------------------------------

/// Runtime chunking parameters.
#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    pub target_words: usize,
    pub overlap_words: usize,
}

impl From<&AppConfig> for ChunkConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            target_words: config.ollama.chunk_target_words,
            overlap_words: config.ollama.chunk_overlap_words,
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_words: default_chunk_target_words(),
            overlap_words: default_chunk_overlap_words(),
        }
    }
}

/// Runtime backoff parameters.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_secs: f64,
    pub max_delay_secs: f64,
}

impl From<&AppConfig> for RetryConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_retries: config.ollama.max_retries,
            base_delay_secs: config.ollama.retry_base_delay_secs,
            max_delay_secs: config.ollama.max_delay_secs,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_secs: default_retry_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

/// Runtime curation thresholds.
#[derive(Debug, Clone, Copy)]
pub struct CurationThresholds {
    pub scan_batch_size: usize,
    pub fill_batch_size: usize,
    pub min_entries: i64,
    pub min_avg_confidence: f64,
    pub garbage_confidence: f64,
    pub garbage_content_len: i64,
    pub max_boost: f64,
    pub boost_per_video: f64,
    pub confidence_ceiling: f64,
}

impl From<&AppConfig> for CurationThresholds {
    fn from(config: &AppConfig) -> Self {
        let c = &config.curation;
        Self {
            scan_batch_size: c.scan_batch_size,
            fill_batch_size: c.fill_batch_size,
            min_entries: c.min_entries,
            min_avg_confidence: c.min_avg_confidence,
            garbage_confidence: c.garbage_confidence,
            garbage_content_len: c.garbage_content_len,
            max_boost: c.max_boost,
            boost_per_video: c.boost_per_video,
            confidence_ceiling: c.confidence_ceiling,
        }
    }
}

impl Default for CurationThresholds {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.vidlore/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| VidloreError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.vidlore/vidlore.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| VidloreError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| VidloreError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| VidloreError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| VidloreError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| VidloreError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
