//! Application configuration for seoscope.
//!
//! User config lives at `~/.seoscope/seoscope.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeoscopeError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "seoscope.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".seoscope";

// ---------------------------------------------------------------------------
// Config structs (matching seoscope.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Search-result provider settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Page fetcher settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Generative-text provider settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retry policy for network-bound calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Comparative analysis tuning.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Keyword priority weighting.
    #[serde(default)]
    pub priority: PriorityWeights,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Competing pages to research per keyword.
    #[serde(default = "default_result_count")]
    pub result_count: u32,

    /// Upper bound on planned keywords.
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,

    /// Keywords processed concurrently.
    #[serde(default = "default_keyword_concurrency")]
    pub keyword_concurrency: usize,

    /// Business vertical passed to the planner.
    #[serde(default = "default_vertical")]
    pub vertical: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            result_count: default_result_count(),
            max_keywords: default_max_keywords(),
            keyword_concurrency: default_keyword_concurrency(),
            vertical: default_vertical(),
        }
    }
}

fn default_result_count() -> u32 {
    10
}
fn default_max_keywords() -> usize {
    10
}
fn default_keyword_concurrency() -> usize {
    3
}
fn default_vertical() -> String {
    "general".into()
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Name of the env var holding the search API key (never store the key itself).
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Name of the env var holding the search engine id.
    #[serde(default = "default_search_cx_env")]
    pub cx_env: String,

    /// Search API endpoint.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Interface language hint.
    #[serde(default = "default_language")]
    pub language: String,

    /// Per-request search timeout.
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_search_key_env(),
            cx_env: default_search_cx_env(),
            endpoint: default_search_endpoint(),
            language: default_language(),
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_search_key_env() -> String {
    "GOOGLE_SEARCH_API_KEY".into()
}
fn default_search_cx_env() -> String {
    "GOOGLE_SEARCH_CX".into()
}
fn default_search_endpoint() -> String {
    "https://www.googleapis.com/customsearch/v1".into()
}
fn default_language() -> String {
    "en".into()
}
fn default_search_timeout() -> u64 {
    15
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-page fetch timeout.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Bodies larger than this are rejected.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Allow fetching loopback/private hosts.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_body_bytes: default_max_body_bytes(),
            allow_private_hosts: false,
        }
    }
}

fn default_fetch_timeout() -> u64 {
    10
}
fn default_max_body_bytes() -> usize {
    5 * 1024 * 1024
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-request timeout.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_llm_key_env(),
            api_base: default_api_base(),
            model: default_model(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
        }
    }
}

fn default_llm_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_api_base() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4.1-mini".into()
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_temperature() -> f32 {
    0.3
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            jitter: true,
        }
    }
}

fn default_max_retries() -> u32 {
    2
}
fn default_initial_backoff() -> u64 {
    250
}
fn default_max_backoff() -> u64 {
    4_000
}
fn default_true() -> bool {
    true
}

/// `[analysis]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Relative shortfall below the competitor median that counts as a gap.
    #[serde(default = "default_gap_threshold")]
    pub gap_threshold: f64,

    /// Characters of body text kept in each structure.
    #[serde(default = "default_body_excerpt_chars")]
    pub body_excerpt_chars: usize,

    /// Ask the text generator for prose commentary on gaps.
    #[serde(default)]
    pub gap_commentary: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            gap_threshold: default_gap_threshold(),
            body_excerpt_chars: default_body_excerpt_chars(),
            gap_commentary: false,
        }
    }
}

fn default_gap_threshold() -> f64 {
    0.2
}
fn default_body_excerpt_chars() -> usize {
    4_000
}

/// `[priority]` section: weights of the four planning factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityWeights {
    #[serde(default = "default_volume_weight")]
    pub search_volume: f64,
    #[serde(default = "default_conversion_weight")]
    pub conversion_proximity: f64,
    #[serde(default = "default_relevance_weight")]
    pub vertical_relevance: f64,
    #[serde(default = "default_investment_weight")]
    pub content_investment: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            search_volume: default_volume_weight(),
            conversion_proximity: default_conversion_weight(),
            vertical_relevance: default_relevance_weight(),
            content_investment: default_investment_weight(),
        }
    }
}

fn default_volume_weight() -> f64 {
    0.35
}
fn default_conversion_weight() -> f64 {
    0.25
}
fn default_relevance_weight() -> f64 {
    0.25
}
fn default_investment_weight() -> f64 {
    0.15
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.seoscope/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| SeoscopeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.seoscope/seoscope.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| SeoscopeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SeoscopeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SeoscopeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SeoscopeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SeoscopeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a non-empty secret from the named env var.
pub fn env_secret(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}

/// Resolve the search API key and engine id, or explain which var is missing.
pub fn search_credentials(config: &AppConfig) -> Result<(String, String)> {
    let key = env_secret(&config.search.api_key_env).ok_or_else(|| {
        SeoscopeError::config(format!(
            "search API key not found. Set the {} environment variable.",
            config.search.api_key_env
        ))
    })?;
    let cx = env_secret(&config.search.cx_env).ok_or_else(|| {
        SeoscopeError::config(format!(
            "search engine id not found. Set the {} environment variable.",
            config.search.cx_env
        ))
    })?;
    Ok((key, cx))
}
