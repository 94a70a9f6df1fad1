//! Application configuration for seedcrawl.
//!
//! User config lives at `~/.seedcrawl/seedcrawl.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeedcrawlError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "seedcrawl.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".seedcrawl";

// ---------------------------------------------------------------------------
// Config structs (matching seedcrawl.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Fetcher behaviour.
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default directory for crawled pages.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Maximum number of seed documents fetched at once.
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,

    /// Replace page ids with random surrogates when persisting.
    #[serde(default)]
    pub obfuscate: bool,

    /// Also write a `.txt` sibling holding the page content.
    #[serde(default)]
    pub also_write_text: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_workers: default_max_workers(),
            obfuscate: false,
            also_write_text: false,
        }
    }
}

fn default_output_dir() -> String {
    "data/crawled".into()
}
fn default_max_workers() -> u32 {
    10
}

/// What the expander does when fetching one seed fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchErrorPolicy {
    /// Record the failure and keep going with the other seeds.
    #[default]
    Skip,
    /// Cancel outstanding fetches and fail the whole expansion.
    Abort,
}

impl std::str::FromStr for FetchErrorPolicy {
    type Err = SeedcrawlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            other => Err(SeedcrawlError::config(format!(
                "unknown fetch error policy '{other}' (expected 'skip' or 'abort')"
            ))),
        }
    }
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout in seconds; 0 disables it.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Time limit for all of one seed's requests together; 0 disables it.
    #[serde(default)]
    pub seed_timeout_secs: u64,

    /// Requests in flight at once for the links of a single seed.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Upper bound on child links followed per document.
    #[serde(default = "default_max_links")]
    pub max_links_per_page: usize,

    /// Failure policy for a single seed.
    #[serde(default)]
    pub on_error: FetchErrorPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            seed_timeout_secs: 0,
            max_concurrent_requests: default_max_concurrent_requests(),
            max_links_per_page: default_max_links(),
            on_error: FetchErrorPolicy::Skip,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_concurrent_requests() -> usize {
    5
}
fn default_max_links() -> usize {
    50
}

// ---------------------------------------------------------------------------
// Crawl config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum seeds fetched concurrently.
    pub max_workers: u32,
    /// Per-request timeout in seconds (0 = none).
    pub timeout_secs: u64,
    /// Whole-seed timeout in seconds (0 = none).
    pub seed_timeout_secs: u64,
    /// Concurrent requests per seed.
    pub max_concurrent_requests: usize,
    /// Child links followed per document.
    pub max_links_per_page: usize,
    /// Failure policy for a single seed.
    pub on_fetch_error: FetchErrorPolicy,
    /// Obfuscate page ids on persist.
    pub obfuscate: bool,
    /// Write `.txt` siblings on persist.
    pub also_write_text: bool,
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_workers: config.defaults.max_workers,
            timeout_secs: config.fetch.timeout_secs,
            seed_timeout_secs: config.fetch.seed_timeout_secs,
            max_concurrent_requests: config.fetch.max_concurrent_requests,
            max_links_per_page: config.fetch.max_links_per_page,
            on_fetch_error: config.fetch.on_error,
            obfuscate: config.defaults.obfuscate,
            also_write_text: config.defaults.also_write_text,
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl CrawlConfig {
    /// Timeout for a single HTTP request, if one is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Timeout for fetching all children of one seed, if one is configured.
    pub fn seed_timeout(&self) -> Option<Duration> {
        (self.seed_timeout_secs > 0).then(|| Duration::from_secs(self.seed_timeout_secs))
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.seedcrawl/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SeedcrawlError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.seedcrawl/seedcrawl.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| SeedcrawlError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SeedcrawlError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SeedcrawlError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SeedcrawlError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SeedcrawlError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
