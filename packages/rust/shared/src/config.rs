//! Application configuration for docpipe.
//!
//! User config lives at `~/.docpipe/docpipe.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DocpipeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docpipe.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docpipe";

// ---------------------------------------------------------------------------
// Config structs (matching docpipe.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Source fetching policies.
    #[serde(default)]
    pub fetch: FetchPoliciesConfig,

    /// Filter stack composition.
    #[serde(default)]
    pub filters: FiltersConfig,

    /// Registered resource templates, tried in order.
    #[serde(default)]
    pub templates: Vec<TemplateConfig>,

    /// Sources to ingest.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Where the entry index is persisted.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Source units processed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Budget for one source fetch.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Budget for one filter stage invocation.
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            concurrency: default_concurrency(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            stage_timeout_ms: default_stage_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    "~/.docpipe/docpipe.db".into()
}
fn default_concurrency() -> u32 {
    4
}
fn default_fetch_timeout_ms() -> u64 {
    30_000
}
fn default_stage_timeout_ms() -> u64 {
    5_000
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchPoliciesConfig {
    /// Allow fetching from localhost and private address ranges.
    #[serde(default)]
    pub allow_private_hosts: bool,

    /// Maximum HTTP redirects followed per fetch.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for FetchPoliciesConfig {
    fn default() -> Self {
        Self {
            allow_private_hosts: false,
            max_redirects: default_max_redirects(),
        }
    }
}

fn default_max_redirects() -> usize {
    5
}

/// `[filters]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiltersConfig {
    /// Stage names, applied in this order.
    #[serde(default = "default_stages")]
    pub stages: Vec<String>,

    /// Base URL for the `resolve-links` stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            base_url: None,
        }
    }
}

/// Names of the built-in filter stages, in their default order.
pub const DEFAULT_STAGES: &[&str] = &[
    "html-to-markdown",
    "normalize-headings",
    "collapse-blank-lines",
    "code-fence-languages",
    "strip-html",
    "trim-whitespace",
    "trailing-newline",
];

fn default_stages() -> Vec<String> {
    DEFAULT_STAGES.iter().map(|s| s.to_string()).collect()
}

/// `[[templates]]` entry: one resource template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Template string, e.g. `docs://api/{version}/{page}`.
    pub uri: String,
    /// Parameter name to type name (`string`, `integer`, `version`).
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Fixed version qualifying every path of an unversioned template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Free-form release label copied into entry metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
}

/// `[[sources]]` entry: one unit to ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Resource URI the fetched content is indexed under.
    pub uri: String,
    /// Where to fetch the raw content from.
    pub url: String,
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum units in flight.
    pub concurrency: usize,
    /// Per-unit extraction budget.
    pub fetch_timeout: Duration,
    /// Per-stage filter budget.
    pub stage_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.defaults.concurrency.max(1) as usize,
            fetch_timeout: Duration::from_millis(config.defaults.fetch_timeout_ms),
            stage_timeout: Duration::from_millis(config.defaults.stage_timeout_ms),
        }
    }
}

/// Runtime HTTP fetch configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Request timeout.
    pub timeout: Duration,
    /// Redirect limit.
    pub max_redirects: usize,
    /// Whether private/loopback hosts may be fetched.
    pub allow_private_hosts: bool,
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.defaults.fetch_timeout_ms),
            max_redirects: config.fetch.max_redirects,
            allow_private_hosts: config.fetch.allow_private_hosts,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docpipe/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| DocpipeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docpipe/docpipe.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| DocpipeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DocpipeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DocpipeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DocpipeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DocpipeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| DocpipeError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}
