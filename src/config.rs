//! Configuration loading.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. `--config <path>` (CLI flag; must exist)
//! 2. `./talkwalk.toml`
//! 3. `~/.config/talkwalk/config.toml` (user)
//! 4. Built-in defaults
//!
//! Every field has a default, so an empty file is a valid configuration.
//!
//! The API key is loaded separately:
//! 1. `--api-key` (CLI flag or `ANTHROPIC_API_KEY` via clap)
//! 2. `~/.config/talkwalk/secrets.toml` (must be 0600)
//! 3. `ANTHROPIC_API_KEY`

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::retry::RetryConfig;
use crate::types::TaskCategory;
use crate::usage::RateTable;
use crate::{Result, TalkWalkError};

/// Project-local config file name.
const LOCAL_CONFIG_FILE: &str = "talkwalk.toml";

/// Environment variable holding the Anthropic API key.
pub const API_KEY_ENV_VAR: &str = "ANTHROPIC_API_KEY";

/// Run configuration. Built once, then passed by reference.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub output: OutputConfig,
    /// Extra or overriding per-model rates, layered over the built-in table.
    #[serde(default)]
    pub rates: RateTable,
}

/// Model id per phase.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_fast_model")]
    pub locate: String,
    #[serde(default = "default_analysis_model")]
    pub analyze: String,
    #[serde(default = "default_analysis_model")]
    pub synthesize: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            locate: default_fast_model(),
            analyze: default_analysis_model(),
            synthesize: default_analysis_model(),
        }
    }
}

fn default_fast_model() -> String {
    "claude-haiku-4-5-20250929".to_string()
}

fn default_analysis_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

/// Output ceilings, concurrency and deadlines.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_locate_max_tokens")]
    pub locate_max_tokens: u32,
    #[serde(default = "default_analyze_max_tokens")]
    pub analyze_max_tokens: u32,
    #[serde(default = "default_synthesize_max_tokens")]
    pub synthesize_max_tokens: u32,
    /// Maximum tasks in flight within a phase (default: 1).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-task deadline in seconds, retries included (default: 300).
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            locate_max_tokens: default_locate_max_tokens(),
            analyze_max_tokens: default_analyze_max_tokens(),
            synthesize_max_tokens: default_synthesize_max_tokens(),
            concurrency: default_concurrency(),
            task_timeout_secs: default_task_timeout(),
        }
    }
}

fn default_locate_max_tokens() -> u32 {
    2000
}

fn default_analyze_max_tokens() -> u32 {
    3000
}

fn default_synthesize_max_tokens() -> u32 {
    6000
}

fn default_concurrency() -> usize {
    1
}

fn default_task_timeout() -> u64 {
    300
}

/// Response cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    /// Per-category lifetimes, in hours, replacing `ttl_hours`.
    #[serde(default)]
    pub ttl_overrides: TtlOverrides,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_cache_dir(),
            ttl_hours: default_ttl_hours(),
            ttl_overrides: TtlOverrides::default(),
        }
    }
}

/// `[cache.ttl_overrides]`: filings change yearly, analyses more often.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TtlOverrides {
    pub locate: Option<u64>,
    pub analyze: Option<u64>,
    pub synthesize: Option<u64>,
}

impl TtlOverrides {
    pub fn hours_for(&self, category: TaskCategory) -> Option<u64> {
        match category {
            TaskCategory::Locate => self.locate,
            TaskCategory::Analyze => self.analyze,
            TaskCategory::Synthesize => self.synthesize,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".cache")
}

fn default_ttl_hours() -> u64 {
    24
}

/// Retry settings as they appear in TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_jitter() -> f64 {
    0.2
}

/// Report output settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("reports")
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Falls back to built-in defaults when no file is found. An explicit
    /// path that does not exist is an error.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            TalkWalkError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            TalkWalkError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(TalkWalkError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Ok(Some(local));
        }

        if let Some(user_config) = user_config_dir().map(|d| d.join("config.toml"))
            && user_config.exists()
        {
            return Ok(Some(user_config));
        }

        Ok(None)
    }

    /// Reject values no run could use.
    pub fn validate(&self) -> Result<()> {
        let limits = &self.limits;
        if limits.locate_max_tokens == 0
            || limits.analyze_max_tokens == 0
            || limits.synthesize_max_tokens == 0
        {
            return Err(TalkWalkError::Configuration(
                "max token limits must be positive".to_string(),
            ));
        }
        if limits.task_timeout_secs == 0 {
            return Err(TalkWalkError::Configuration(
                "task_timeout_secs must be positive".to_string(),
            ));
        }
        if !(self.retry.multiplier.is_finite() && self.retry.multiplier >= 1.0) {
            return Err(TalkWalkError::Configuration(format!(
                "retry multiplier must be >= 1.0, got {}",
                self.retry.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(TalkWalkError::Configuration(format!(
                "retry jitter must be within 0.0..=1.0, got {}",
                self.retry.jitter
            )));
        }
        Ok(())
    }

    pub fn model_for(&self, category: TaskCategory) -> &str {
        match category {
            TaskCategory::Locate => &self.models.locate,
            TaskCategory::Analyze => &self.models.analyze,
            TaskCategory::Synthesize => &self.models.synthesize,
        }
    }

    pub fn max_tokens_for(&self, category: TaskCategory) -> u32 {
        match category {
            TaskCategory::Locate => self.limits.locate_max_tokens,
            TaskCategory::Analyze => self.limits.analyze_max_tokens,
            TaskCategory::Synthesize => self.limits.synthesize_max_tokens,
        }
    }

    /// Concurrency limit; zero is treated as one.
    pub fn concurrency(&self) -> usize {
        self.limits.concurrency.max(1)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.task_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_hours.saturating_mul(3600))
    }

    /// Entry lifetime for `category`, falling back to [`cache_ttl`](Self::cache_ttl).
    pub fn cache_ttl_for(&self, category: TaskCategory) -> Duration {
        match self.cache.ttl_overrides.hours_for(category) {
            Some(hours) => Duration::from_secs(hours.saturating_mul(3600)),
            None => self.cache_ttl(),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_attempts(self.retry.max_attempts)
            .initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .multiplier(self.retry.multiplier)
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .jitter(self.retry.jitter)
    }

    /// Built-in rates with `[rates]` overrides applied.
    pub fn rate_table(&self) -> RateTable {
        RateTable::builtin().merge(&self.rates)
    }
}

/// `~/.config/talkwalk`
fn user_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("talkwalk"))
}

/// Secrets (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub anthropic: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

impl Secrets {
    /// Load `~/.config/talkwalk/secrets.toml` if present, with a permission check.
    ///
    /// Returns empty secrets if no file exists (the env var may still be set).
    pub fn load() -> Result<Self> {
        if let Some(path) = user_config_dir().map(|d| d.join("secrets.toml"))
            && path.exists()
        {
            Self::check_permissions(&path)?;
            return Self::load_from_file(&path);
        }
        Ok(Secrets::default())
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            TalkWalkError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            TalkWalkError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            TalkWalkError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        // Reject if group or other bits are set
        if mode & 0o077 != 0 {
            return Err(TalkWalkError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// Anthropic API key, falling back to [`API_KEY_ENV_VAR`].
    pub fn api_key(&self) -> Option<String> {
        self.anthropic
            .as_ref()
            .map(|s| s.api_key.clone())
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV_VAR).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Resolve the API key: explicit value first, then secrets file, then env.
///
/// Only called when a run actually needs the remote client.
pub fn resolve_api_key(explicit: Option<&str>) -> Result<String> {
    if let Some(key) = explicit.filter(|k| !k.trim().is_empty()) {
        return Ok(key.to_string());
    }
    Secrets::load()?.api_key().ok_or_else(|| {
        TalkWalkError::Configuration(format!(
            "No API key found. Pass --api-key, set {API_KEY_ENV_VAR}, \
             or add [anthropic] api_key to ~/.config/talkwalk/secrets.toml"
        ))
    })
}
