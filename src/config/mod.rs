//! Configuration management for tvbox-sync
//!
//! Configuration is loaded from a TOML file or from `TVBOX_*` environment
//! variables. Every section has defaults, so a file only needs the keys it
//! changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::retry::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Repository sources
    pub sources: SourcesConfig,

    /// Validity checker settings
    pub checker: CheckerConfig,

    /// Scheduler settings
    pub schedule: ScheduleConfig,

    /// Classification defaults and aliases
    pub classification: ClassificationConfig,

    /// Output settings
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Repository source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Repository locators in priority order (`http(s)://`, `file://` or a path)
    pub repositories: Vec<String>,

    /// Repositories queried for replacement URLs; empty means `repositories`
    pub fallback_repositories: Vec<String>,

    /// Per-retrieval timeout in seconds (covers all retry attempts)
    pub fetch_timeout_secs: u64,

    /// Attempts per retrieval, including the first one
    pub retry_attempts: u32,

    /// Base backoff delay between attempts in milliseconds
    pub retry_delay_ms: u64,

    /// User agent for repository requests; a browser UA is rotated when unset
    pub user_agent: Option<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            repositories: vec![
                String::from("https://raw.githubusercontent.com/iptv-org/iptv/master/streams/cn.m3u"),
                String::from("https://raw.githubusercontent.com/fanmingming/live/main/tv/m3u/ipv6.m3u"),
            ],
            fallback_repositories: Vec::new(),
            fetch_timeout_secs: 30,
            retry_attempts: 3,
            retry_delay_ms: 2000,
            user_agent: None,
        }
    }
}

/// Validity checker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Number of probe workers (maximum probes in flight)
    pub workers: usize,

    /// Timeout for a single probe in seconds
    pub probe_timeout_secs: u64,

    /// Timeout for a whole pipeline run in seconds
    pub run_timeout_secs: u64,

    /// Optional global probe rate (probes per second)
    pub probes_per_second: Option<u32>,

    /// Optional cap on candidate URLs kept per channel
    pub max_urls_per_channel: Option<usize>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            probe_timeout_secs: 5,
            run_timeout_secs: 1800,
            probes_per_second: None,
            max_urls_per_channel: None,
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Interval between scheduled runs in seconds
    pub interval_secs: u64,

    /// Run once immediately when the scheduler starts
    pub run_on_startup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            run_on_startup: true,
        }
    }
}

/// Classification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Country for entries whose repository gives none
    pub default_country: String,

    /// Category for entries without a category label
    pub default_category: String,

    /// Language for entries whose repository gives none
    pub default_language: String,

    /// Infer a category from the channel name when no label is present
    pub infer_category: bool,

    /// Canonical channel name -> alias names folded into it
    pub aliases: BTreeMap<String, Vec<String>>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            default_country: String::from("unknown"),
            default_category: String::from("unknown"),
            default_language: String::from("unknown"),
            infer_category: false,
            aliases: BTreeMap::new(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the catalog and exports
    pub output_dir: PathBuf,

    /// Catalog file name inside `output_dir`
    pub catalog_file: String,

    /// Run summary file name inside `output_dir`; empty disables it
    pub stats_file: String,

    /// Write a TVBox `live.txt`
    pub export_txt: bool,

    /// Write a `live.m3u`
    pub export_m3u: bool,

    /// Channel template ordering `live.txt`
    pub template: Option<PathBuf>,

    /// Leave channels the template does not name out of `live.txt`
    pub template_strict: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            catalog_file: String::from("catalog.json"),
            stats_file: String::from("stats.json"),
            export_txt: true,
            export_m3u: true,
            template: None,
            template_strict: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparseable variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(repos) = env_list("TVBOX_REPOSITORIES") {
            config.sources.repositories = repos;
        }
        if let Some(repos) = env_list("TVBOX_FALLBACK_REPOSITORIES") {
            config.sources.fallback_repositories = repos;
        }
        if let Some(v) = env_parse("TVBOX_FETCH_TIMEOUT") {
            config.sources.fetch_timeout_secs = v;
        }
        if let Some(v) = env_parse("TVBOX_RETRY_ATTEMPTS") {
            config.sources.retry_attempts = v;
        }
        if let Ok(ua) = std::env::var("TVBOX_USER_AGENT") {
            config.sources.user_agent = Some(ua);
        }

        if let Some(v) = env_parse("TVBOX_WORKERS") {
            config.checker.workers = v;
        }
        if let Some(v) = env_parse("TVBOX_PROBE_TIMEOUT") {
            config.checker.probe_timeout_secs = v;
        }
        if let Some(v) = env_parse("TVBOX_RUN_TIMEOUT") {
            config.checker.run_timeout_secs = v;
        }
        if let Some(v) = env_parse("TVBOX_PROBES_PER_SECOND") {
            config.checker.probes_per_second = Some(v);
        }

        if let Some(v) = env_parse("TVBOX_INTERVAL") {
            config.schedule.interval_secs = v;
        }
        if let Some(v) = env_bool("TVBOX_RUN_ON_STARTUP") {
            config.schedule.run_on_startup = v;
        }

        if let Ok(v) = std::env::var("TVBOX_DEFAULT_COUNTRY") {
            config.classification.default_country = v;
        }
        if let Ok(v) = std::env::var("TVBOX_DEFAULT_CATEGORY") {
            config.classification.default_category = v;
        }
        if let Ok(v) = std::env::var("TVBOX_DEFAULT_LANGUAGE") {
            config.classification.default_language = v;
        }
        if let Some(v) = env_bool("TVBOX_INFER_CATEGORY") {
            config.classification.infer_category = v;
        }

        if let Ok(dir) = std::env::var("TVBOX_OUTPUT_DIR") {
            config.storage.output_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("TVBOX_TEMPLATE") {
            config.storage.template = Some(PathBuf::from(path)).filter(|p| !p.as_os_str().is_empty());
        }

        if let Ok(level) = std::env::var("TVBOX_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("TVBOX_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.checker.workers == 0 {
            anyhow::bail!("checker.workers must be greater than 0");
        }

        if self.checker.probe_timeout_secs == 0 {
            anyhow::bail!("checker.probe_timeout_secs must be greater than 0");
        }

        if self.checker.run_timeout_secs == 0 {
            anyhow::bail!("checker.run_timeout_secs must be greater than 0");
        }

        if self.checker.probes_per_second == Some(0) {
            anyhow::bail!("checker.probes_per_second must be positive when set");
        }

        if self.checker.max_urls_per_channel == Some(0) {
            anyhow::bail!("checker.max_urls_per_channel must be positive when set");
        }

        if self.sources.fetch_timeout_secs == 0 {
            anyhow::bail!("sources.fetch_timeout_secs must be greater than 0");
        }

        if self.sources.retry_attempts == 0 {
            anyhow::bail!("sources.retry_attempts must be at least 1");
        }

        if self.schedule.interval_secs == 0 {
            anyhow::bail!("schedule.interval_secs must be greater than 0");
        }

        let class = &self.classification;
        for (name, value) in [
            ("default_country", &class.default_country),
            ("default_category", &class.default_category),
            ("default_language", &class.default_language),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("classification.{name} must not be empty");
            }
        }

        if self.storage.catalog_file.trim().is_empty() {
            anyhow::bail!("storage.catalog_file must not be empty");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be 'text' or 'json'");
        }

        Ok(())
    }

    /// Per-retrieval timeout
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.sources.fetch_timeout_secs)
    }

    /// Per-probe timeout
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.checker.probe_timeout_secs)
    }

    /// Run-level timeout
    #[must_use]
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.checker.run_timeout_secs)
    }

    /// Interval between scheduled runs
    #[must_use]
    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.interval_secs)
    }

    /// Retry policy for repository retrievals
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.sources.retry_attempts, self.sources.retry_delay_ms)
    }

    /// Path of the persisted catalog
    #[must_use]
    pub fn catalog_path(&self) -> PathBuf {
        self.storage.output_dir.join(&self.storage.catalog_file)
    }

    /// Repositories used for supplementary searches
    pub fn supplementary_repositories(&self) -> &[String] {
        if self.sources.fallback_repositories.is_empty() {
            &self.sources.repositories
        } else {
            &self.sources.fallback_repositories
        }
    }
}
