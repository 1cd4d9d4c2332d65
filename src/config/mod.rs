//! Configuration management for svitlo
//!
//! Configuration comes from a TOML file, from `SVITLO_*` environment
//! variables (scalar settings only), or both: file values first, then
//! environment overrides.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::decoder::{GridLayout, TextIntervalDecoder, TextPatterns};
use crate::metadata::ocr::OcrConfig;
use crate::models::{is_valid_group_code, paired_group_codes};
use crate::utils::retry::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fetcher configuration
    pub fetch: FetchConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Update cycle configuration
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Governing time zone of every source (IANA name)
    pub timezone: String,

    /// Known regions, in display order
    pub regions: Vec<RegionConfig>,
}

/// Fetcher configuration shared by all regions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Attempts per fetch, including the first
    pub max_attempts: u32,

    /// Fixed wait between failed attempts, in seconds
    pub backoff_secs: u64,

    /// Hard limit for one attempt, in seconds
    pub attempt_timeout_secs: u64,

    /// Limit for a single HTTP request, in seconds
    pub request_timeout_secs: u64,

    /// User agent string; a random desktop browser one when unset
    pub user_agent: Option<String>,

    /// Run browser sessions without a display
    pub headless: bool,

    /// Directory of temporary files cleared around every attempt
    pub scratch_dir: Option<PathBuf>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,

    /// Keep everything in memory (nothing survives a restart)
    pub in_memory: bool,
}

/// Update cycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between update cycles
    pub update_interval_secs: u64,

    /// Seconds to wait between two regions of one cycle
    pub region_pause_secs: u64,

    /// Lead time for "power goes off soon" checks, in minutes
    pub alert_lead_mins: i64,
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

/// One region and its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Unique region code (e.g. "volyn")
    pub code: String,

    /// Human-readable name
    pub display_name: String,

    /// Inactive regions are listed but never fetched
    #[serde(default)]
    pub active: bool,

    /// Page publishing the schedule
    #[serde(default)]
    pub url: String,

    /// Group codes, in source order (grid row order for image sources)
    pub groups: Vec<String>,

    /// Seconds to let the page settle after loading
    #[serde(default)]
    pub settle_secs: u64,

    /// How the source publishes its schedule
    #[serde(default)]
    pub source: Option<SourceConfig>,
}

/// Source format and its calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Embedded schedule image
    Image {
        /// Tokens one of which the image URL must contain
        markers: Vec<String>,

        /// Tokens the image URL must not contain
        #[serde(default)]
        exclude: Vec<String>,

        #[serde(default)]
        grid: GridLayout,

        #[serde(default)]
        ocr: OcrConfig,
    },

    /// Server-rendered text
    Markup {
        /// Tokens one of which the page must contain
        #[serde(default)]
        required_text: Vec<String>,

        #[serde(default)]
        patterns: TextPatterns,
    },
}

impl Config {
    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok());
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

    /// File configuration when `path` is given, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override scalar settings from `SVITLO_*` variables
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.trim().parse().ok())
        }

        if let Some(v) = parsed(lookup("SVITLO_MAX_ATTEMPTS")) {
            self.fetch.max_attempts = v;
        }
        if let Some(v) = parsed(lookup("SVITLO_BACKOFF_SECS")) {
            self.fetch.backoff_secs = v;
        }
        if let Some(v) = parsed(lookup("SVITLO_ATTEMPT_TIMEOUT")) {
            self.fetch.attempt_timeout_secs = v;
        }
        if let Some(v) = parsed(lookup("SVITLO_REQUEST_TIMEOUT")) {
            self.fetch.request_timeout_secs = v;
        }
        if let Some(v) = lookup("SVITLO_USER_AGENT") {
            self.fetch.user_agent = Some(v);
        }
        if let Some(v) = lookup("SVITLO_SQLITE_PATH") {
            self.database.sqlite_path = PathBuf::from(v);
        }
        if let Some(v) = parsed(lookup("SVITLO_UPDATE_INTERVAL")) {
            self.scheduler.update_interval_secs = v;
        }
        if let Some(v) = parsed(lookup("SVITLO_REGION_PAUSE")) {
            self.scheduler.region_pause_secs = v;
        }
        if let Some(v) = lookup("SVITLO_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("SVITLO_LOG_FORMAT") {
            self.logging.format = v;
        }
        if let Some(v) = lookup("SVITLO_TIMEZONE") {
            self.timezone = v;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.fetch.max_attempts == 0 {
            anyhow::bail!("max_attempts must be greater than 0");
        }

        if self.fetch.attempt_timeout_secs == 0 {
            anyhow::bail!("attempt_timeout_secs must be greater than 0");
        }

        if self.scheduler.update_interval_secs == 0 {
            anyhow::bail!("update_interval_secs must be greater than 0");
        }

        self.tz()?;

        let mut codes = HashSet::new();
        for region in &self.regions {
            if region.code.trim().is_empty() {
                anyhow::bail!("region code must not be empty");
            }
            if !codes.insert(region.code.as_str()) {
                anyhow::bail!("duplicate region code '{}'", region.code);
            }
            region
                .validate()
                .with_context(|| format!("Invalid region '{}'", region.code))?;
        }

        Ok(())
    }

    /// Parsed governing time zone
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid time zone '{}': {e}", self.timezone))
    }

    /// Region configuration by code
    pub fn region(&self, code: &str) -> Option<&RegionConfig> {
        self.regions.iter().find(|r| r.code == code)
    }
}

impl FetchConfig {
    /// Retry policy: fixed backoff between a bounded number of attempts
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::fixed(self.max_attempts, Duration::from_secs(self.backoff_secs))
    }

    #[must_use]
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    #[must_use]
    pub fn region_pause(&self) -> Duration {
        Duration::from_secs(self.region_pause_secs)
    }

    #[must_use]
    pub fn alert_lead(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.alert_lead_mins)
    }
}

impl RegionConfig {
    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for group in &self.groups {
            if !is_valid_group_code(group) {
                anyhow::bail!("invalid group code '{group}'");
            }
            if !seen.insert(group.as_str()) {
                anyhow::bail!("duplicate group code '{group}'");
            }
        }

        if !self.active {
            return Ok(());
        }

        if self.groups.is_empty() {
            anyhow::bail!("active region needs at least one group");
        }
        if url::Url::parse(&self.url).is_err() {
            anyhow::bail!("invalid url '{}'", self.url);
        }

        match &self.source {
            None => anyhow::bail!("active region needs a source"),
            Some(SourceConfig::Image { markers, grid, .. }) => {
                if markers.is_empty() {
                    anyhow::bail!("image source needs at least one marker");
                }
                let steps = [grid.step.0, grid.step.1];
                if steps.iter().any(|s| !s.is_finite() || *s <= 0.0) {
                    anyhow::bail!("grid steps must be positive");
                }
            }
            Some(SourceConfig::Markup { patterns, .. }) => {
                TextIntervalDecoder::new(patterns)?;
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: 60,
            attempt_timeout_secs: 90,
            request_timeout_secs: 30,
            user_agent: None,
            headless: true,
            scratch_dir: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/svitlo.db"),
            in_memory: false,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 1800,
            region_pause_secs: 5,
            alert_lead_mins: 15,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig::default(),
            timezone: String::from("Europe/Kyiv"),
            regions: default_regions(),
        }
    }
}

/// Built-in regions
pub fn default_regions() -> Vec<RegionConfig> {
    let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    vec![
        RegionConfig {
            code: "volyn".into(),
            display_name: "Волинська область".into(),
            active: true,
            url: "https://energy.volyn.ua/spozhyvacham/perervy-u-elektropostachanni/hrafik-vidkliuchen/".into(),
            groups: paired_group_codes(6),
            settle_secs: 15,
            source: Some(SourceConfig::Image {
                markers: strings(&["GPV", "grafik", "uploads"]),
                exclude: strings(&["logo"]),
                grid: GridLayout::default(),
                ocr: OcrConfig::default(),
            }),
        },
        RegionConfig {
            code: "lviv".into(),
            display_name: "Львівська область".into(),
            active: true,
            url: "https://poweron.loe.lviv.ua/".into(),
            groups: paired_group_codes(6),
            settle_secs: 2,
            source: Some(SourceConfig::Markup {
                required_text: strings(&["Група"]),
                patterns: TextPatterns::default(),
            }),
        },
        RegionConfig {
            code: "kyiv".into(),
            display_name: "Київська область".into(),
            active: false,
            url: String::new(),
            groups: strings(&["1", "2", "3"]),
            settle_secs: 0,
            source: None,
        },
        RegionConfig {
            code: "rivne".into(),
            display_name: "Рівненська область".into(),
            active: false,
            url: String::new(),
            groups: strings(&["1", "2", "3"]),
            settle_secs: 0,
            source: None,
        },
    ]
}
