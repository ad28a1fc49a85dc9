//! Configuration management for slotroster
//!
//! This module handles loading and validating configuration from TOML files
//! and environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::models::{ScheduleGroup, SlotMappingRule};
use crate::scheduler::window::DayBoundary;
use crate::utils::retry::RetryConfig;

/// Longest accepted lead time, one week
pub const MAX_LEAD_TIME_HOURS: u32 = 168;

/// Default provider API root
pub const DEFAULT_PROVIDER_URL: &str = "https://api.planningcenteronline.com/services/v2";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Provider connection settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Refresh and slot settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Schedule groups to poll
    #[serde(default)]
    pub groups: Vec<ScheduleGroup>,

    /// Name-based rules shared by every group
    #[serde(default)]
    pub global_rules: Vec<SlotMappingRule>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Provider connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API root URL
    pub base_url: String,

    /// Client id used as the basic-auth user
    pub client_id: Option<String>,

    /// Client secret used as the basic-auth password
    pub client_secret: Option<String>,

    /// Value of the `X-PCO-API-Version` header
    pub api_version: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Maximum requests per rolling window
    pub rate_limit: u32,

    /// Rolling window length in seconds
    pub rate_window_secs: u64,

    /// Attempts per request, the first one included
    pub max_attempts: u32,

    /// First backoff after a 429 without Retry-After, in milliseconds
    pub rate_limited_backoff_ms: u64,

    /// First backoff after a timeout or transport error, in milliseconds
    pub transient_backoff_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROVIDER_URL.to_string(),
            client_id: None,
            client_secret: None,
            api_version: "2023-08-01".to_string(),
            request_timeout_secs: 10,
            rate_limit: 70,
            rate_window_secs: 20,
            max_attempts: 3,
            rate_limited_backoff_ms: 5000,
            transient_backoff_ms: 2000,
        }
    }
}

impl ProviderConfig {
    /// Credentials when both halves are present and non-blank
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let id = self.client_id.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let secret = self
            .client_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())?;
        Some((id, secret))
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Get rolling window as Duration
    #[must_use]
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }

    /// Backoff schedule for 429 responses
    pub fn rate_limited_retry(&self) -> RetryConfig {
        RetryConfig::with_delays(self.max_attempts, self.rate_limited_backoff_ms)
    }

    /// Backoff schedule for timeouts and transport errors
    pub fn transient_retry(&self) -> RetryConfig {
        RetryConfig::with_delays(self.max_attempts, self.transient_backoff_ms)
    }
}

/// Refresh cadence and slot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Future plans fetched per group
    pub plans_per_group: u32,

    /// Number of physical slots (1..=N are pushed on apply)
    pub slot_count: u32,

    /// Highest slot reachable through the `mic N` pattern
    pub max_pattern_slot: u32,

    /// Live-status re-evaluation interval in seconds
    pub live_check_interval_secs: u64,

    /// Full refresh interval while a plan is live, in seconds
    pub live_refresh_interval_secs: u64,

    /// Lower bound of the idle refresh interval, in seconds
    pub idle_refresh_min_secs: u64,

    /// Upper bound of the idle refresh interval, in seconds
    pub idle_refresh_max_secs: u64,

    /// Run a forced refresh as soon as the scheduler starts
    pub refresh_on_startup: bool,

    /// Fixed UTC offset (minutes east) for service-day boundaries; the host
    /// timezone when unset
    pub utc_offset_minutes: Option<i32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            plans_per_group: 2,
            slot_count: 6,
            max_pattern_slot: 32,
            live_check_interval_secs: 300,
            live_refresh_interval_secs: 300,
            idle_refresh_min_secs: 60,
            idle_refresh_max_secs: 1800,
            refresh_on_startup: true,
            utc_offset_minutes: None,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn live_check_interval(&self) -> Duration {
        Duration::from_secs(self.live_check_interval_secs)
    }

    /// Timezone used for end-of-day and midnight computations
    pub fn day_boundary(&self) -> DayBoundary {
        self.utc_offset_minutes
            .and_then(DayBoundary::from_offset_minutes)
            .unwrap_or_default()
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

impl Config {
    /// Load configuration from environment variables only
    ///
    /// Groups cannot be expressed in the environment beyond a comma separated
    /// id list in `SLOTROSTER_GROUPS`; their rules come from a config file.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("SLOTROSTER_PROVIDER_URL") {
            config.provider.base_url = url;
        }

        if let Some(timeout) = std::env::var("SLOTROSTER_REQUEST_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.provider.request_timeout_secs = timeout;
        }

        if let Some(count) = std::env::var("SLOTROSTER_SLOT_COUNT")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            config.scheduler.slot_count = count;
        }

        if let Ok(groups) = std::env::var("SLOTROSTER_GROUPS") {
            config.groups = groups
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| ScheduleGroup::new(id, ""))
                .collect();
        }

        if let Ok(level) = std::env::var("SLOTROSTER_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(format) = std::env::var("SLOTROSTER_LOG_FORMAT") {
            config.logging.format = format;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply credential overrides
    /// from the environment
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Override provider credentials from the environment when present
    pub fn apply_env_overrides(&mut self) {
        let env_first = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
        };

        if let Some(id) = env_first(&["SLOTROSTER_CLIENT_ID", "PCO_CLIENT_ID"]) {
            self.provider.client_id = Some(id);
        }
        if let Some(secret) = env_first(&["SLOTROSTER_CLIENT_SECRET", "PCO_CLIENT_SECRET"]) {
            self.provider.client_secret = Some(secret);
        }
    }

    /// Validate configuration values
    ///
    /// Missing credentials and an empty group list are accepted here: the
    /// scheduler reports them as a configuration error and stays idle.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.provider.base_url)
            .with_context(|| format!("Invalid provider base_url: {}", self.provider.base_url))?;

        if self.provider.rate_limit == 0 {
            anyhow::bail!("rate_limit must be greater than 0");
        }

        if self.provider.rate_window_secs == 0 {
            anyhow::bail!("rate_window_secs must be greater than 0");
        }

        if self.provider.max_attempts == 0 {
            anyhow::bail!("max_attempts must be greater than 0");
        }

        if self.scheduler.slot_count == 0 {
            anyhow::bail!("slot_count must be greater than 0");
        }

        if self.scheduler.plans_per_group == 0 {
            anyhow::bail!("plans_per_group must be greater than 0");
        }

        if let Some(minutes) = self.scheduler.utc_offset_minutes {
            if DayBoundary::from_offset_minutes(minutes).is_none() {
                anyhow::bail!("utc_offset_minutes out of range: {minutes}");
            }
        }

        if self.scheduler.live_check_interval_secs == 0 || self.scheduler.live_refresh_interval_secs == 0 {
            anyhow::bail!("live check and refresh intervals must be greater than 0");
        }

        if self.scheduler.idle_refresh_min_secs > self.scheduler.idle_refresh_max_secs {
            anyhow::bail!("idle_refresh_min_secs must not exceed idle_refresh_max_secs");
        }

        validate_groups(&self.groups, &self.global_rules)?;

        Ok(())
    }
}

/// Check group definitions and global rules
///
/// Shared by [`Config::validate`] and scheduler reconfiguration.
pub fn validate_groups(groups: &[ScheduleGroup], global_rules: &[SlotMappingRule]) -> Result<()> {
    for group in groups {
        if group.id.trim().is_empty() {
            anyhow::bail!("group id must not be empty");
        }
        if let Some(rule) = group.rules.iter().find(|r| r.slot() == 0) {
            anyhow::bail!("group {} has a rule targeting slot 0: {:?}", group.id, rule);
        }
        if group.lead_time_hours > MAX_LEAD_TIME_HOURS {
            anyhow::bail!(
                "group {} lead_time_hours must not exceed {MAX_LEAD_TIME_HOURS}: {}",
                group.id,
                group.lead_time_hours
            );
        }
        let duplicates = group.duplicate_slots();
        if !duplicates.is_empty() {
            tracing::warn!(
                group_id = %group.id,
                slots = ?duplicates,
                "Multiple rules target the same slot; the last applied assignment wins"
            );
        }
    }

    if let Some(rule) = global_rules.iter().find(|r| r.slot() == 0) {
        anyhow::bail!("global rule targets slot 0: {:?}", rule);
    }

    if global_rules.iter().any(SlotMappingRule::is_id_based) {
        anyhow::bail!("global_rules must be name-based");
    }

    Ok(())
}
