//! Configuration management for hotspot-meter.
//!
//! This module handles loading, merging, and validating configuration from
//! files and CLI arguments. It supports YAML, JSON, and TOML formats.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::cli::{Args, ConfigFormat};
use crate::path_watch::DEFAULT_EXPENSIVE_PREFIXES;
use crate::sampler::DEFAULT_WIRELESS_PREFIXES;

// Default configuration constants
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_DEBOUNCE_SECS: f64 = 3.5;
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;
pub const DEFAULT_MONTHLY_RETENTION: usize = 12;
pub const DEFAULT_ROUTE_POLL_SECS: u64 = 2;

/// Effective daemon configuration. `None` fields fall back to the
/// documented defaults at resolution time.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Directory holding the persisted usage records.
    pub data_dir: Option<PathBuf>,

    // Polling and session boundaries
    /// Accounting tick period in seconds while on an expensive path.
    pub poll_interval_secs: Option<u64>,
    /// Expensive re-entries within this window continue the session.
    pub debounce_secs: Option<f64>,
    /// Whether the very first expensive classification starts polling.
    #[serde(alias = "start-on-first-expensive")]
    pub start_on_first_expensive: Option<bool>,

    // Retention
    #[serde(alias = "history-capacity")]
    pub history_capacity: Option<usize>,
    #[serde(alias = "monthly-retention")]
    pub monthly_retention: Option<usize>,
    #[serde(alias = "enable-monthly")]
    pub enable_monthly: Option<bool>,

    // Interface classification
    /// Interfaces whose names match these prefixes are counted.
    #[serde(alias = "wireless-prefixes")]
    pub wireless_prefixes: Option<Vec<String>>,
    /// A default route via one of these prefixes is an expensive path.
    #[serde(alias = "expensive-prefixes")]
    pub expensive_prefixes: Option<Vec<String>>,
    /// How often the routing table is re-checked, in seconds.
    #[serde(alias = "route-poll-secs")]
    pub route_poll_secs: Option<u64>,

    // Logging
    pub log_level: Option<String>,
}

impl Config {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs_f64(self.debounce_secs.unwrap_or(DEFAULT_DEBOUNCE_SECS))
    }

    pub fn start_on_first_expensive(&self) -> bool {
        self.start_on_first_expensive.unwrap_or(false)
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity.unwrap_or(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn monthly_retention(&self) -> usize {
        self.monthly_retention.unwrap_or(DEFAULT_MONTHLY_RETENTION)
    }

    pub fn enable_monthly(&self) -> bool {
        self.enable_monthly.unwrap_or(true)
    }

    pub fn wireless_prefixes(&self) -> Vec<String> {
        self.wireless_prefixes
            .clone()
            .unwrap_or_else(|| default_prefixes(DEFAULT_WIRELESS_PREFIXES))
    }

    pub fn expensive_prefixes(&self) -> Vec<String> {
        self.expensive_prefixes
            .clone()
            .unwrap_or_else(|| default_prefixes(DEFAULT_EXPENSIVE_PREFIXES))
    }

    pub fn route_poll_interval(&self) -> Duration {
        Duration::from_secs(self.route_poll_secs.unwrap_or(DEFAULT_ROUTE_POLL_SECS))
    }
}

fn default_prefixes(prefixes: &[&str]) -> Vec<String> {
    prefixes.iter().map(|s| s.to_string()).collect()
}

fn default_data_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".local/share/hotspot-meter"),
        None => PathBuf::from("/var/lib/hotspot-meter"),
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.poll_interval().is_zero() {
        bail!("poll_interval_secs must be at least 1");
    }

    if cfg.debounce_secs.unwrap_or(DEFAULT_DEBOUNCE_SECS) < 0.0 {
        bail!("debounce_secs must not be negative");
    }

    if cfg.history_capacity() == 0 {
        bail!("history_capacity must be at least 1");
    }

    if cfg.monthly_retention() == 0 {
        bail!("monthly_retention must be at least 1");
    }

    if cfg.wireless_prefixes().is_empty() {
        bail!("wireless_prefixes must name at least one interface prefix");
    }

    if cfg.expensive_prefixes().is_empty() {
        bail!("expensive_prefixes must name at least one interface prefix");
    }

    if cfg.route_poll_interval().is_zero() {
        bail!("route_poll_secs must be at least 1");
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(data_dir) = &args.data_dir {
        config.data_dir = Some(data_dir.clone());
    }

    if let Some(poll_interval) = args.poll_interval_secs {
        config.poll_interval_secs = Some(poll_interval);
    }

    if let Some(capacity) = args.history_capacity {
        config.history_capacity = Some(capacity);
    }

    if args.disable_monthly {
        config.enable_monthly = Some(false);
    }

    // Parse comma-separated prefix lists
    if let Some(prefixes) = &args.wireless_prefixes {
        config.wireless_prefixes = Some(split_prefixes(prefixes));
    }
    if let Some(prefixes) = &args.expensive_prefixes {
        config.expensive_prefixes = Some(split_prefixes(prefixes));
    }

    Ok(config)
}

fn split_prefixes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = if let Some(p) = path {
        p.to_path_buf()
    } else {
        // Try default locations
        let defaults = [
            "/etc/hotspot-meter/config.yaml",
            "/etc/hotspot-meter/config.yml",
            "/etc/hotspot-meter/config.toml",
            "./hotspot-meter.yaml",
            "./hotspot-meter.yml",
            "./hotspot-meter.toml",
        ];

        match defaults.iter().find(|p| Path::new(p).exists()) {
            Some(p) => PathBuf::from(p),
            None => return Ok(Config::default()),
        }
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    let config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            config
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            config
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            config
        }
    };

    Ok(config)
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> anyhow::Result<()> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };

    println!("{output}");
    Ok(())
}
