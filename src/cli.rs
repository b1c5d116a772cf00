//! CLI arguments for the hotspot-meter daemon.
//!
//! This module defines the command-line interface structure using the clap
//! library.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "hotspot-meter",
    about = "Resident wireless data-usage meter for metered (tethered/cellular) connectivity",
    long_about = "Resident wireless data-usage meter.\n\n\
                  Watches the default network path, polls wireless interface byte \
                  counters while the path is metered (tethered/cellular), and \
                  accumulates usage into session, monthly, and all-time totals that \
                  survive restarts.",
    version = "0.1.0",
    propagate_version = true
)]
pub struct Args {
    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Directory for persisted usage records
    #[arg(short = 'd', long)]
    pub data_dir: Option<PathBuf>,

    /// Accounting tick period in seconds
    #[arg(long)]
    pub poll_interval_secs: Option<u64>,

    /// Number of recent sessions retained
    #[arg(long)]
    pub history_capacity: Option<usize>,

    /// Disable per-month usage tracking
    #[arg(long)]
    pub disable_monthly: bool,

    /// Interface prefixes counted as wireless (comma-separated)
    #[arg(long)]
    pub wireless_prefixes: Option<String>,

    /// Default-route interface prefixes classified as expensive (comma-separated)
    #[arg(long)]
    pub expensive_prefixes: Option<String>,
}
