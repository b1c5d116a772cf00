//! Wireless interface byte-counter sampling.
//!
//! This module reads cumulative sent/received byte counters from
//! /proc/net/dev, summed over all interfaces matching the configured
//! wireless name prefixes. Each call is a fresh kernel query, not cached.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::usage::RawSample;

/// Interface name prefixes counted as wireless by default (wlan0, wlp3s0,
/// wwan0, ...).
pub const DEFAULT_WIRELESS_PREFIXES: &[&str] = &["wl", "wwan"];

/// Errors from the interface sampler.
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
}

/// Source of cumulative sent/received byte counters for wireless interfaces.
///
/// Values are monotonic except for fixed-width wraparound, which is the
/// caller's problem (see the rollover-corrected counter).
pub trait InterfaceSampler {
    fn sample(&mut self) -> Result<RawSample, SamplerError>;
}

/// Production sampler backed by /proc/net/dev.
pub struct ProcNetDevSampler {
    path: PathBuf,
    wireless_prefixes: Vec<String>,
}

impl ProcNetDevSampler {
    pub fn new(wireless_prefixes: Vec<String>) -> Self {
        Self::with_path("/proc/net/dev", wireless_prefixes)
    }

    pub fn with_path(path: impl AsRef<Path>, wireless_prefixes: Vec<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            wireless_prefixes,
        }
    }

    fn is_wireless(&self, interface: &str) -> bool {
        self.wireless_prefixes
            .iter()
            .any(|prefix| interface.starts_with(prefix.as_str()))
    }
}

impl InterfaceSampler for ProcNetDevSampler {
    fn sample(&mut self) -> Result<RawSample, SamplerError> {
        let content = fs::read_to_string(&self.path).map_err(|e| SamplerError::Read {
            path: self.path.display().to_string(),
            source: e,
        })?;

        let mut sample = RawSample::default();

        for (idx, line) in content.lines().enumerate() {
            // Skip the first two header lines
            if idx < 2 {
                continue;
            }

            // Split by ':' to separate interface name from stats
            let parts: Vec<&str> = line.split(':').collect();
            if parts.len() != 2 {
                continue;
            }

            let interface = parts[0].trim();
            if !self.is_wireless(interface) {
                continue;
            }

            let values: Vec<&str> = parts[1].split_whitespace().collect();
            if values.len() < 16 {
                continue; // Skip malformed lines
            }

            // Field 0 is receive bytes, field 8 is transmit bytes
            sample.received += values[0].parse().unwrap_or(0);
            sample.sent += values[8].parse().unwrap_or(0);
        }

        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const NETDEV_FIXTURE: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 1000000    1000    0    0    0     0          0         0  1000000    1000    0    0    0     0       0          0
 wlan0:  500000     400    0    0    0     0          0         0   200000     300    0    0    0     0       0          0
  eth0: 9999999    9999    0    0    0     0          0         0  9999999    9999    0    0    0     0       0          0
 wwan0:  100000     100    0    0    0     0          0         0    50000      50    0    0    0     0       0          0
";

    fn write_fixture(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_sums_only_wireless_interfaces() {
        let file = write_fixture(NETDEV_FIXTURE);
        let mut sampler = ProcNetDevSampler::with_path(
            file.path(),
            vec!["wl".to_string(), "wwan".to_string()],
        );

        let sample = sampler.sample().unwrap();
        assert_eq!(sample.received, 600_000);
        assert_eq!(sample.sent, 250_000);
    }

    #[test]
    fn test_no_matching_interface_yields_zero() {
        let file = write_fixture(NETDEV_FIXTURE);
        let mut sampler = ProcNetDevSampler::with_path(file.path(), vec!["ath".to_string()]);

        let sample = sampler.sample().unwrap();
        assert_eq!(sample, RawSample::default());
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let file = write_fixture("header\nheader\nwlan0 missing colon\nwlan0: 1 2\n");
        let mut sampler = ProcNetDevSampler::with_path(file.path(), vec!["wl".to_string()]);

        let sample = sampler.sample().unwrap();
        assert_eq!(sample, RawSample::default());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let mut sampler =
            ProcNetDevSampler::with_path("/nonexistent/net/dev", vec!["wl".to_string()]);
        assert!(sampler.sample().is_err());
    }
}
