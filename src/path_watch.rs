//! Network-path classification.
//!
//! Watches which interface carries the default route (/proc/net/route) and
//! classifies the path as expensive when that interface looks like a
//! cellular or tethered link (wwan/usb/rndis/bnep/ppp by default). Runs on
//! its own task and marshals classification changes to the control loop as
//! [`MeterEvent::PathUpdate`] messages; the state machine's self-transition
//! guard absorbs any duplicates.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::runtime::MeterEvent;

/// Interface name prefixes classified as expensive (metered) by default.
pub const DEFAULT_EXPENSIVE_PREFIXES: &[&str] = &["wwan", "usb", "rndis", "bnep", "ppp"];

const RTF_UP: u32 = 0x1;

/// Polls the routing table and reports expensive/cheap transitions.
pub struct PathWatcher {
    route_path: PathBuf,
    expensive_prefixes: Vec<String>,
    poll_interval: Duration,
}

impl PathWatcher {
    pub fn new(expensive_prefixes: Vec<String>, poll_interval: Duration) -> Self {
        Self::with_route_path("/proc/net/route", expensive_prefixes, poll_interval)
    }

    pub fn with_route_path(
        path: impl AsRef<Path>,
        expensive_prefixes: Vec<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            route_path: path.as_ref().to_path_buf(),
            expensive_prefixes,
            poll_interval,
        }
    }

    /// Classifies the current default route, or `None` when there is no
    /// usable route (offline, unreadable table).
    fn classify(&self) -> Option<bool> {
        let content = match fs::read_to_string(&self.route_path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read {}: {}", self.route_path.display(), e);
                return None;
            }
        };

        let interface = default_route_interface(&content)?;
        let expensive = self
            .expensive_prefixes
            .iter()
            .any(|prefix| interface.starts_with(prefix.as_str()));
        debug!(
            "Default route via {} ({})",
            interface,
            if expensive { "expensive" } else { "cheap" }
        );
        Some(expensive)
    }

    /// Emits a path update for the initial classification and for every
    /// change after it, until the receiving side goes away.
    pub async fn run(self, events: mpsc::Sender<MeterEvent>) {
        let mut last: Option<bool> = None;
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            ticker.tick().await;

            let Some(expensive) = self.classify() else {
                continue;
            };
            if last == Some(expensive) {
                continue;
            }
            last = Some(expensive);

            info!(
                "Network path classified as {}",
                if expensive { "expensive" } else { "cheap" }
            );
            if events
                .send(MeterEvent::PathUpdate { expensive })
                .await
                .is_err()
            {
                return;
            }
        }
    }
}

/// Finds the interface of the first up default route (destination
/// 00000000) in /proc/net/route content.
fn default_route_interface(content: &str) -> Option<String> {
    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }

        let destination = fields[1];
        let flags = u32::from_str_radix(fields[3], 16).unwrap_or(0);
        if destination == "00000000" && flags & RTF_UP != 0 {
            return Some(fields[0].to_string());
        }
    }
    None
}
