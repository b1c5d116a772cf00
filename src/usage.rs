//! Core data types for the usage accounting engine.
//!
//! Byte counts are always `u64`, even though the underlying hardware
//! counters are 32-bit sourced; the rollover-corrected virtual values can
//! exceed the 32-bit range.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One raw reading of the cumulative interface counters, summed over all
/// wireless-class interfaces. Ephemeral, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawSample {
    pub sent: u64,
    pub received: u64,
}

/// A wrap-corrected, ever-increasing counter value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VirtualReading {
    pub sent: u64,
    pub received: u64,
}

/// A per-direction byte delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageDelta {
    pub sent: u64,
    pub received: u64,
}

impl UsageDelta {
    pub fn total(&self) -> u64 {
        self.sent + self.received
    }

    pub fn is_zero(&self) -> bool {
        self.sent == 0 && self.received == 0
    }
}

/// Accumulated usage totals. `total` is kept equal to `sent + received`
/// by every mutator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub sent: u64,
    pub received: u64,
    pub total: u64,
}

impl UsageTotals {
    /// Adds a delta and recomputes the total.
    pub fn add(&mut self, delta: UsageDelta) {
        self.sent += delta.sent;
        self.received += delta.received;
        self.total = self.sent + self.received;
    }

    /// Replaces the totals with an absolute usage value.
    pub fn set_from(&mut self, usage: UsageDelta) {
        self.sent = usage.sent;
        self.received = usage.received;
        self.total = self.sent + self.received;
    }

    pub fn is_zero(&self) -> bool {
        self.total == 0
    }
}

/// A completed metered session. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub timestamp: DateTime<Local>,
    pub sent: u64,
    pub received: u64,
    pub total: u64,
}

impl SessionRecord {
    pub fn new(timestamp: DateTime<Local>, totals: UsageTotals) -> Self {
        Self {
            timestamp,
            sent: totals.sent,
            received: totals.received,
            total: totals.total,
        }
    }

    /// Human-readable timestamp, e.g. "January 5 2026, 14:30".
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format("%B %-d %Y, %H:%M").to_string()
    }
}

/// Usage accumulated within one calendar month, keyed by (year, month).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyBucket {
    pub year: i32,
    /// 1-12.
    pub month: u32,
    pub sent: u64,
    pub received: u64,
    pub total: u64,
}

impl MonthlyBucket {
    pub fn new(year: i32, month: u32) -> Self {
        Self {
            year,
            month,
            sent: 0,
            received: 0,
            total: 0,
        }
    }

    pub fn add(&mut self, delta: UsageDelta) {
        self.sent += delta.sent;
        self.received += delta.received;
        self.total = self.sent + self.received;
    }

    /// Sort key for most-recent-first ordering.
    pub fn sort_key(&self) -> (i32, u32) {
        (self.year, self.month)
    }
}

/// Classification of the active network path.
///
/// `Unknown` only exists before the first path notification; once resolved
/// the class never returns to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionClass {
    Unknown,
    Expensive,
    Cheap,
}

/// Formats a byte count for logs: whole KB below 1 MB, one-decimal MB
/// below 1 GB, one-decimal GB above. Decimal units throughout.
pub fn format_bytes(bytes: u64) -> String {
    const MB: u64 = 1000 * 1000;
    const GB: u64 = 1000 * 1000 * 1000;

    if bytes < MB {
        format!("{} KB", bytes / 1000)
    } else if bytes < GB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_invariant_after_add() {
        let mut totals = UsageTotals::default();
        totals.add(UsageDelta {
            sent: 100,
            received: 250,
        });
        assert_eq!(totals.total, totals.sent + totals.received);

        totals.add(UsageDelta {
            sent: 0,
            received: 7,
        });
        assert_eq!(totals.sent, 100);
        assert_eq!(totals.received, 257);
        assert_eq!(totals.total, 357);
    }

    #[test]
    fn test_totals_invariant_after_set() {
        let mut totals = UsageTotals::default();
        totals.add(UsageDelta {
            sent: 10,
            received: 10,
        });
        totals.set_from(UsageDelta {
            sent: 3,
            received: 4,
        });
        assert_eq!(totals.sent, 3);
        assert_eq!(totals.received, 4);
        assert_eq!(totals.total, 7);
    }

    #[test]
    fn test_monthly_bucket_add() {
        let mut bucket = MonthlyBucket::new(2026, 8);
        bucket.add(UsageDelta {
            sent: 5,
            received: 6,
        });
        bucket.add(UsageDelta {
            sent: 1,
            received: 0,
        });
        assert_eq!(bucket.total, bucket.sent + bucket.received);
        assert_eq!(bucket.total, 12);
    }

    #[test]
    fn test_formatted_timestamp() {
        use chrono::TimeZone;

        let timestamp = Local.with_ymd_and_hms(2026, 1, 5, 14, 30, 0).unwrap();
        let record = SessionRecord::new(
            timestamp,
            UsageTotals {
                sent: 1,
                received: 2,
                total: 3,
            },
        );
        assert_eq!(record.formatted_timestamp(), "January 5 2026, 14:30");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 KB");
        assert_eq!(format_bytes(999_999), "999 KB");
        assert_eq!(format_bytes(1_500_000), "1.5 MB");
        assert_eq!(format_bytes(2_300_000_000), "2.3 GB");
    }
}
