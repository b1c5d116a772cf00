//! Accumulation of usage deltas into the retained views.
//!
//! The aggregator owns the current-session totals, the all-time totals,
//! the capped monthly buckets, and the bounded recent-session history, and
//! flushes every mutation of the durable views to the [`UsageStore`]
//! before returning. Unreadable records at load time collapse to defaults;
//! startup never fails on corrupt usage data.

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::store::UsageStore;
use crate::usage::{MonthlyBucket, SessionRecord, UsageDelta, UsageTotals};

const KEY_ALL_TIME: &str = "all-time";
const KEY_SESSIONS: &str = "sessions-recent";
const KEY_MONTHLY_INDEX: &str = "monthly-index";

fn monthly_key(year: i32, month: u32) -> String {
    format!("monthly-{}-{:02}", year, month)
}

/// Aggregates tick deltas into session, all-time, and monthly views and
/// keeps the durable copies in sync.
pub struct UsageAggregator {
    store: UsageStore,
    session: UsageTotals,
    all_time: UsageTotals,
    history: Vec<SessionRecord>,
    monthly: Vec<MonthlyBucket>,
    history_capacity: usize,
    monthly_retention: usize,
    monthly_enabled: bool,
}

impl UsageAggregator {
    /// Creates an aggregator, reloading the durable views from `store`.
    pub fn load(
        store: UsageStore,
        history_capacity: usize,
        monthly_retention: usize,
        monthly_enabled: bool,
    ) -> Self {
        let all_time: UsageTotals = load_or_default(&store, KEY_ALL_TIME);
        let history: Vec<SessionRecord> = load_or_default(&store, KEY_SESSIONS);

        let index: Vec<String> = load_or_default(&store, KEY_MONTHLY_INDEX);
        let mut monthly: Vec<MonthlyBucket> = index
            .iter()
            .filter_map(|key| match store.get::<MonthlyBucket>(key) {
                Ok(bucket) => bucket,
                Err(e) => {
                    warn!("Skipping unreadable monthly record {}: {}", key, e);
                    None
                }
            })
            .collect();
        monthly.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
        monthly.truncate(monthly_retention);

        info!(
            "Loaded usage records: all-time {} bytes, {} sessions, {} monthly buckets",
            all_time.total,
            history.len(),
            monthly.len()
        );

        Self {
            store,
            session: UsageTotals::default(),
            all_time,
            history,
            monthly,
            history_capacity,
            monthly_retention,
            monthly_enabled,
        }
    }

    /// Adds one tick's incremental delta to the all-time totals and, when
    /// monthly tracking is enabled, to the bucket for (`year`, `month`).
    /// Persists each touched view synchronously.
    pub fn apply_incremental_delta(&mut self, delta: UsageDelta, year: i32, month: u32) {
        self.all_time.add(delta);
        self.persist(KEY_ALL_TIME, &self.all_time);

        if self.monthly_enabled {
            self.update_monthly(delta, year, month);
        }
    }

    fn update_monthly(&mut self, delta: UsageDelta, year: i32, month: u32) {
        let pos = match self
            .monthly
            .iter()
            .position(|b| b.year == year && b.month == month)
        {
            Some(pos) => pos,
            None => {
                self.monthly.push(MonthlyBucket::new(year, month));
                self.monthly.len() - 1
            }
        };
        self.monthly[pos].add(delta);
        self.persist(&monthly_key(year, month), &self.monthly[pos]);

        // Keep the capped list most-recent-first; evicted buckets stop
        // being retrievable.
        self.monthly.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
        while self.monthly.len() > self.monthly_retention {
            if let Some(evicted) = self.monthly.pop() {
                self.remove(&monthly_key(evicted.year, evicted.month));
            }
        }
        self.persist_monthly_index();
    }

    fn persist_monthly_index(&self) {
        let index: Vec<String> = self
            .monthly
            .iter()
            .map(|b| monthly_key(b.year, b.month))
            .collect();
        self.persist(KEY_MONTHLY_INDEX, &index);
    }

    /// Overwrites the current-session totals with the baseline-relative
    /// usage of the latest tick. In-memory only; sessions become durable
    /// when finalized.
    pub fn set_session(&mut self, usage: UsageDelta) {
        self.session.set_from(usage);
    }

    /// Zeroes the current-session totals (part of the scheduler's stop
    /// reset).
    pub fn reset_session(&mut self) {
        self.session = UsageTotals::default();
    }

    /// Closes the current session: if it has nonzero usage, prepends a
    /// [`SessionRecord`] to the bounded history and persists it. A session
    /// with zero usage leaves no record.
    pub fn finalize_session(&mut self, timestamp: DateTime<Local>) {
        if self.session.is_zero() {
            return;
        }

        let record = SessionRecord::new(timestamp, self.session);
        info!(
            "Finalizing session at {}: {} sent, {} received",
            record.formatted_timestamp(),
            record.sent,
            record.received
        );
        self.history.insert(0, record);
        self.history.truncate(self.history_capacity);
        self.persist(KEY_SESSIONS, &self.history);
    }

    /// Zeroes the all-time totals and persists. User-initiated only.
    pub fn reset_all_time(&mut self) {
        self.all_time = UsageTotals::default();
        self.persist(KEY_ALL_TIME, &self.all_time);
        info!("All-time totals reset");
    }

    /// Drops the stored session history. User-initiated only.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.persist(KEY_SESSIONS, &self.history);
        info!("Session history cleared");
    }

    /// Drops all stored monthly buckets and the index. User-initiated only.
    pub fn clear_monthly(&mut self) {
        for bucket in std::mem::take(&mut self.monthly) {
            self.remove(&monthly_key(bucket.year, bucket.month));
        }
        self.persist_monthly_index();
        info!("Monthly records cleared");
    }

    pub fn session(&self) -> UsageTotals {
        self.session
    }

    pub fn all_time(&self) -> UsageTotals {
        self.all_time
    }

    pub fn history(&self) -> &[SessionRecord] {
        &self.history
    }

    pub fn monthly(&self) -> &[MonthlyBucket] {
        &self.monthly
    }

    /// Read access to the backing store, for cross-checking durable state.
    pub fn store(&self) -> &UsageStore {
        &self.store
    }

    // A failed write is logged and dropped; the in-memory state stays
    // authoritative until the next successful write.
    fn persist<T: serde::Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.store.put(key, value) {
            warn!("Failed to persist {}: {}", key, e);
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            warn!("Failed to remove {}: {}", key, e);
        }
    }
}

fn load_or_default<T: serde::de::DeserializeOwned + Default>(store: &UsageStore, key: &str) -> T {
    match store.get(key) {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(e) => {
            warn!("Falling back to defaults for {}: {}", key, e);
            T::default()
        }
    }
}
