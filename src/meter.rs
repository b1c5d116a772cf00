//! Connection-class state machine driving the accounting engine.
//!
//! The meter owns all mutable accounting state: the delta tracker, the
//! aggregator, the connection class, and the polling-active flag. Every
//! method runs on the single control task; path notifications and timer
//! ticks are marshaled there as events before they touch this state.
//!
//! Transitions: `Unknown → {Expensive, Cheap}`, thereafter
//! `Expensive ⇄ Cheap`. Reclassification to the same class is a no-op.
//! Entering Expensive starts polling; entering Cheap finalizes the session
//! and stops. Expensive entries within the debounce window of the previous
//! one are treated as a continuation of the same real transition (path
//! callbacks can flap), refreshing the entry timestamp without finalizing.

use std::time::{Duration, Instant};

use chrono::{Datelike, Local};
use tracing::{debug, info};

use crate::aggregator::UsageAggregator;
use crate::counter::DeltaTracker;
use crate::sampler::InterfaceSampler;
use crate::usage::{format_bytes, ConnectionClass, MonthlyBucket, SessionRecord, UsageTotals};

/// Policy switches for behavior that varied across deployments.
#[derive(Debug, Clone)]
pub struct MeterPolicy {
    /// Minimum gap between Expensive entries for the second to count as a
    /// new session rather than a continuation.
    pub debounce: Duration,
    /// Whether the very first Expensive classification starts polling.
    /// With `false`, the first classification only records the class and
    /// polling starts on the next metered transition.
    pub start_on_first_expensive: bool,
}

impl Default for MeterPolicy {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(3500),
            start_on_first_expensive: false,
        }
    }
}

/// Read-only view of the meter for the presentation side.
#[derive(Debug, Clone, Default)]
pub struct MeterSnapshot {
    pub active: bool,
    pub session: UsageTotals,
    pub all_time: UsageTotals,
    pub history: Vec<SessionRecord>,
    pub monthly: Vec<MonthlyBucket>,
}

/// The accounting engine: rollover-corrected counting, session boundaries,
/// and aggregation, driven by path updates and timer ticks.
pub struct Meter<S> {
    tracker: DeltaTracker<S>,
    aggregator: UsageAggregator,
    class: ConnectionClass,
    last_expensive_at: Option<Instant>,
    active: bool,
    policy: MeterPolicy,
}

impl<S: InterfaceSampler> Meter<S> {
    /// Creates a meter with a freshly captured baseline and not polling.
    pub fn new(sampler: S, aggregator: UsageAggregator, policy: MeterPolicy) -> Self {
        Self {
            tracker: DeltaTracker::new(sampler),
            aggregator,
            class: ConnectionClass::Unknown,
            last_expensive_at: None,
            active: false,
            policy,
        }
    }

    /// Processes one network-path notification. `now` is the arrival time,
    /// used for the Expensive-entry debounce.
    pub fn handle_path_update(&mut self, expensive: bool, now: Instant) {
        if expensive {
            self.handle_expensive(now);
        } else {
            self.handle_cheap();
        }
    }

    fn handle_expensive(&mut self, now: Instant) {
        match self.class {
            ConnectionClass::Expensive => return,
            ConnectionClass::Unknown if !self.policy.start_on_first_expensive => {
                info!("Initial path classification: expensive (not yet polling)");
                self.class = ConnectionClass::Expensive;
                self.last_expensive_at = Some(now);
                return;
            }
            _ => {}
        }

        let new_session = is_new_session(self.last_expensive_at, now, self.policy.debounce);
        if new_session {
            info!("Expensive connection detected, starting a new session");
            self.aggregator.finalize_session(Local::now());
            self.stop();
        } else {
            info!("Expensive connection re-detected, continuing session");
        }
        self.last_expensive_at = Some(now);

        // Seed the observable totals before the first scheduler tick.
        self.on_tick();
        self.active = true;
        self.class = ConnectionClass::Expensive;
    }

    fn handle_cheap(&mut self) {
        match self.class {
            ConnectionClass::Unknown => {
                info!("Initial path classification: cheap");
                self.class = ConnectionClass::Cheap;
            }
            ConnectionClass::Cheap => {}
            ConnectionClass::Expensive => {
                info!("Cheap connection detected");
                self.aggregator.finalize_session(Local::now());
                self.stop();
                self.class = ConnectionClass::Cheap;
            }
        }
    }

    /// Stops polling and resets the counting epoch: fresh baseline, zeroed
    /// tick state, zeroed current-session totals. Safe to call repeatedly;
    /// a second call has no effect beyond what the first already did.
    pub fn stop(&mut self) {
        if self.active {
            debug!("Stopped polling");
        }
        self.tracker.rebaseline();
        self.aggregator.reset_session();
        self.active = false;
    }

    /// One accounting tick: polls the counters, overwrites the session
    /// totals with the baseline-relative usage, and feeds the incremental
    /// delta into the all-time and monthly accumulators.
    pub fn on_tick(&mut self) {
        let now = Local::now();
        self.on_tick_for_month(now.year(), now.month());
    }

    /// Tick with an explicit monthly-bucket key; [`Meter::on_tick`] passes
    /// the current local date.
    pub fn on_tick_for_month(&mut self, year: i32, month: u32) {
        let usage = self.tracker.poll();
        self.aggregator
            .apply_incremental_delta(usage.incremental, year, month);
        self.aggregator.set_session(usage.session);

        debug!(
            "Session usage: {} sent, {} received",
            format_bytes(usage.session.sent),
            format_bytes(usage.session.received)
        );
    }

    /// True while the polling scheduler should be ticking.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn class(&self) -> ConnectionClass {
        self.class
    }

    /// Zeroes the all-time totals. User-initiated only.
    pub fn reset_all_time(&mut self) {
        self.aggregator.reset_all_time();
    }

    /// Drops the stored session history. User-initiated only.
    pub fn clear_history(&mut self) {
        self.aggregator.clear_history();
    }

    /// Drops the stored monthly records. User-initiated only.
    pub fn clear_monthly(&mut self) {
        self.aggregator.clear_monthly();
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        MeterSnapshot {
            active: self.active,
            session: self.aggregator.session(),
            all_time: self.aggregator.all_time(),
            history: self.aggregator.history().to_vec(),
            monthly: self.aggregator.monthly().to_vec(),
        }
    }
}

/// Debounce decision for an Expensive entry: a new session only if enough
/// time passed since the previous Expensive entry, or none was recorded.
fn is_new_session(last_expensive_at: Option<Instant>, now: Instant, debounce: Duration) -> bool {
    match last_expensive_at {
        None => true,
        Some(at) => now.duration_since(at) > debounce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::SamplerError;
    use crate::store::UsageStore;
    use crate::usage::RawSample;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Sampler backed by fake cumulative counters the test can advance.
    #[derive(Clone)]
    struct FakeCounters(Rc<RefCell<RawSample>>);

    impl FakeCounters {
        fn new() -> Self {
            Self(Rc::new(RefCell::new(RawSample {
                sent: 1_000,
                received: 2_000,
            })))
        }

        fn add_traffic(&self, sent: u64, received: u64) {
            let mut raw = self.0.borrow_mut();
            raw.sent += sent;
            raw.received += received;
        }
    }

    impl InterfaceSampler for FakeCounters {
        fn sample(&mut self) -> Result<RawSample, SamplerError> {
            Ok(*self.0.borrow())
        }
    }

    fn meter_with(
        dir: &std::path::Path,
        policy: MeterPolicy,
    ) -> (Meter<FakeCounters>, FakeCounters) {
        let counters = FakeCounters::new();
        let store = UsageStore::open(dir).unwrap();
        let aggregator = UsageAggregator::load(store, 5, 12, true);
        let meter = Meter::new(counters.clone(), aggregator, policy);
        (meter, counters)
    }

    fn starting_policy() -> MeterPolicy {
        MeterPolicy {
            start_on_first_expensive: true,
            ..MeterPolicy::default()
        }
    }

    const DEBOUNCE: Duration = Duration::from_millis(3500);

    #[test]
    fn test_debounce_decision() {
        let t0 = Instant::now();

        // No previous Expensive entry: always a new session.
        assert!(is_new_session(None, t0, DEBOUNCE));

        // Entries at t=0 and t=2.0s: continuation, not a new session.
        assert!(!is_new_session(
            Some(t0),
            t0 + Duration::from_secs(2),
            DEBOUNCE
        ));

        // Well past the threshold: a new session.
        assert!(is_new_session(
            Some(t0 + Duration::from_secs(2)),
            t0 + Duration::from_secs(6),
            DEBOUNCE
        ));
    }

    #[test]
    fn test_first_expensive_respects_start_policy() {
        let dir = tempfile::tempdir().unwrap();
        let (mut meter, _) = meter_with(dir.path(), MeterPolicy::default());

        meter.handle_path_update(true, Instant::now());
        assert_eq!(meter.class(), ConnectionClass::Expensive);
        assert!(!meter.is_active());

        let dir = tempfile::tempdir().unwrap();
        let (mut meter, _) = meter_with(dir.path(), starting_policy());

        meter.handle_path_update(true, Instant::now());
        assert!(meter.is_active());
    }

    #[test]
    fn test_default_policy_polls_on_second_expensive_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (mut meter, counters) = meter_with(dir.path(), MeterPolicy::default());
        let t0 = Instant::now();

        // Initial classification only records the class.
        meter.handle_path_update(true, t0);
        assert_eq!(meter.class(), ConnectionClass::Expensive);
        assert!(!meter.is_active());

        meter.handle_path_update(false, t0 + Duration::from_secs(10));
        assert_eq!(meter.class(), ConnectionClass::Cheap);
        assert!(!meter.is_active());

        // The next metered transition starts polling.
        meter.handle_path_update(true, t0 + Duration::from_secs(60));
        assert!(meter.is_active());

        counters.add_traffic(30, 0);
        meter.on_tick();
        assert_eq!(meter.snapshot().session.sent, 30);
    }

    #[test]
    fn test_first_cheap_records_class_without_polling() {
        let dir = tempfile::tempdir().unwrap();
        let (mut meter, _) = meter_with(dir.path(), starting_policy());

        meter.handle_path_update(false, Instant::now());
        assert_eq!(meter.class(), ConnectionClass::Cheap);
        assert!(!meter.is_active());
    }

    #[test]
    fn test_session_lifecycle_counts_and_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let (mut meter, counters) = meter_with(dir.path(), starting_policy());
        let t0 = Instant::now();

        meter.handle_path_update(true, t0);
        counters.add_traffic(100, 200);
        meter.on_tick();

        let snap = meter.snapshot();
        assert!(snap.active);
        assert_eq!(snap.session.sent, 100);
        assert_eq!(snap.session.received, 200);
        assert_eq!(snap.all_time.total, 300);

        // Back to cheap: session finalized and reset.
        meter.handle_path_update(false, t0 + Duration::from_secs(60));
        let snap = meter.snapshot();
        assert!(!snap.active);
        assert!(snap.session.is_zero());
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.history[0].total, 300);
        // All-time keeps accumulating across sessions.
        assert_eq!(snap.all_time.total, 300);
    }

    #[test]
    fn test_expensive_reentry_within_debounce_continues() {
        let dir = tempfile::tempdir().unwrap();
        let (mut meter, counters) = meter_with(dir.path(), starting_policy());
        let t0 = Instant::now();

        meter.handle_path_update(true, t0);
        counters.add_traffic(100, 0);
        meter.on_tick();

        meter.handle_path_update(false, t0 + Duration::from_secs(1));
        assert_eq!(meter.snapshot().history.len(), 1);

        // Flap back within 3.5s of the t0 entry: continuation, no second
        // finalize, polling resumes.
        meter.handle_path_update(true, t0 + Duration::from_secs(2));
        assert!(meter.is_active());
        assert_eq!(meter.snapshot().history.len(), 1);

        counters.add_traffic(50, 0);
        meter.on_tick();
        assert_eq!(meter.snapshot().session.sent, 50);

        // A later cheap transition records the continued session.
        meter.handle_path_update(false, t0 + Duration::from_secs(30));
        let snap = meter.snapshot();
        assert_eq!(snap.history.len(), 2);
        assert_eq!(snap.history[0].sent, 50);
        assert_eq!(snap.history[1].sent, 100);
    }

    #[test]
    fn test_self_transitions_are_no_ops() {
        let dir = tempfile::tempdir().unwrap();
        let (mut meter, counters) = meter_with(dir.path(), starting_policy());
        let t0 = Instant::now();

        meter.handle_path_update(true, t0);
        counters.add_traffic(10, 0);
        meter.on_tick();
        let before = meter.snapshot();

        // Reclassification to the same class changes nothing, even hours
        // later.
        meter.handle_path_update(true, t0 + Duration::from_secs(3600));
        let after = meter.snapshot();
        assert_eq!(after.session, before.session);
        assert_eq!(after.history.len(), before.history.len());
        assert!(after.active);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (mut meter, counters) = meter_with(dir.path(), starting_policy());

        meter.handle_path_update(true, Instant::now());
        counters.add_traffic(40, 0);
        meter.on_tick();

        meter.stop();
        let once = meter.snapshot();
        meter.stop();
        let twice = meter.snapshot();

        assert!(!once.active);
        assert!(once.session.is_zero());
        assert_eq!(once.session, twice.session);
        assert_eq!(once.all_time, twice.all_time);
        assert_eq!(once.history, twice.history);

        // Measurement restarts from the fresh baseline.
        meter.on_tick();
        assert!(meter.snapshot().session.is_zero());
    }

    #[test]
    fn test_tick_feeds_monthly_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let (mut meter, counters) = meter_with(dir.path(), starting_policy());

        meter.handle_path_update(true, Instant::now());
        counters.add_traffic(5, 5);
        meter.on_tick_for_month(2026, 8);

        let snap = meter.snapshot();
        assert_eq!(snap.monthly.len(), 1);
        assert_eq!(snap.monthly[0].sort_key(), (2026, 8));
        assert_eq!(snap.monthly[0].total, 10);
    }
}
