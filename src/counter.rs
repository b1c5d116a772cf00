//! Rollover-corrected counting and baseline-relative delta computation.
//!
//! The kernel byte counters this crate consumes are 32-bit sourced and wrap
//! at 2^32 (~4.29 GB). [`RolloverCounter`] turns them into an
//! ever-increasing virtual value; [`DeltaTracker`] measures usage against a
//! baseline snapshot of that virtual value and produces the per-tick
//! incremental deltas fed into the accumulators.
//!
//! Precondition: at most one wrap occurs between consecutive samples. The
//! 1-second polling period upholds this for any realistic wireless
//! throughput; a faster-wrapping counter would be undercounted.

use tracing::warn;

use crate::sampler::InterfaceSampler;
use crate::usage::{UsageDelta, VirtualReading};

/// Width of the underlying hardware counter.
const WRAP_SPAN: u64 = 1 << 32;

/// Wraps an [`InterfaceSampler`] and corrects for 32-bit counter rollover.
///
/// A raw reading strictly below the previous one is taken as exactly one
/// wrap in that direction. The virtual value is `raw + wraps * 2^32`.
pub struct RolloverCounter<S> {
    sampler: S,
    prev_sent: u64,
    prev_received: u64,
    sent_wraps: u64,
    received_wraps: u64,
    /// False until a raw reading has been captured; wrap detection against
    /// an unseeded previous value would be meaningless.
    seeded: bool,
}

impl<S: InterfaceSampler> RolloverCounter<S> {
    pub fn new(sampler: S) -> Self {
        Self {
            sampler,
            prev_sent: 0,
            prev_received: 0,
            sent_wraps: 0,
            received_wraps: 0,
            seeded: false,
        }
    }

    /// Takes a fresh raw sample, updates wrap state, and returns the
    /// wrap-corrected reading.
    ///
    /// A sampler failure degrades to "no new bytes": the previous reading
    /// is returned unchanged and the failure is logged, never propagated
    /// (the next tick retries naturally). The first successful sample after
    /// a failed seeding only records the reading; it cannot wrap.
    pub fn sample(&mut self) -> VirtualReading {
        match self.sampler.sample() {
            Ok(raw) => {
                if self.seeded {
                    if raw.sent < self.prev_sent {
                        self.sent_wraps += 1;
                    }
                    if raw.received < self.prev_received {
                        self.received_wraps += 1;
                    }
                }
                self.prev_sent = raw.sent;
                self.prev_received = raw.received;
                self.seeded = true;
                self.current()
            }
            Err(e) => {
                warn!("Interface sampler failed, keeping previous reading: {}", e);
                self.current()
            }
        }
    }

    /// True once a raw reading has been captured since the last reset.
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// The virtual reading as of the last sample, without sampling again.
    pub fn current(&self) -> VirtualReading {
        VirtualReading {
            sent: self.prev_sent + self.sent_wraps * WRAP_SPAN,
            received: self.prev_received + self.received_wraps * WRAP_SPAN,
        }
    }

    /// Starts a new counting epoch: seeds the previous raw values from a
    /// fresh sample and zeroes the wrap counts.
    ///
    /// When the seeding sample fails the counter is left unseeded; the
    /// next successful [`RolloverCounter::sample`] captures the reading
    /// instead.
    pub fn reset(&mut self) {
        match self.sampler.sample() {
            Ok(raw) => {
                self.prev_sent = raw.sent;
                self.prev_received = raw.received;
                self.seeded = true;
            }
            Err(e) => {
                warn!("Interface sampler failed during reset: {}", e);
                self.seeded = false;
            }
        }
        self.sent_wraps = 0;
        self.received_wraps = 0;
    }
}

/// Usage measured by one polling tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickUsage {
    /// Delta since the current baseline: "usage this session".
    pub session: UsageDelta,
    /// Delta since the previous tick; feeds the all-time and monthly
    /// accumulators without double counting.
    pub incremental: UsageDelta,
}

/// Two-level delta engine: baseline-relative session usage plus
/// tick-relative incremental deltas.
///
/// Baseline and delta computation share one counter instance; callers must
/// not read raw values around this engine or wrap detection breaks.
pub struct DeltaTracker<S> {
    counter: RolloverCounter<S>,
    baseline: VirtualReading,
    last_tick: UsageDelta,
    /// Set when the seeding sample failed at the last rebaseline; the
    /// first successful poll then becomes the baseline instead of being
    /// measured against a stale or zero one.
    baseline_pending: bool,
}

impl<S: InterfaceSampler> DeltaTracker<S> {
    /// Creates a tracker with a freshly captured baseline.
    pub fn new(sampler: S) -> Self {
        let mut tracker = Self {
            counter: RolloverCounter::new(sampler),
            baseline: VirtualReading::default(),
            last_tick: UsageDelta::default(),
            baseline_pending: false,
        };
        tracker.rebaseline();
        tracker
    }

    /// Begins a new counting epoch: resets wrap state, captures a fresh
    /// baseline, and zeroes the tick state. A poll immediately afterwards
    /// with no traffic reports zero.
    pub fn rebaseline(&mut self) {
        self.counter.reset();
        self.baseline = self.counter.current();
        self.last_tick = UsageDelta::default();
        self.baseline_pending = !self.counter.is_seeded();
    }

    /// Samples the counter and computes both session and incremental usage.
    pub fn poll(&mut self) -> TickUsage {
        let reading = self.counter.sample();

        if self.baseline_pending && self.counter.is_seeded() {
            self.baseline = reading;
            self.last_tick = UsageDelta::default();
            self.baseline_pending = false;
        }

        let session = UsageDelta {
            sent: reading.sent.saturating_sub(self.baseline.sent),
            received: reading.received.saturating_sub(self.baseline.received),
        };

        let incremental = UsageDelta {
            sent: incremental_delta(session.sent, self.last_tick.sent),
            received: incremental_delta(session.received, self.last_tick.received),
        };

        self.last_tick = session;

        TickUsage {
            session,
            incremental,
        }
    }
}

/// Incremental delta with a guard against the baseline having been reset
/// underneath without a matching tick-state reset: if the current
/// since-baseline usage is below the last tick's, the whole current value
/// is treated as new.
fn incremental_delta(current: u64, last: u64) -> u64 {
    if current >= last {
        current - last
    } else {
        current
    }
}
