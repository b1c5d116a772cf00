//! Wireless data-usage accounting engine.
//!
//! This library meters bytes sent and received over wireless network
//! interfaces, distinguishes expensive (tethered/cellular) connectivity
//! from cheap (home Wi-Fi) connectivity, and accumulates usage into
//! session, monthly, and all-time totals that survive process restarts.
//!
//! # Architecture
//!
//! - **Sampler** ([`sampler`]): raw cumulative byte counters from
//!   /proc/net/dev, summed over wireless interfaces.
//! - **Counter** ([`counter`]): 32-bit rollover correction and
//!   baseline-relative delta computation.
//! - **Aggregator** ([`aggregator`]) + **store** ([`store`]): accumulation
//!   into session/monthly/all-time views, persisted as key-value blobs.
//! - **Meter** ([`meter`]): the connection-class state machine that starts
//!   and stops polling and draws session boundaries.
//! - **Runtime** ([`runtime`]) + **path watcher** ([`path_watch`]): the
//!   single-consumer event loop and the default-route classifier feeding
//!   it.
//!
//! All mutable accounting state lives on one control task; timer ticks and
//! path notifications are marshaled there as messages, so there is no
//! lock-based sharing.

pub mod aggregator;
pub mod cli;
pub mod config;
pub mod counter;
pub mod meter;
pub mod path_watch;
pub mod runtime;
pub mod sampler;
pub mod store;
pub mod usage;

// Re-export main types for convenience
pub use aggregator::UsageAggregator;
pub use config::Config;
pub use counter::{DeltaTracker, RolloverCounter, TickUsage};
pub use meter::{Meter, MeterPolicy, MeterSnapshot};
pub use path_watch::PathWatcher;
pub use runtime::{MeterCommand, MeterEvent, MeterHandle, MeterRuntime};
pub use sampler::{InterfaceSampler, ProcNetDevSampler, SamplerError};
pub use store::{StoreError, UsageStore};
pub use usage::{
    ConnectionClass, MonthlyBucket, RawSample, SessionRecord, UsageDelta, UsageTotals,
};
