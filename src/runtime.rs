//! Single-consumer event loop around the meter.
//!
//! All mutation of accounting state is serialized onto one task: path
//! updates, user commands, and timer ticks arrive as messages on a FIFO
//! channel and are processed one at a time, in delivery order, with no
//! re-entrancy. There is no lock-based sharing; the presentation side
//! observes state through a watch channel and mutates only by sending
//! commands.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::meter::{Meter, MeterSnapshot};
use crate::sampler::InterfaceSampler;

/// User-initiated mutations of the persisted views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterCommand {
    ResetAllTime,
    ClearHistory,
    ClearMonthly,
}

/// Messages consumed by the control task.
#[derive(Debug, Clone, Copy)]
pub enum MeterEvent {
    /// A network-path notification: is the active path expensive/metered?
    PathUpdate { expensive: bool },
    Command(MeterCommand),
    Shutdown,
}

/// Handle given to the presentation/integration side: observe snapshots,
/// send commands, request shutdown.
#[derive(Clone)]
pub struct MeterHandle {
    events: mpsc::Sender<MeterEvent>,
    snapshots: watch::Receiver<MeterSnapshot>,
}

impl MeterHandle {
    pub fn snapshot(&self) -> MeterSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver that can await snapshot changes.
    pub fn watch(&self) -> watch::Receiver<MeterSnapshot> {
        self.snapshots.clone()
    }

    /// The raw event sender, for sources that feed the control loop
    /// directly (the path watcher).
    pub fn event_sender(&self) -> mpsc::Sender<MeterEvent> {
        self.events.clone()
    }

    pub async fn send(&self, event: MeterEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    pub async fn command(&self, command: MeterCommand) -> bool {
        self.send(MeterEvent::Command(command)).await
    }

    pub async fn shutdown(&self) {
        let _ = self.events.send(MeterEvent::Shutdown).await;
    }
}

/// The control loop plus the handles feeding it.
pub struct MeterRuntime<S> {
    meter: Meter<S>,
    poll_interval: Duration,
    events_rx: mpsc::Receiver<MeterEvent>,
    events_tx: mpsc::Sender<MeterEvent>,
    snapshots_tx: watch::Sender<MeterSnapshot>,
    snapshots_rx: watch::Receiver<MeterSnapshot>,
}

impl<S: InterfaceSampler> MeterRuntime<S> {
    pub fn new(meter: Meter<S>, poll_interval: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (snapshots_tx, snapshots_rx) = watch::channel(meter.snapshot());
        Self {
            meter,
            poll_interval,
            events_rx,
            events_tx,
            snapshots_tx,
            snapshots_rx,
        }
    }

    pub fn handle(&self) -> MeterHandle {
        MeterHandle {
            events: self.events_tx.clone(),
            snapshots: self.snapshots_rx.clone(),
        }
    }

    /// The raw event sender, for sources that feed the control loop
    /// directly (the path watcher).
    pub fn event_sender(&self) -> mpsc::Sender<MeterEvent> {
        self.events_tx.clone()
    }

    /// Runs the control loop until a shutdown event arrives or every
    /// sender is dropped. Consumes the runtime.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        // A tick that overlaps a slow previous tick is dropped, not
        // queued; the delta engine sums bytes, not rates, so a delayed
        // tick loses nothing.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let was_active = self.meter.is_active();

            tokio::select! {
                event = self.events_rx.recv() => {
                    match event {
                        Some(MeterEvent::PathUpdate { expensive }) => {
                            self.meter.handle_path_update(expensive, Instant::now());
                            if self.meter.is_active() && !was_active {
                                // A start cancels any pending tick cadence
                                // and schedules a fresh one.
                                ticker.reset();
                            }
                        }
                        Some(MeterEvent::Command(command)) => self.apply_command(command),
                        Some(MeterEvent::Shutdown) | None => {
                            info!("Meter control loop shutting down");
                            break;
                        }
                    }
                }
                _ = ticker.tick(), if was_active => {
                    self.meter.on_tick();
                }
            }

            self.snapshots_tx.send_replace(self.meter.snapshot());
        }

        // Leaving an active session on shutdown behaves like a stop.
        self.meter.stop();
        self.snapshots_tx.send_replace(self.meter.snapshot());
    }

    fn apply_command(&mut self, command: MeterCommand) {
        debug!("Applying command {:?}", command);
        match command {
            MeterCommand::ResetAllTime => self.meter.reset_all_time(),
            MeterCommand::ClearHistory => self.meter.clear_history(),
            MeterCommand::ClearMonthly => self.meter.clear_monthly(),
        }
    }
}
