//! Valve synchronisation loop, the hexagonal core.
//!
//! [`ValveSyncLoop`] owns the one authoritative [`ValveState`], the safety
//! monitor and the persistent store.  Every writer of the valve goes
//! through it.  All I/O flows through port traits injected at call sites,
//! making the whole loop testable with mock adapters.
//!
//! ```text
//!   SensorPort ──▶ ┌──────────────────────────┐ ──▶ EventSink
//!                  │      ValveSyncLoop        │
//! ActuatorPort ◀── │  Safety · Store · Remote  │ ◀─▶ SupervisorPort
//!                  └──────────────────────────┘
//! ```
//!
//! ## Per-iteration ordering
//!
//! 1. Feed the watchdog, read gas and weight.
//! 2. Safety verdict.  An unreadable gas sensor counts as an emergency.
//! 3. Emergency: drive closed, commit to the store, *then* report
//!    telemetry.  The remote target is not fetched.
//!
//! Telemetry goes upstream whenever gas was read.  A failed load-cell read
//! reports the last good weight (or [`FALLBACK_WEIGHT`] before the first).
//! 4. Normal: report telemetry, fetch the remote target, apply it if it
//!    differs.  A failed fetch changes nothing.
//!
//! The caller sleeps [`ValveSyncLoop::interval`] between iterations.

use core::time::Duration;

use log::{debug, error, info, warn};

use crate::config::SystemConfig;
use crate::error::Error;
use crate::safety::{SafetyMonitor, Verdict};
use crate::store::ValveStore;
use crate::valve::ValveState;

use super::events::{AppEvent, ChangeCause, TelemetryData};
use super::ports::{
    ActuatorPort, EventSink, SensorPort, StorageError, StoragePort, SupervisorPort, Telemetry,
    WatchdogPort,
};

/// Upper bound on distinct failures a single iteration can produce
/// (gas, weight, report, fetch, store).
pub const MAX_TICK_ERRORS: usize = 5;

/// Weight reported before the load cell has produced any reading.
pub const FALLBACK_WEIGHT: f32 = 0.0;

/// Outcome of one [`ValveSyncLoop::tick`].
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub verdict: Verdict,
    /// Valve state at the end of the iteration (equals the driven level).
    pub valve: ValveState,
    /// Whether the valve state changed during this iteration.
    pub changed: bool,
    /// Whether the remote target was requested this iteration.
    pub fetched_target: bool,
    /// Non-fatal failures, in the order they happened.
    pub errors: heapless::Vec<Error, MAX_TICK_ERRORS>,
}

fn record(errors: &mut heapless::Vec<Error, MAX_TICK_ERRORS>, e: impl Into<Error>) {
    // Capacity covers every failure one iteration can produce.
    let _ = errors.push(e.into());
}

// ───────────────────────────────────────────────────────────────
// ValveSyncLoop
// ───────────────────────────────────────────────────────────────

pub struct ValveSyncLoop<S: StoragePort> {
    safety: SafetyMonitor,
    store: ValveStore<S>,
    valve: ValveState,
    /// The in-memory state has not been confirmed in the store yet.
    persist_pending: bool,
    /// Cleared by a failed write; set again once a write is confirmed.
    persistence_trusted: bool,
    /// Last successful load-cell reading.
    last_weight: Option<f32>,
    interval: Duration,
    tick_count: u64,
}

impl<S: StoragePort> ValveSyncLoop<S> {
    /// Construct the loop from configuration and its store.
    ///
    /// Does **not** load or drive the valve; call [`start`](Self::start)
    /// next.
    pub fn new(config: &SystemConfig, store: ValveStore<S>) -> Self {
        Self {
            safety: SafetyMonitor::from_config(config),
            store,
            valve: ValveState::Closed,
            persist_pending: false,
            persistence_trusted: true,
            last_weight: None,
            interval: Duration::from_millis(u64::from(config.control_loop_interval_ms)),
            tick_count: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Restore the last committed state and drive the relay to it.
    ///
    /// An unreadable medium boots `Closed` with the store untrusted and a
    /// write pending, so the first iteration overwrites whatever it holds.
    pub fn start(&mut self, hw: &mut impl ActuatorPort, sink: &mut impl EventSink) {
        self.valve = match self.store.try_load() {
            Ok(state) => state,
            Err(e) => {
                error!("Valve store unreadable ({}), booting {} untrusted", e, ValveState::Closed);
                self.persist_pending = true;
                self.persistence_trusted = false;
                ValveState::Closed
            }
        };
        hw.drive_valve(self.valve);
        sink.emit(&AppEvent::Started(self.valve));
        info!("ValveSyncLoop started, valve {}", self.valve);
    }

    // ── Per-iteration orchestration ───────────────────────────

    /// Run one full iteration: sensors → safety → persist → supervisor.
    ///
    /// `hw` satisfies both [`SensorPort`] and [`ActuatorPort`] so sensors
    /// and relay can live behind one adapter without a double borrow.
    pub fn tick(
        &mut self,
        hw: &mut (impl SensorPort + ActuatorPort),
        supervisor: &mut impl SupervisorPort,
        watchdog: &mut impl WatchdogPort,
        sink: &mut impl EventSink,
    ) -> TickReport {
        self.tick_count += 1;
        watchdog.feed();

        let mut errors = heapless::Vec::new();
        let before = self.valve;

        // 1. Sample
        let gas = match hw.read_gas() {
            Ok(gas) => Some(gas),
            Err(e) => {
                warn!("Gas sensor read failed ({}), treating as emergency", e);
                record(&mut errors, e);
                None
            }
        };
        let weight = match hw.read_weight() {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("Load cell read failed ({}), reporting last weight", e);
                record(&mut errors, e);
                None
            }
        };

        if weight.is_some() {
            self.last_weight = weight;
        }
        let reported_weight = self.last_weight.unwrap_or(FALLBACK_WEIGHT);

        // 2. Safety verdict
        let verdict = gas.map_or(Verdict::Emergency, |g| self.safety.evaluate(g));

        let mut fetched_target = false;
        if verdict.is_emergency() {
            // 3. Local closure, committed before any network traffic.
            error!("EMERGENCY SHUTOFF: gas={:?} threshold={}", gas, self.safety.threshold());
            sink.emit(&AppEvent::EmergencyShutoff { gas });
            if let Some(e) = self.enforce_closed(hw, sink) {
                record(&mut errors, e);
            }
            Self::report_telemetry(gas, reported_weight, supervisor, watchdog, sink, &mut errors);
        } else {
            // 4. Remote reconciliation
            if self.persist_pending {
                if let Err(e) = self.persist(sink) {
                    record(&mut errors, e);
                }
            }
            Self::report_telemetry(gas, reported_weight, supervisor, watchdog, sink, &mut errors);

            watchdog.feed();
            fetched_target = true;
            match supervisor.fetch_target() {
                Ok(target) => {
                    if let (_, Some(e)) = self.apply_target(target, hw, sink) {
                        record(&mut errors, e);
                    }
                }
                Err(e) => {
                    warn!("Valve target fetch failed ({}), keeping {}", e, self.valve);
                    sink.emit(&AppEvent::SupervisorUnreachable(e));
                    record(&mut errors, e);
                }
            }
            watchdog.feed();
        }

        sink.emit(&AppEvent::Telemetry(TelemetryData {
            gas_concentration: gas,
            weight,
            verdict,
            valve: self.valve,
        }));

        TickReport {
            verdict,
            valve: self.valve,
            changed: self.valve != before,
            fetched_target,
            errors,
        }
    }

    /// Apply a remote target state.
    ///
    /// No-op (no relay drive, no store write) when `target` equals the
    /// current state.  Returns whether the valve moved.
    pub fn apply_remote_target(
        &mut self,
        target: ValveState,
        hw: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) -> bool {
        self.apply_target(target, hw, sink).0
    }

    // ── Queries ───────────────────────────────────────────────

    /// Current authoritative valve state.
    pub fn valve(&self) -> ValveState {
        self.valve
    }

    /// Iterations executed since construction.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// `false` while the store may hold a state other than [`valve`](Self::valve).
    pub fn is_persistence_trusted(&self) -> bool {
        self.persistence_trusted
    }

    /// Sleep between iterations.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn store(&self) -> &ValveStore<S> {
        &self.store
    }

    pub fn into_store(self) -> ValveStore<S> {
        self.store
    }

    // ── Internal ──────────────────────────────────────────────

    fn apply_target(
        &mut self,
        target: ValveState,
        hw: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) -> (bool, Option<StorageError>) {
        if target == self.valve {
            debug!("Supervisor target {} already applied", target);
            return (false, None);
        }

        let from = self.valve;
        self.valve = target;
        hw.drive_valve(target);
        info!("Supervisor target applied: {} -> {}", from, target);
        sink.emit(&AppEvent::ValveChanged {
            from,
            to: target,
            cause: ChangeCause::Remote,
        });

        (true, self.persist(sink).err())
    }

    /// Drive closed on every emergency iteration; persist on change or
    /// when an earlier write is still unconfirmed.
    fn enforce_closed(
        &mut self,
        hw: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) -> Option<StorageError> {
        let from = self.valve;
        self.valve = ValveState::Closed;
        hw.drive_valve(ValveState::Closed);

        if from != ValveState::Closed {
            sink.emit(&AppEvent::ValveChanged {
                from,
                to: ValveState::Closed,
                cause: ChangeCause::Emergency,
            });
            self.persist_pending = true;
        }

        if self.persist_pending {
            self.persist(sink).err()
        } else {
            None
        }
    }

    fn persist(&mut self, sink: &mut impl EventSink) -> Result<(), StorageError> {
        match self.store.store(self.valve) {
            Ok(()) => {
                self.persist_pending = false;
                if !self.persistence_trusted {
                    self.persistence_trusted = true;
                    info!("Valve state {} committed after earlier failure", self.valve);
                    sink.emit(&AppEvent::PersistRecovered(self.valve));
                }
                Ok(())
            }
            Err(e) => {
                self.persist_pending = true;
                self.persistence_trusted = false;
                error!(
                    "Valve state {} NOT persisted ({}); will not survive a reset",
                    self.valve, e
                );
                sink.emit(&AppEvent::PersistFailed {
                    state: self.valve,
                    error: e,
                });
                Err(e)
            }
        }
    }

    /// Best-effort upstream report; needs a gas reading.
    fn report_telemetry(
        gas: Option<u16>,
        weight: f32,
        supervisor: &mut impl SupervisorPort,
        watchdog: &mut impl WatchdogPort,
        sink: &mut impl EventSink,
        errors: &mut heapless::Vec<Error, MAX_TICK_ERRORS>,
    ) {
        let Some(gas_concentration) = gas else {
            debug!("Telemetry report skipped: no gas reading");
            return;
        };

        watchdog.feed();
        let telemetry = Telemetry {
            weight,
            gas_concentration,
        };
        if let Err(e) = supervisor.report(&telemetry) {
            warn!("Telemetry report failed: {}", e);
            sink.emit(&AppEvent::SupervisorUnreachable(e));
            record(errors, e);
        }
        watchdog.feed();
    }
}
