//! Outbound application events.
//!
//! The [`ValveSyncLoop`](super::service::ValveSyncLoop) emits these through
//! the [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them.

use crate::app::ports::StorageError;
use crate::error::NetworkError;
use crate::safety::Verdict;
use crate::valve::ValveState;

/// Why the valve moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    /// Local gas emergency (or unreadable gas sensor).
    Emergency,
    /// The remote supervisor asked for a different position.
    Remote,
}

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The loop has started; carries the state loaded from the store.
    Started(ValveState),

    /// Per-iteration sensor snapshot.
    Telemetry(TelemetryData),

    /// Gas above threshold or gas sensor unreadable (`gas == None`).
    EmergencyShutoff { gas: Option<u16> },

    /// The valve position changed.
    ValveChanged {
        from: ValveState,
        to: ValveState,
        cause: ChangeCause,
    },

    /// The valve state could not be committed to the store; it must not
    /// be trusted across a reset until a later write succeeds.
    PersistFailed { state: ValveState, error: StorageError },

    /// A previously failed write has now been committed.
    PersistRecovered(ValveState),

    /// A supervisor exchange failed.
    SupervisorUnreachable(NetworkError),
}

/// A point-in-time snapshot suitable for logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryData {
    pub gas_concentration: Option<u16>,
    pub weight: Option<f32>,
    pub verdict: Verdict,
    pub valve: ValveState,
}
