//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the logger (UART / USB-CDC in production, stderr on the host).

use log::{error, info, warn};

use crate::app::events::{AppEvent, ChangeCause};
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

/// Renders `None` as `--`.
struct Maybe<T>(Option<T>);

impl<T: core::fmt::Display> core::fmt::Display for Maybe<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.0 {
            Some(v) => v.fmt(f),
            None => f.write_str("--"),
        }
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Telemetry(t) => {
                info!(
                    "TELEM | gas={} | weight={} | verdict={:?} | valve={}",
                    Maybe(t.gas_concentration),
                    Maybe(t.weight),
                    t.verdict,
                    t.valve,
                );
            }
            AppEvent::Started(state) => {
                info!("START | valve={}", state);
            }
            AppEvent::EmergencyShutoff { gas } => {
                error!("SAFETY | emergency shutoff, gas={}", Maybe(*gas));
            }
            AppEvent::ValveChanged { from, to, cause } => {
                let cause = match cause {
                    ChangeCause::Emergency => "emergency",
                    ChangeCause::Remote => "remote",
                };
                info!("VALVE | {} -> {} ({})", from, to, cause);
            }
            AppEvent::PersistFailed { state, error } => {
                error!("STORE | {} not persisted: {}", state, error);
            }
            AppEvent::PersistRecovered(state) => {
                info!("STORE | {} persisted, store trusted again", state);
            }
            AppEvent::SupervisorUnreachable(e) => {
                warn!("LINK | supervisor unreachable: {}", e);
            }
        }
    }
}
