//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ValveSyncLoop (domain)
//! ```
//!
//! Driven adapters (sensors, valve relay, supervisor link, event sinks,
//! storage, watchdog) implement these traits.  The
//! [`ValveSyncLoop`](super::service::ValveSyncLoop) consumes them via
//! generics, so the domain core never touches hardware or sockets directly.

use crate::config::SystemConfig;
use crate::error::{NetworkError, SensorError};
use crate::valve::ValveState;

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port: the domain calls this to obtain sensor data.
pub trait SensorPort {
    /// Gas concentration in 10-bit ADC counts (0–1023).
    fn read_gas(&mut self) -> Result<u16, SensorError>;

    /// Averaged, tared load-cell weight in calibrated units.
    fn read_weight(&mut self) -> Result<f32, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port: drives the valve relay.
pub trait ActuatorPort {
    /// Drive the relay to `state`.  Must take effect before returning.
    fn drive_valve(&mut self, state: ValveState);
}

// ───────────────────────────────────────────────────────────────
// Supervisor port (driven adapter: domain ↔ remote supervisor)
// ───────────────────────────────────────────────────────────────

/// One telemetry report as sent upstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    /// Load-cell weight of the gas cylinder.
    pub weight: f32,
    /// Raw gas concentration (10-bit ADC counts).
    pub gas_concentration: u16,
}

/// Remote supervisor link.  Both calls block for at most the configured
/// timeout; a timeout is an error, never a hang.
pub trait SupervisorPort {
    /// Push one telemetry sample.  Only success or failure matters.
    fn report(&mut self, telemetry: &Telemetry) -> Result<(), NetworkError>;

    /// Fetch the valve position the supervisor wants.
    fn fetch_target(&mut self) -> Result<ValveState, NetworkError>;
}

// ───────────────────────────────────────────────────────────────
// Watchdog port
// ───────────────────────────────────────────────────────────────

/// Liveness keep-alive for the external reset supervisor.
pub trait WatchdogPort {
    fn feed(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// Write operations MUST be atomic (no partial writes on power loss)
/// and MUST have committed to the medium by the time `write` returns
/// `Ok`.  The ESP-IDF NVS API guarantees this per `nvs_commit()`.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// The value read back after a write differs from what was written.
    VerifyFailed,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::VerifyFailed => write!(f, "write not confirmed"),
        }
    }
}
