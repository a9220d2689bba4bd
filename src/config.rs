//! System configuration parameters
//!
//! All tunable parameters for the GasValve system.
//! Values can be overridden via NVS (non-volatile storage).

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Maximum length of the supervisor base URL.
pub const MAX_URL_LEN: usize = 96;

/// Highest value the gas channel can report after scaling to 10 bits.
pub const GAS_ADC_MAX: u16 = 1023;

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Gas safety ---
    /// Gas concentration (10-bit ADC counts) above which the valve is
    /// forced closed.
    pub gas_leak_threshold: u16,

    // --- Load cell ---
    /// HX711 counts per weight unit.
    pub load_cell_scale: f32,
    /// Conversions averaged per weight reading.
    pub load_cell_samples: u8,

    // --- Supervisor ---
    /// Base URL of the remote supervisor, without trailing slash.
    pub supervisor_url: heapless::String<MAX_URL_LEN>,
    /// Upper bound for each blocking HTTP exchange (milliseconds).
    pub http_timeout_ms: u32,

    // --- Timing ---
    /// Sleep between control loop iterations (milliseconds).
    pub control_loop_interval_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        let mut supervisor_url = heapless::String::new();
        // Fits: the literal is well under MAX_URL_LEN.
        let _ = supervisor_url.push_str("http://gas-supervisor.local:8000");

        Self {
            // Gas safety (MQ-5 bench tests)
            gas_leak_threshold: 500,

            // Load cell
            load_cell_scale: -2280.0,
            load_cell_samples: 10,

            // Supervisor
            supervisor_url,
            http_timeout_ms: 5000,

            // Timing
            control_loop_interval_ms: 5000,
        }
    }
}

/// Range-check every field.  Rejects, never clamps.
pub fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigError> {
    if !(1..GAS_ADC_MAX).contains(&cfg.gas_leak_threshold) {
        return Err(ConfigError::ValidationFailed(
            "gas_leak_threshold must be 1–1022",
        ));
    }
    if !cfg.load_cell_scale.is_finite() || cfg.load_cell_scale.abs() < f32::EPSILON {
        return Err(ConfigError::ValidationFailed(
            "load_cell_scale must be finite and non-zero",
        ));
    }
    if !(1..=50).contains(&cfg.load_cell_samples) {
        return Err(ConfigError::ValidationFailed(
            "load_cell_samples must be 1–50",
        ));
    }
    if !cfg.supervisor_url.starts_with("http://") || cfg.supervisor_url.len() <= "http://".len() {
        return Err(ConfigError::ValidationFailed(
            "supervisor_url must be an http:// URL",
        ));
    }
    if cfg.supervisor_url.ends_with('/') {
        return Err(ConfigError::ValidationFailed(
            "supervisor_url must not end with '/'",
        ));
    }
    // Each network call is bracketed by watchdog feeds, so a single call
    // must finish inside the watchdog window.
    if !(500..=7000).contains(&cfg.http_timeout_ms) {
        return Err(ConfigError::ValidationFailed(
            "http_timeout_ms must be 500–7000",
        ));
    }
    if !(1000..=60_000).contains(&cfg.control_loop_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "control_loop_interval_ms must be 1000–60000",
        ));
    }
    Ok(())
}
