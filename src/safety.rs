//! Gas safety monitor.
//!
//! Decides, from a single gas-concentration sample, whether the valve must
//! be forced closed.  The decision is local and never consults the network.
//!
//! There is no hysteresis: a sample one count above the
//! threshold followed by one a count below flips the verdict back on the
//! very next iteration.

use crate::config::SystemConfig;

/// Outcome of a safety evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Gas concentration at or below the threshold.
    Normal,
    /// Gas concentration above the threshold: close the valve now.
    Emergency,
}

impl Verdict {
    pub const fn is_emergency(self) -> bool {
        matches!(self, Self::Emergency)
    }
}

/// Pure threshold comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyMonitor {
    threshold: u16,
}

impl SafetyMonitor {
    pub const fn new(threshold: u16) -> Self {
        Self { threshold }
    }

    pub fn from_config(config: &SystemConfig) -> Self {
        Self::new(config.gas_leak_threshold)
    }

    /// `Emergency` iff `gas_concentration` exceeds the threshold.
    pub const fn evaluate(&self, gas_concentration: u16) -> Verdict {
        if gas_concentration > self.threshold {
            Verdict::Emergency
        } else {
            Verdict::Normal
        }
    }

    pub const fn threshold(&self) -> u16 {
        self.threshold
    }
}
