//! MQ-5 combustible gas sensor driver.
//!
//! Reads the analog output through an ESP32-S3 ADC1 channel. The ADC
//! converts at 12 bits; readings are scaled down to a 10-bit range
//! (0..=[`GAS_ADC_MAX`]) so the configured leak threshold is expressed
//! in the same units the supervisor receives.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: reads the gas channel via the oneshot API (initialised by hw_init).
//! On host/test: reads from a static `AtomicU16` for injection.

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use crate::config::GAS_ADC_MAX;
use crate::error::SensorError;

#[cfg(target_os = "espidf")]
use crate::drivers::hw_init;

/// Full-scale value of the 12-bit converter.
pub const ADC_RAW_MAX: u16 = 4095;

#[cfg(not(target_os = "espidf"))]
static SIM_GAS_RAW: AtomicU16 = AtomicU16::new(0);
#[cfg(not(target_os = "espidf"))]
static SIM_GAS_FAULT: AtomicBool = AtomicBool::new(false);

/// Inject the next raw 12-bit conversion result (simulation only).
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_gas_raw(raw: u16) {
    SIM_GAS_RAW.store(raw, Ordering::Relaxed);
}

/// Make subsequent conversions fail (simulation only).
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_gas_fault(fault: bool) {
    SIM_GAS_FAULT.store(fault, Ordering::Relaxed);
}

/// Scale a 12-bit conversion to the 10-bit reporting range.
///
/// Values above [`ADC_RAW_MAX`] are rejected rather than clamped.
pub fn scale_to_10bit(raw: u16) -> Result<u16, SensorError> {
    if raw > ADC_RAW_MAX {
        return Err(SensorError::OutOfRange);
    }
    let scaled = u32::from(raw) * u32::from(GAS_ADC_MAX) / u32::from(ADC_RAW_MAX);
    u16::try_from(scaled).map_err(|_| SensorError::OutOfRange)
}

pub struct GasSensor {
    #[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
    channel: u32,
}

impl GasSensor {
    pub fn new(channel: u32) -> Self {
        Self { channel }
    }

    /// One conversion, scaled to 10 bits.
    pub fn read(&mut self) -> Result<u16, SensorError> {
        scale_to_10bit(self.read_adc()?)
    }

    #[cfg(target_os = "espidf")]
    fn read_adc(&self) -> Result<u16, SensorError> {
        hw_init::adc1_read(self.channel)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_adc(&self) -> Result<u16, SensorError> {
        if SIM_GAS_FAULT.load(Ordering::Relaxed) {
            return Err(SensorError::AdcReadFailed);
        }
        Ok(SIM_GAS_RAW.load(Ordering::Relaxed))
    }
}
