//! Hardware adapter bridging real peripherals to the domain port traits.
//!
//! Owns the gas sensor, the load cell and the valve relay, exposing them
//! through [`SensorPort`] and [`ActuatorPort`].  This is the only module
//! in the system that touches actual hardware.  On non-espidf targets the
//! gas channel and relay use cfg-gated simulation stubs; the load cell is
//! generic over `embedded-hal` pins and runs on whatever it is given.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::app::ports::{ActuatorPort, SensorPort};
use crate::config::SystemConfig;
use crate::drivers::valve_relay::ValveRelay;
use crate::error::SensorError;
use crate::sensors::gas::GasSensor;
use crate::sensors::load_cell::LoadCell;
use crate::valve::ValveState;

/// Concrete adapter that combines all hardware behind port traits.
pub struct HardwareAdapter<DT, SCK, D> {
    gas: GasSensor,
    load_cell: LoadCell<DT, SCK, D>,
    relay: ValveRelay,
    weight_samples: u8,
}

impl<DT, SCK, D> HardwareAdapter<DT, SCK, D>
where
    DT: InputPin,
    SCK: OutputPin,
    D: DelayNs,
{
    pub fn new(
        gas: GasSensor,
        load_cell: LoadCell<DT, SCK, D>,
        relay: ValveRelay,
        config: &SystemConfig,
    ) -> Self {
        Self {
            gas,
            load_cell,
            relay,
            weight_samples: config.load_cell_samples,
        }
    }

    /// Zero the load cell against the current load.
    pub fn tare(&mut self) -> Result<(), SensorError> {
        self.load_cell.tare(self.weight_samples)
    }
}

// ── SensorPort implementation ─────────────────────────────────

impl<DT, SCK, D> SensorPort for HardwareAdapter<DT, SCK, D>
where
    DT: InputPin,
    SCK: OutputPin,
    D: DelayNs,
{
    fn read_gas(&mut self) -> Result<u16, SensorError> {
        self.gas.read()
    }

    fn read_weight(&mut self) -> Result<f32, SensorError> {
        self.load_cell.read_units(self.weight_samples)
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl<DT, SCK, D> ActuatorPort for HardwareAdapter<DT, SCK, D> {
    fn drive_valve(&mut self, state: ValveState) {
        self.relay.set(state);
    }
}
