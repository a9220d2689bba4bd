//! Valve relay driver.
//!
//! One digital output drives the relay coil: HIGH opens the valve, LOW
//! closes it. The driver is a dumb actuator; arbitration between the
//! safety monitor and the supervisor happens in the sync loop.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: drives the real GPIO via hw_init helpers.
//! On host/test: hw_init records the level in a simulated register.

use log::debug;

use crate::drivers::hw_init;
use crate::pins;
use crate::valve::ValveState;

pub struct ValveRelay {
    gpio: i32,
    state: ValveState,
}

impl Default for ValveRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl ValveRelay {
    pub fn new() -> Self {
        Self::on_pin(pins::VALVE_RELAY_GPIO)
    }

    /// Relay on a non-default pin (bench rigs).
    pub fn on_pin(gpio: i32) -> Self {
        Self {
            gpio,
            state: ValveState::Closed,
        }
    }

    /// Drive the coil. Writes the pin even when the level is unchanged.
    pub fn set(&mut self, state: ValveState) {
        hw_init::gpio_write(self.gpio, state.is_open());
        if state != self.state {
            debug!("Relay: {} -> {}", self.state, state);
        }
        self.state = state;
    }

    /// Last level driven.
    pub fn state(&self) -> ValveState {
        self.state
    }
}
