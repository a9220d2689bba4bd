//! Actuator drivers, hardware initialisation, and the task watchdog.

pub mod hw_init;
pub mod valve_relay;
pub mod watchdog;
