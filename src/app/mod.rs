//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the business rules for the GasValve system: the
//! valve synchronisation loop that arbitrates between the local gas safety
//! verdict and the remote supervisor.  All interaction with hardware,
//! storage and the network happens through **port traits** defined in
//! [`ports`], keeping this layer fully testable without real peripherals.

pub mod events;
pub mod ports;
pub mod service;
