//! Sensor drivers: the MQ-5 gas channel and the HX711 load cell.
//!
//! Both return `Result<_, SensorError>`; the hardware adapter forwards
//! failures to the sync loop unchanged.

pub mod gas;
pub mod load_cell;
