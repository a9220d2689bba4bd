//! GPIO / peripheral pin assignments for the GasValve controller board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Valve relay
// ---------------------------------------------------------------------------

/// Digital output driving the valve relay coil. HIGH = valve open.
pub const VALVE_RELAY_GPIO: i32 = 4;

// ---------------------------------------------------------------------------
// Sensors: analog (ADC1)
// ---------------------------------------------------------------------------

/// MQ-5 gas sensor analog output via resistive divider.
/// ADC1 channel 0, which is GPIO 1 on the ESP32-S3.
pub const GAS_ADC_CHANNEL: u32 = 0;

// ---------------------------------------------------------------------------
// Load cell (HX711)
// ---------------------------------------------------------------------------

/// HX711 data out (DOUT). LOW = conversion ready.
pub const HX711_DT_GPIO: i32 = 5;
/// HX711 serial clock (PD_SCK).
pub const HX711_SCK_GPIO: i32 = 6;
