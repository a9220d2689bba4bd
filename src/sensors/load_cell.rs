//! HX711 load cell amplifier driver.
//!
//! Bit-banged two-wire interface over `embedded-hal` 1.0 pins, so the same
//! driver runs on `esp_idf_hal::gpio::PinDriver` and on test doubles.
//!
//! ```text
//!   DOUT ‾‾‾\___________ ready ___ b23 ___ b22 ... b0 ___ (gain pulse)
//!   SCK  ____________________/‾\___/‾\_______/‾\______/‾\____
//! ```
//!
//! Each conversion is 24-bit two's complement, MSB first. One extra clock
//! pulse after the data selects channel A at gain 128 for the next
//! conversion. Holding SCK high for more than 60 µs powers the chip down,
//! so each pulse is kept to a couple of microseconds.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::{debug, info};

use crate::error::SensorError;

/// Poll interval while waiting for DOUT to go low.
const READY_POLL_US: u32 = 1_000;
/// Give up waiting for a conversion after this many polls (500 ms; the
/// chip converts at 10 or 80 SPS).
const READY_TIMEOUT_POLLS: u32 = 500;
/// Half-period of the serial clock.
const SCK_HALF_PERIOD_US: u32 = 1;
/// Data bits per conversion.
const DATA_BITS: u8 = 24;
/// Extra pulses after the data: 1 = channel A, gain 128.
const GAIN_PULSES: u8 = 1;

pub struct LoadCell<DT, SCK, D> {
    dout: DT,
    sck: SCK,
    delay: D,
    /// Raw count at zero load, set by [`tare`](Self::tare).
    offset: i32,
    /// Raw counts per weight unit.
    scale: f32,
}

impl<DT, SCK, D> LoadCell<DT, SCK, D>
where
    DT: InputPin,
    SCK: OutputPin,
    D: DelayNs,
{
    /// Take the pins and park SCK low.
    ///
    /// Fails if SCK cannot be driven: a clock stuck high keeps the chip
    /// powered down.
    pub fn new(dout: DT, mut sck: SCK, delay: D, scale: f32) -> Result<Self, SensorError> {
        sck.set_low().map_err(|_| SensorError::AdcReadFailed)?;
        Ok(Self {
            dout,
            sck,
            delay,
            offset: 0,
            scale,
        })
    }

    /// `true` when a conversion is waiting to be clocked out.
    pub fn is_ready(&mut self) -> Result<bool, SensorError> {
        self.dout.is_low().map_err(|_| SensorError::AdcReadFailed)
    }

    /// Clock out one raw conversion, waiting up to 500 ms for it.
    pub fn read_raw(&mut self) -> Result<i32, SensorError> {
        self.wait_ready()?;

        let mut value: u32 = 0;
        for _ in 0..DATA_BITS {
            self.pulse()?;
            let bit = self.dout.is_high().map_err(|_| SensorError::AdcReadFailed)?;
            value = (value << 1) | u32::from(bit);
        }
        for _ in 0..GAIN_PULSES {
            self.pulse()?;
        }

        Ok(sign_extend_24(value))
    }

    /// Mean of `samples` raw conversions (at least one is taken).
    pub fn read_average(&mut self, samples: u8) -> Result<i32, SensorError> {
        let n = samples.max(1);
        let mut sum: i64 = 0;
        for _ in 0..n {
            sum += i64::from(self.read_raw()?);
        }
        i32::try_from(sum / i64::from(n)).map_err(|_| SensorError::OutOfRange)
    }

    /// Record the current average as the zero-load offset.
    pub fn tare(&mut self, samples: u8) -> Result<(), SensorError> {
        self.offset = self.read_average(samples)?;
        info!("LoadCell: tared at {} counts", self.offset);
        Ok(())
    }

    /// Averaged reading converted to weight units.
    pub fn read_units(&mut self, samples: u8) -> Result<f32, SensorError> {
        let raw = self.read_average(samples)?;
        let units = counts_to_units(raw, self.offset, self.scale)?;
        debug!("LoadCell: raw={} units={}", raw, units);
        Ok(units)
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    // ── Internal ──────────────────────────────────────────────

    fn wait_ready(&mut self) -> Result<(), SensorError> {
        for _ in 0..READY_TIMEOUT_POLLS {
            if self.is_ready()? {
                return Ok(());
            }
            self.delay.delay_us(READY_POLL_US);
        }
        Err(SensorError::NotReady)
    }

    fn pulse(&mut self) -> Result<(), SensorError> {
        self.sck.set_high().map_err(|_| SensorError::AdcReadFailed)?;
        self.delay.delay_us(SCK_HALF_PERIOD_US);
        self.sck.set_low().map_err(|_| SensorError::AdcReadFailed)?;
        self.delay.delay_us(SCK_HALF_PERIOD_US);
        Ok(())
    }
}

fn sign_extend_24(value: u32) -> i32 {
    // Move bit 23 into the sign position, then shift back arithmetically.
    ((value << 8) as i32) >> 8
}

/// `(raw - offset) / scale`, rejecting results that are not finite.
pub fn counts_to_units(raw: i32, offset: i32, scale: f32) -> Result<f32, SensorError> {
    let delta = i64::from(raw) - i64::from(offset);
    #[allow(clippy::cast_precision_loss)]
    let units = delta as f32 / scale;
    if units.is_finite() {
        Ok(units)
    } else {
        Err(SensorError::OutOfRange)
    }
}

// ───────────────────────────────────────────────────────────────
// Host simulation
// ───────────────────────────────────────────────────────────────

/// A simulated HX711 for the host build.  Every conversion returns the
/// value last set with [`sim::sim_set_load_raw`].
#[cfg(not(target_os = "espidf"))]
pub mod sim {
    use core::cell::Cell;
    use core::convert::Infallible;
    use core::sync::atomic::{AtomicI32, Ordering};
    use std::rc::Rc;

    use embedded_hal::delay::DelayNs;
    use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

    use super::{DATA_BITS, GAIN_PULSES};

    static SIM_LOAD_RAW: AtomicI32 = AtomicI32::new(0);

    /// Set the raw 24-bit count the simulated chip reports.
    pub fn sim_set_load_raw(raw: i32) {
        SIM_LOAD_RAW.store(raw, Ordering::Relaxed);
    }

    #[derive(Default)]
    struct Shift {
        pulses: Cell<u8>,
        word: Cell<u32>,
    }

    pub struct SimDout(Rc<Shift>);
    pub struct SimSck(Rc<Shift>);

    /// Delay that returns immediately.
    pub struct SimDelay;

    /// Data and clock pins wired to one simulated chip.
    pub fn pins() -> (SimDout, SimSck) {
        let chip = Rc::new(Shift::default());
        (SimDout(chip.clone()), SimSck(chip))
    }

    impl ErrorType for SimDout {
        type Error = Infallible;
    }

    impl InputPin for SimDout {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            self.is_low().map(|low| !low)
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            let pulses = self.0.pulses.get();
            if pulses == 0 {
                // Always a conversion waiting.
                return Ok(true);
            }
            let bit = (self.0.word.get() >> (u32::from(DATA_BITS) - u32::from(pulses))) & 1;
            Ok(bit == 0)
        }
    }

    impl ErrorType for SimSck {
        type Error = Infallible;
    }

    impl OutputPin for SimSck {
        fn set_low(&mut self) -> Result<(), Infallible> {
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            let mut pulses = self.0.pulses.get();
            if pulses == 0 {
                #[allow(clippy::cast_sign_loss)]
                let raw = SIM_LOAD_RAW.load(Ordering::Relaxed) as u32;
                self.0.word.set(raw & 0x00FF_FFFF);
            }
            pulses += 1;
            if pulses == DATA_BITS + GAIN_PULSES {
                pulses = 0;
            }
            self.0.pulses.set(pulses);
            Ok(())
        }
    }

    impl DelayNs for SimDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }
}
