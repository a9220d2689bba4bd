//! GasValve firmware entry point.
//!
//! Hexagonal architecture around a single blocking control loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter    LogEventSink   NvsAdapter   HttpSupervisor │
//! │  (Sensor+Actuator)  (EventSink)    (Config+NVS) (Supervisor)   │
//! │  Watchdog           wifi (boot-time link)                      │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │             ValveSyncLoop (pure logic)                 │    │
//! │  │     SafetyMonitor · ValveStore · remote target         │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! On ESP-IDF this drives the real board.  On any other target it runs
//! the same loop against simulated sensors and relay, talking to a real
//! supervisor over plain HTTP.
#![deny(unused_must_use)]

use anyhow::{Result, anyhow};
use log::{info, warn};

use gasvalve::adapters::hardware::HardwareAdapter;
use gasvalve::adapters::http_transport::HttpClient;
use gasvalve::adapters::log_sink::LogEventSink;
use gasvalve::adapters::nvs::NvsAdapter;
use gasvalve::adapters::supervisor::HttpSupervisor;
use gasvalve::app::ports::ConfigPort;
use gasvalve::app::service::ValveSyncLoop;
use gasvalve::config::SystemConfig;
use gasvalve::drivers::valve_relay::ValveRelay;
use gasvalve::drivers::watchdog::Watchdog;
use gasvalve::error::Error;
use gasvalve::pins;
use gasvalve::sensors::gas::GasSensor;
use gasvalve::sensors::load_cell::LoadCell;
use gasvalve::store::ValveStore;

// ── Shared bootstrap ──────────────────────────────────────────

fn banner() {
    info!("╔══════════════════════════════════════╗");
    info!("║  GasValve v{:<26}║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");
}

/// Configuration from NVS, falling back to defaults.
fn load_config(nvs: &NvsAdapter) -> SystemConfig {
    match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    }
}

fn open_nvs() -> Result<NvsAdapter> {
    NvsAdapter::new().map_err(|e| anyhow!(Error::from(e)))
}

// ── ESP-IDF main ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn main() -> Result<()> {
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::delay::Ets;
    use esp_idf_svc::hal::gpio::{AnyIOPin, PinDriver};
    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use gasvalve::adapters::wifi::{self, WifiCredentials};

    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;
    banner();

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // ── 2. Peripherals + watchdog ─────────────────────────────
    gasvalve::drivers::hw_init::init_peripherals().map_err(|e| {
        log::error!("HAL init failed: {}", e);
        anyhow!(Error::from(e))
    })?;
    let mut watchdog = Watchdog::new();

    // ── 3. Config + persisted valve state ─────────────────────
    let nvs = open_nvs()?;
    let config = load_config(&nvs);
    let store = ValveStore::new(nvs);

    // ── 4. Hardware adapter ───────────────────────────────────
    // SAFETY: the HX711 pins are not claimed anywhere else; `pins` is the
    // single source of truth for the board wiring.
    let dout = PinDriver::input(unsafe { AnyIOPin::new(pins::HX711_DT_GPIO) })?;
    let sck = PinDriver::output(unsafe { AnyIOPin::new(pins::HX711_SCK_GPIO) })?;
    let load_cell = LoadCell::new(dout, sck, Ets, config.load_cell_scale)
        .map_err(|e| anyhow!(Error::from(e)))?;
    let mut hw = HardwareAdapter::new(
        GasSensor::new(pins::GAS_ADC_CHANNEL),
        load_cell,
        ValveRelay::new(),
        &config,
    );

    // ── 5. Restore the valve before anything can block ────────
    let mut sink = LogEventSink::new();
    let mut app = ValveSyncLoop::new(&config, store);
    app.start(&mut hw, &mut sink);

    watchdog.feed();
    if let Err(e) = hw.tare() {
        warn!("Load cell tare failed ({}), weights are uncalibrated", e);
    }

    // ── 6. Network link ───────────────────────────────────────
    let _wifi = match WifiCredentials::from_build_env() {
        Ok(creds) => Some(wifi::connect(
            peripherals.modem,
            sysloop,
            nvs_partition,
            &creds,
            &mut watchdog,
        )?),
        Err(e) => {
            warn!("WiFi disabled ({}), supervisor unreachable", e);
            None
        }
    };
    let mut supervisor =
        HttpSupervisor::new(HttpClient::new(), &config).map_err(|e| anyhow!(Error::from(e)))?;

    // ── 7. Control loop ───────────────────────────────────────
    info!("System ready. Entering control loop.");
    loop {
        let report = app.tick(&mut hw, &mut supervisor, &mut watchdog, &mut sink);
        for e in &report.errors {
            log::debug!("tick {}: {}", app.tick_count(), e);
        }
        std::thread::sleep(app.interval());
    }
}

// ── Host simulator main ───────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
fn main() -> Result<()> {
    use gasvalve::adapters::wifi;
    use gasvalve::config::validate_config;
    use gasvalve::sensors::gas::{ADC_RAW_MAX, sim_set_gas_fault, sim_set_gas_raw};
    use gasvalve::sensors::load_cell::sim;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    banner();

    gasvalve::drivers::hw_init::init_peripherals().map_err(|e| anyhow!(Error::from(e)))?;
    let mut watchdog = Watchdog::new();

    let nvs = open_nvs()?;
    let mut config = load_config(&nvs);
    if let Ok(url) = std::env::var("GASVALVE_SUPERVISOR_URL") {
        config.supervisor_url.clear();
        config
            .supervisor_url
            .push_str(&url)
            .map_err(|()| anyhow!("GASVALVE_SUPERVISOR_URL too long"))?;
    }
    validate_config(&config).map_err(|e| anyhow!(Error::from(e)))?;
    let store = ValveStore::new(nvs);

    // Simulated gas level in 10-bit counts, fed to the 12-bit sim ADC.
    let gas: u16 = env_parse("GASVALVE_SIM_GAS").unwrap_or(100);
    let raw = u32::from(gas.min(1023)) * u32::from(ADC_RAW_MAX) / 1023;
    sim_set_gas_raw(u16::try_from(raw).unwrap_or(ADC_RAW_MAX));
    if std::env::var_os("GASVALVE_SIM_GAS_FAULT").is_some() {
        warn!("Simulating a dead gas sensor");
        sim_set_gas_fault(true);
    }
    sim::sim_set_load_raw(0);

    let (dout, sck) = sim::pins();
    let load_cell = LoadCell::new(dout, sck, sim::SimDelay, config.load_cell_scale)
        .map_err(|e| anyhow!(Error::from(e)))?;
    let mut hw = HardwareAdapter::new(
        GasSensor::new(pins::GAS_ADC_CHANNEL),
        load_cell,
        ValveRelay::new(),
        &config,
    );

    let mut sink = LogEventSink::new();
    let mut app = ValveSyncLoop::new(&config, store);
    app.start(&mut hw, &mut sink);
    if let Err(e) = hw.tare() {
        warn!("Load cell tare failed ({})", e);
    }
    // Pretend a 2 kg cylinder sits on the tared cell.
    #[allow(clippy::cast_possible_truncation)]
    sim::sim_set_load_raw((2.0 * config.load_cell_scale) as i32);

    wifi::connect(&mut watchdog);
    let mut supervisor =
        HttpSupervisor::new(HttpClient::new(), &config).map_err(|e| anyhow!(Error::from(e)))?;
    info!(
        "Supervisor: reports to {}, target from {}",
        supervisor.report_url(),
        supervisor.valve_state_url()
    );

    let iterations: Option<u64> = env_parse("GASVALVE_SIM_ITERATIONS");
    info!("Simulation ready (gas={}). Entering control loop.", gas);
    loop {
        let report = app.tick(&mut hw, &mut supervisor, &mut watchdog, &mut sink);
        for e in &report.errors {
            log::debug!("tick {}: {}", app.tick_count(), e);
        }
        if iterations.is_some_and(|n| app.tick_count() >= n) {
            info!(
                "Simulation done after {} iterations, valve {}",
                app.tick_count(),
                app.valve()
            );
            return Ok(());
        }
        std::thread::sleep(app.interval());
    }
}

#[cfg(not(target_os = "espidf"))]
fn env_parse<T: core::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}
