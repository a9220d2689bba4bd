//! WiFi station-mode link bring-up.
//!
//! The supervisor is only reachable over WiFi, so `main()` brings the
//! link up once at boot before the sync loop starts.  Connection attempts
//! repeat every [`CONNECT_RETRY_MS`] until one succeeds, feeding the
//! watchdog on every attempt so a missing access point stalls the boot
//! without resetting the device.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::BlockingWifi` over `EspWifi`.
//! - **all other targets**: the host shares the machine's network; nothing to do.
//!
//! Credentials come from the build environment (`GASVALVE_WIFI_SSID`,
//! `GASVALVE_WIFI_PASSWORD`).

use core::fmt;
use core::time::Duration;

use log::{info, warn};

use crate::app::ports::WatchdogPort;

/// Pause between failed connection attempts.
pub const CONNECT_RETRY_MS: u64 = 500;

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Credentials
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
}

impl WifiCredentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        let mut creds = Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
        };
        creds
            .ssid
            .push_str(ssid)
            .map_err(|()| ConnectivityError::InvalidSsid)?;
        creds
            .password
            .push_str(password)
            .map_err(|()| ConnectivityError::InvalidPassword)?;
        Ok(creds)
    }

    /// Credentials baked in at build time.
    pub fn from_build_env() -> Result<Self, ConnectivityError> {
        let ssid = option_env!("GASVALVE_WIFI_SSID").ok_or(ConnectivityError::NoCredentials)?;
        Self::new(ssid, option_env!("GASVALVE_WIFI_PASSWORD").unwrap_or(""))
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

// ───────────────────────────────────────────────────────────────
// Retry loop
// ───────────────────────────────────────────────────────────────

/// Call `attempt` until it succeeds, feeding `watchdog` before each try
/// and calling `pause` between failures.  Returns the number of attempts.
pub fn retry_until_connected<E: fmt::Display>(
    mut attempt: impl FnMut() -> Result<(), E>,
    watchdog: &mut impl WatchdogPort,
    mut pause: impl FnMut(Duration),
) -> u32 {
    let mut attempts = 0u32;
    loop {
        watchdog.feed();
        attempts = attempts.saturating_add(1);
        match attempt() {
            Ok(()) => return attempts,
            Err(e) => {
                if attempts == 1 || attempts % 20 == 0 {
                    warn!("WiFi: connect attempt {} failed: {}", attempts, e);
                }
                pause(Duration::from_millis(CONNECT_RETRY_MS));
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Platform bring-up
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub fn connect(
    modem: esp_idf_svc::hal::modem::Modem,
    sysloop: esp_idf_svc::eventloop::EspSystemEventLoop,
    nvs: esp_idf_svc::nvs::EspDefaultNvsPartition,
    credentials: &WifiCredentials,
    watchdog: &mut impl WatchdogPort,
) -> anyhow::Result<Box<esp_idf_svc::wifi::EspWifi<'static>>> {
    use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

    let mut esp_wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sysloop)?;

    let auth_method = if credentials.is_open() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: credentials
            .ssid()
            .try_into()
            .map_err(|()| anyhow::anyhow!(ConnectivityError::InvalidSsid))?,
        password: credentials
            .password()
            .try_into()
            .map_err(|()| anyhow::anyhow!(ConnectivityError::InvalidPassword))?,
        auth_method,
        ..Default::default()
    }))?;

    info!("WiFi: starting, SSID '{}'", credentials.ssid());
    wifi.start()?;

    let attempts = retry_until_connected(
        || {
            wifi.connect()?;
            wifi.wait_netif_up()
        },
        watchdog,
        std::thread::sleep,
    );

    let ip_info = wifi.wifi().sta_netif().get_ip_info()?;
    info!("WiFi: connected after {} attempt(s), {:?}", attempts, ip_info);

    drop(wifi);
    Ok(Box::new(esp_wifi))
}

#[cfg(not(target_os = "espidf"))]
pub fn connect(watchdog: &mut impl WatchdogPort) {
    watchdog.feed();
    info!("WiFi(sim): host network assumed up");
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
