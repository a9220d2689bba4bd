//! Supervisor adapter: implements [`SupervisorPort`] over HTTP.
//!
//! Two endpoints below the configured base URL:
//!
//! | Call           | Request                    | Body                                  |
//! |----------------|----------------------------|---------------------------------------|
//! | `report`       | `POST <base>/data`         | `{"gas_level":<f32>,"gas_leak":<u16>}` |
//! | `fetch_target` | `GET <base>/get-valve-state` | response `{"is_open":<bool>}`       |
//!
//! Extra fields in the valve-state response are ignored.

use core::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{SupervisorPort, Telemetry};
use crate::config::{MAX_URL_LEN, SystemConfig};
use crate::error::NetworkError;
use crate::valve::ValveState;

use super::http_transport::{HttpTransport, Method};

/// Longest endpoint suffix plus headroom.
pub const MAX_ENDPOINT_LEN: usize = MAX_URL_LEN + 32;

const REPORT_PATH: &str = "/data";
const VALVE_STATE_PATH: &str = "/get-valve-state";

type Endpoint = heapless::String<MAX_ENDPOINT_LEN>;

// ── Wire shapes ───────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ReportBody {
    gas_level: f32,
    gas_leak: u16,
}

#[derive(Debug, Deserialize)]
struct ValveStateBody {
    is_open: bool,
}

// ───────────────────────────────────────────────────────────────
// HttpSupervisor
// ───────────────────────────────────────────────────────────────

pub struct HttpSupervisor<T: HttpTransport> {
    transport: T,
    report_url: Endpoint,
    valve_state_url: Endpoint,
    timeout: Duration,
}

impl<T: HttpTransport> HttpSupervisor<T> {
    /// Build both endpoint URLs from `config.supervisor_url`.
    pub fn new(transport: T, config: &SystemConfig) -> Result<Self, NetworkError> {
        let base = config.supervisor_url.as_str();
        Ok(Self {
            transport,
            report_url: endpoint(base, REPORT_PATH)?,
            valve_state_url: endpoint(base, VALVE_STATE_PATH)?,
            timeout: Duration::from_millis(u64::from(config.http_timeout_ms)),
        })
    }

    pub fn report_url(&self) -> &str {
        &self.report_url
    }

    pub fn valve_state_url(&self) -> &str {
        &self.valve_state_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

fn endpoint(base: &str, path: &str) -> Result<Endpoint, NetworkError> {
    let mut url = Endpoint::new();
    url.push_str(base).map_err(|()| NetworkError::InvalidUrl)?;
    url.push_str(path).map_err(|()| NetworkError::InvalidUrl)?;
    Ok(url)
}

impl<T: HttpTransport> SupervisorPort for HttpSupervisor<T> {
    fn report(&mut self, telemetry: &Telemetry) -> Result<(), NetworkError> {
        let body = serde_json::to_vec(&ReportBody {
            gas_level: telemetry.weight,
            gas_leak: telemetry.gas_concentration,
        })
        .map_err(|_| NetworkError::MalformedPayload)?;

        let response =
            self.transport
                .request(Method::Post, &self.report_url, Some(&body), self.timeout)?;
        if !(200..300).contains(&response.status) {
            warn!("Supervisor: report rejected with HTTP {}", response.status);
            return Err(NetworkError::Status(response.status));
        }
        debug!("Supervisor: telemetry accepted ({})", response.status);
        Ok(())
    }

    fn fetch_target(&mut self) -> Result<ValveState, NetworkError> {
        let response =
            self.transport
                .request(Method::Get, &self.valve_state_url, None, self.timeout)?;
        if response.status != 200 {
            return Err(NetworkError::Status(response.status));
        }
        let parsed: ValveStateBody = serde_json::from_slice(&response.body)
            .map_err(|_| NetworkError::MalformedPayload)?;
        Ok(ValveState::from_is_open(parsed.is_open))
    }
}
