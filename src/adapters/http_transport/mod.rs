//! Blocking HTTP transport.
//!
//! [`HttpTransport`] is the narrow request/response interface the
//! supervisor adapter talks through.  [`HttpClient`] implements it:
//!
//! - **`target_os = "espidf"`**: ESP-IDF `esp_http_client` via
//!   `esp_idf_svc::http::client::EspHttpConnection`.
//! - **all other targets**: `reqwest` blocking client for the host
//!   simulator.
//!
//! ## Timeout model
//!
//! Every request carries one deadline covering connect, send and receive.
//! Running past it yields [`NetworkError::Timeout`], never a hang.  No
//! idle connection is kept between iterations.

use core::time::Duration;

use crate::error::NetworkError;

#[cfg(not(target_os = "espidf"))]
use log::debug;
#[cfg(not(target_os = "espidf"))]
use reqwest::blocking::Client;

// ───────────────────────────────────────────────────────────────
// ESP-IDF platform helpers
// ───────────────────────────────────────────────────────────────
#[cfg(target_os = "espidf")]
mod esp_impl;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

/// Response bodies beyond this size are truncated (the supervisor's
/// answers are a few dozen bytes).
pub const MAX_RESPONSE_LEN: usize = 1024;

// ───────────────────────────────────────────────────────────────
// Transport trait
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// One blocking HTTP exchange, bounded by `timeout`.
///
/// `body`, when present, is sent as `application/json`.
pub trait HttpTransport {
    fn request(
        &mut self,
        method: Method,
        url: &str,
        body: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<HttpResponse, NetworkError>;
}

// ───────────────────────────────────────────────────────────────
// HttpClient
// ───────────────────────────────────────────────────────────────

/// Platform HTTP client.
#[derive(Debug, Default)]
pub struct HttpClient {
    /// Built on first use so construction stays infallible.
    #[cfg(not(target_os = "espidf"))]
    client: Option<Client>,
}

impl HttpClient {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HttpTransport for HttpClient {
    fn request(
        &mut self,
        method: Method,
        url: &str,
        body: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<HttpResponse, NetworkError> {
        self.platform_request(method, url, body, timeout)
    }
}

// ── Platform helpers: request ─────────────────────────────────

#[cfg(target_os = "espidf")]
impl HttpClient {
    fn platform_request(
        &mut self,
        method: Method,
        url: &str,
        body: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<HttpResponse, NetworkError> {
        esp_impl::esp_request(method, url, body, timeout)
    }
}

#[cfg(not(target_os = "espidf"))]
impl HttpClient {
    fn client(&mut self) -> Result<&Client, NetworkError> {
        if self.client.is_none() {
            let built = Client::builder()
                .pool_max_idle_per_host(0)
                .build()
                .map_err(|e| map_reqwest(&e))?;
            self.client = Some(built);
        }
        self.client.as_ref().ok_or(NetworkError::Io)
    }

    fn platform_request(
        &mut self,
        method: Method,
        url: &str,
        body: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<HttpResponse, NetworkError> {
        let client = self.client()?;
        let builder = match method {
            Method::Get => client.get(url),
            Method::Post => client.post(url),
        };
        let response = builder
            .timeout(timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.unwrap_or_default().to_vec())
            .send()
            .map_err(|e| map_reqwest(&e))?;

        let status = response.status().as_u16();
        let bytes = response.bytes().map_err(|e| map_reqwest(&e))?;
        let body = bytes[..bytes.len().min(MAX_RESPONSE_LEN)].to_vec();
        debug!(
            "HTTP(sim): {} {} -> {} ({} bytes)",
            method.as_str(),
            url,
            status,
            body.len()
        );
        Ok(HttpResponse { status, body })
    }
}

#[cfg(not(target_os = "espidf"))]
fn map_reqwest(e: &reqwest::Error) -> NetworkError {
    if e.is_timeout() {
        NetworkError::Timeout
    } else if e.is_builder() {
        NetworkError::InvalidUrl
    } else if e.is_connect() {
        NetworkError::Connect
    } else {
        NetworkError::Io
    }
}
