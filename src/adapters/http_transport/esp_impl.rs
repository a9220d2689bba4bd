//! ESP-IDF platform helpers for `HttpClient`.
//!
//! Compiled only for `target_os = "espidf"`: one `esp_http_client`
//! session per request, torn down when the connection is dropped.

use core::time::Duration;

use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
use esp_idf_svc::sys::{ESP_ERR_HTTP_CONNECT, ESP_ERR_HTTP_EAGAIN, ESP_ERR_TIMEOUT, EspError};
use log::debug;

use super::{HttpResponse, MAX_RESPONSE_LEN, Method};
use crate::error::NetworkError;

fn map_esp(e: EspError) -> NetworkError {
    let code = e.code();
    if code == ESP_ERR_TIMEOUT as i32 || code == ESP_ERR_HTTP_EAGAIN as i32 {
        NetworkError::Timeout
    } else if code == ESP_ERR_HTTP_CONNECT as i32 {
        NetworkError::Connect
    } else {
        NetworkError::Io
    }
}

pub(super) fn esp_request(
    method: Method,
    url: &str,
    body: Option<&[u8]>,
    timeout: Duration,
) -> Result<HttpResponse, NetworkError> {
    let config = Configuration {
        timeout: Some(timeout),
        ..Default::default()
    };
    let mut conn = EspHttpConnection::new(&config).map_err(map_esp)?;

    let payload = body.unwrap_or_default();
    let content_length = payload.len().to_string();
    let headers = [
        ("Content-Type", "application/json"),
        ("Content-Length", content_length.as_str()),
    ];
    let esp_method = match method {
        Method::Get => esp_idf_svc::http::Method::Get,
        Method::Post => esp_idf_svc::http::Method::Post,
    };

    conn.initiate_request(esp_method, url, &headers)
        .map_err(map_esp)?;

    let mut written = 0;
    while written < payload.len() {
        let n = conn.write(&payload[written..]).map_err(map_esp)?;
        if n == 0 {
            return Err(NetworkError::Io);
        }
        written += n;
    }

    conn.initiate_response().map_err(map_esp)?;
    let status = conn.status();

    let mut body = Vec::new();
    let mut chunk = [0u8; 128];
    while body.len() < MAX_RESPONSE_LEN {
        let n = conn.read(&mut chunk).map_err(map_esp)?;
        if n == 0 {
            break;
        }
        let take = n.min(MAX_RESPONSE_LEN - body.len());
        body.extend_from_slice(&chunk[..take]);
    }

    debug!(
        "HTTP: {} {} -> {} ({} bytes)",
        method.as_str(),
        url,
        status,
        body.len()
    );
    Ok(HttpResponse { status, body })
}
