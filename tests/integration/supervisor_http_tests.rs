//! The sync loop talking to a real (local) HTTP supervisor.
//!
//! A throwaway `TcpListener` plays the supervisor; the loop runs with
//! [`HttpSupervisor`] over the host [`HttpClient`].  Replies are HTTP/1.0
//! with `Content-Length`, so the client never reuses a connection.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::JoinHandle;

use gasvalve::adapters::http_transport::HttpClient;
use gasvalve::adapters::supervisor::HttpSupervisor;
use gasvalve::app::service::ValveSyncLoop;
use gasvalve::config::SystemConfig;
use gasvalve::error::{Error, NetworkError};
use gasvalve::store::ValveStore;
use gasvalve::valve::ValveState;

use crate::mock_hw::{MockHardware, MockWatchdog, RecordingSink, SharedFlash};

/// One request as the server saw it: request line and body.
type Seen = (String, String);

fn read_request(sock: &mut TcpStream) -> Seen {
    let mut raw = Vec::new();
    let mut buf = [0u8; 512];
    let header_end = loop {
        let n = sock.read(&mut buf).unwrap();
        assert!(n > 0, "client closed before sending headers");
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8(raw[..header_end].to_vec()).unwrap();
    let content_length = head
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case("content-length").then_some(value)
        })
        .map_or(0, |v| v.trim().parse::<usize>().unwrap());
    while raw.len() < header_end + content_length {
        let n = sock.read(&mut buf).unwrap();
        raw.extend_from_slice(&buf[..n]);
    }
    let request_line = head.lines().next().unwrap().to_string();
    let body = String::from_utf8(raw[header_end..header_end + content_length].to_vec()).unwrap();
    (request_line, body)
}

/// Serve exactly `replies.len()` connections, answering each in turn.
fn serve(replies: Vec<(u16, &'static str)>) -> (u16, JoinHandle<Vec<Seen>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = std::thread::spawn(move || {
        let mut seen = Vec::new();
        for (status, body) in replies {
            let (mut sock, _) = listener.accept().unwrap();
            seen.push(read_request(&mut sock));
            let response = format!(
                "HTTP/1.0 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(response.as_bytes()).unwrap();
        }
        seen
    });
    (port, handle)
}

fn config_for(port: u16) -> SystemConfig {
    let mut cfg = SystemConfig {
        http_timeout_ms: 2000,
        ..Default::default()
    };
    cfg.supervisor_url.clear();
    cfg.supervisor_url
        .push_str(&format!("http://127.0.0.1:{port}"))
        .unwrap();
    cfg
}

#[test]
fn remote_open_over_http() {
    let (port, server) = serve(vec![(200, "{}"), (200, r#"{"is_open":true}"#)]);
    let cfg = config_for(port);

    let flash = SharedFlash::new();
    let mut app = ValveSyncLoop::new(&cfg, ValveStore::new(flash.clone()));
    let mut hw = MockHardware::with_gas(100);
    let mut sup = HttpSupervisor::new(HttpClient::new(), &cfg).unwrap();
    let mut wdt = MockWatchdog::default();
    let mut sink = RecordingSink::default();

    app.start(&mut hw, &mut sink);
    let report = app.tick(&mut hw, &mut sup, &mut wdt, &mut sink);

    assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
    assert_eq!(report.valve, ValveState::Open);
    assert_eq!(hw.level(), Some(ValveState::Open));
    assert_eq!(flash.valve_byte(), Some(1));

    let seen = server.join().unwrap();
    assert_eq!(seen[0].0, "POST /data HTTP/1.1");
    let body: serde_json::Value = serde_json::from_str(&seen[0].1).unwrap();
    assert_eq!(body["gas_leak"], 100);
    assert_eq!(body["gas_level"], 12.5);
    assert_eq!(seen[1].0, "GET /get-valve-state HTTP/1.1");
}

#[test]
fn emergency_reports_but_never_asks_for_target() {
    let (port, server) = serve(vec![(200, "{}")]);
    let cfg = config_for(port);

    let flash = SharedFlash::new();
    ValveStore::new(flash.clone()).store(ValveState::Open).unwrap();
    let mut app = ValveSyncLoop::new(&cfg, ValveStore::new(flash.clone()));
    let mut hw = MockHardware::with_gas(650);
    let mut sup = HttpSupervisor::new(HttpClient::new(), &cfg).unwrap();
    let mut wdt = MockWatchdog::default();
    let mut sink = RecordingSink::default();

    app.start(&mut hw, &mut sink);
    let report = app.tick(&mut hw, &mut sup, &mut wdt, &mut sink);

    assert!(!report.fetched_target);
    assert_eq!(report.valve, ValveState::Closed);
    assert_eq!(flash.valve_byte(), Some(0));

    let seen = server.join().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "POST /data HTTP/1.1");
}

#[test]
fn server_error_on_target_keeps_state() {
    let (port, server) = serve(vec![(200, "{}"), (500, "boom")]);
    let cfg = config_for(port);

    let flash = SharedFlash::new();
    let mut app = ValveSyncLoop::new(&cfg, ValveStore::new(flash.clone()));
    let mut hw = MockHardware::with_gas(100);
    let mut sup = HttpSupervisor::new(HttpClient::new(), &cfg).unwrap();
    let mut wdt = MockWatchdog::default();
    let mut sink = RecordingSink::default();

    app.start(&mut hw, &mut sink);
    let report = app.tick(&mut hw, &mut sup, &mut wdt, &mut sink);

    assert_eq!(report.valve, ValveState::Closed);
    assert!(!report.changed);
    assert_eq!(
        report.errors.as_slice(),
        &[Error::Network(NetworkError::Status(500))]
    );
    server.join().unwrap();
}

#[test]
fn malformed_target_keeps_state() {
    let (port, server) = serve(vec![(200, "{}"), (200, "<html>oops</html>")]);
    let cfg = config_for(port);

    let mut app = ValveSyncLoop::new(&cfg, ValveStore::new(SharedFlash::new()));
    let mut hw = MockHardware::with_gas(100);
    let mut sup = HttpSupervisor::new(HttpClient::new(), &cfg).unwrap();
    let mut wdt = MockWatchdog::default();
    let mut sink = RecordingSink::default();

    app.start(&mut hw, &mut sink);
    let report = app.tick(&mut hw, &mut sup, &mut wdt, &mut sink);

    assert_eq!(report.valve, ValveState::Closed);
    assert_eq!(
        report.errors.as_slice(),
        &[Error::Network(NetworkError::MalformedPayload)]
    );
    server.join().unwrap();
}
