//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter          | Implements         | Connects to                  |
//! |------------------|--------------------|------------------------------|
//! | `hardware`       | SensorPort         | ESP32 ADC, HX711             |
//! |                  | ActuatorPort       | Valve relay GPIO             |
//! | `log_sink`       | EventSink          | Serial log output            |
//! | `nvs`            | ConfigPort         | NVS / in-memory store        |
//! |                  | StoragePort        |                              |
//! | `supervisor`     | SupervisorPort     | Remote supervisor over HTTP  |
//! | `http_transport` | HttpTransport      | esp_http_client / TcpStream  |
//! | `wifi`           | (boot-time link)   | ESP-IDF WiFi STA             |

pub mod hardware;
pub mod http_transport;
pub mod log_sink;
pub mod nvs;
pub mod supervisor;
pub mod wifi;
