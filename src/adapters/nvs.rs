//! NVS (Non-Volatile Storage) adapter.
//!
//! One blob store behind two ports: [`StoragePort`] for the valve byte and
//! [`ConfigPort`] for the postcard-encoded [`SystemConfig`].  Both go
//! through the same `get`/`put` pair, so config and valve state share
//! the commit semantics below.
//!
//! - ESP-IDF: `nvs_set_blob` followed by `nvs_commit`; `put` returns only
//!   once the commit has completed.
//! - Host: an in-memory map standing in for flash.

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::{SystemConfig, validate_config};
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::cell::RefCell;
#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "gasvalve";
const CONFIG_KEY: &str = "syscfg";

/// Largest config blob accepted on load.
const MAX_CONFIG_BLOB: usize = 256;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    cells: RefCell<HashMap<(String, String), Vec<u8>>>,
}

impl NvsAdapter {
    /// Bring up NVS flash.
    ///
    /// A partition with no free pages or written by a newer IDF is erased
    /// and initialised again.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any NVS access.
            let mut ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NvsAdapter: partition unusable ({}), erasing", ret);
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
                ret = unsafe { nvs_flash_init() };
            }
            if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: flash ready");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: in-memory backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            cells: RefCell::new(HashMap::new()),
        })
    }
}

// ── ESP-IDF backend ───────────────────────────────────────────

/// Open namespace, closed on drop.
#[cfg(target_os = "espidf")]
struct Handle(nvs_handle_t);

#[cfg(target_os = "espidf")]
impl Handle {
    fn open(namespace: &str, writable: bool) -> Result<Self, esp_err_t> {
        let name = c_name(namespace);
        let mode = if writable {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };
        let mut raw: nvs_handle_t = 0;
        // SAFETY: `name` is NUL-terminated and outlives the call.
        let ret = unsafe { nvs_open(name.as_ptr().cast(), mode, &mut raw) };
        if ret == ESP_OK { Ok(Self(raw)) } else { Err(ret) }
    }
}

#[cfg(target_os = "espidf")]
impl Drop for Handle {
    fn drop(&mut self) {
        // SAFETY: the handle was opened by `Handle::open` and is closed once.
        unsafe { nvs_close(self.0) }
    }
}

/// NVS names are at most 15 bytes plus the terminator.
#[cfg(target_os = "espidf")]
fn c_name(name: &str) -> [u8; 16] {
    let mut buf = [0u8; 16];
    let len = name.len().min(15);
    buf[..len].copy_from_slice(&name.as_bytes()[..len]);
    buf
}

#[cfg(target_os = "espidf")]
impl NvsAdapter {
    fn get(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        // A namespace that was never written cannot be opened read-only.
        let handle = Handle::open(namespace, false).map_err(|e| match e {
            ESP_ERR_NVS_NOT_FOUND => StorageError::NotFound,
            _ => StorageError::IoError,
        })?;
        let key = c_name(key);
        let mut len = buf.len();
        // SAFETY: `buf` is valid for `len` bytes; NVS writes at most that.
        let ret = unsafe {
            nvs_get_blob(handle.0, key.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut len)
        };
        match ret {
            ESP_OK => Ok(len),
            ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
            _ => Err(StorageError::IoError),
        }
    }

    fn put(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let to_storage = |e: esp_err_t| match e {
            ESP_ERR_NVS_NOT_ENOUGH_SPACE => StorageError::Full,
            _ => {
                warn!("NvsAdapter: {}::{} write failed ({})", namespace, key, e);
                StorageError::IoError
            }
        };
        let handle = Handle::open(namespace, true).map_err(to_storage)?;
        let key_buf = c_name(key);
        // SAFETY: `data` is valid for `data.len()` bytes for the call.
        let ret = unsafe {
            nvs_set_blob(handle.0, key_buf.as_ptr().cast(), data.as_ptr().cast(), data.len())
        };
        if ret != ESP_OK {
            return Err(to_storage(ret));
        }
        match unsafe { nvs_commit(handle.0) } {
            ESP_OK => Ok(()),
            e => Err(to_storage(e)),
        }
    }
}

// ── Host backend ──────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl NvsAdapter {
    fn get(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let cells = self.cells.borrow();
        let data = cells
            .get(&(namespace.to_owned(), key.to_owned()))
            .ok_or(StorageError::NotFound)?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn put(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.cells
            .borrow_mut()
            .insert((namespace.to_owned(), key.to_owned()), data.to_vec());
        Ok(())
    }
}

// ── Ports ─────────────────────────────────────────────────────

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let mut buf = [0u8; MAX_CONFIG_BLOB];
        match self.get(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => {
                let cfg = postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsAdapter: config loaded ({} bytes)", len);
                Ok(cfg)
            }
            Err(StorageError::NotFound) => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
            Err(e) => {
                warn!("NvsAdapter: config read failed ({}), using defaults", e);
                Ok(SystemConfig::default())
            }
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        self.put(CONFIG_NAMESPACE, CONFIG_KEY, &bytes)
            .map_err(|e| match e {
                StorageError::Full => ConfigError::StorageFull,
                _ => ConfigError::IoError,
            })?;
        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.get(namespace, key, buf)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.put(namespace, key, data)
    }
}
