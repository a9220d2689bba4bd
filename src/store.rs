//! Persistent valve-state store.
//!
//! Mirrors the in-memory [`ValveState`] as a single byte in non-volatile
//! storage so the valve comes back in its last commanded position after a
//! power cycle.  Layout: one byte, `0` = closed, anything else = open.
//!
//! A write is only reported successful once the byte has been committed
//! and read back unchanged.

use log::{info, warn};

use crate::app::ports::{StorageError, StoragePort};
use crate::valve::ValveState;

/// NVS namespace holding the valve byte.
pub const VALVE_NAMESPACE: &str = "gasvalve";
/// NVS key of the valve byte.
pub const VALVE_KEY: &str = "valve";

const BYTE_CLOSED: u8 = 0;
const BYTE_OPEN: u8 = 1;

fn encode(state: ValveState) -> u8 {
    match state {
        ValveState::Open => BYTE_OPEN,
        ValveState::Closed => BYTE_CLOSED,
    }
}

fn decode(byte: u8) -> ValveState {
    if byte == BYTE_CLOSED {
        ValveState::Closed
    } else {
        ValveState::Open
    }
}

/// Single-byte durable store on top of any [`StoragePort`].
pub struct ValveStore<S: StoragePort> {
    storage: S,
}

impl<S: StoragePort> ValveStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Last committed state, or `Closed` when nothing was ever written or
    /// the medium cannot be read.
    pub fn load(&self) -> ValveState {
        self.try_load().unwrap_or_else(|e| {
            warn!("ValveStore: read failed ({}), defaulting to {}", e, ValveState::Closed);
            ValveState::Closed
        })
    }

    /// Like [`load`](Self::load), but an unreadable medium is an error.
    ///
    /// A never-written store is not an error: it yields `Closed`.
    pub fn try_load(&self) -> Result<ValveState, StorageError> {
        match self.read_byte() {
            Ok(byte) => {
                let state = decode(byte);
                info!("ValveStore: loaded {} (byte=0x{:02x})", state, byte);
                Ok(state)
            }
            Err(StorageError::NotFound) => {
                info!("ValveStore: never written, defaulting to {}", ValveState::Closed);
                Ok(ValveState::Closed)
            }
            Err(e) => Err(e),
        }
    }

    /// Commit `state` and confirm it by reading it back.
    pub fn store(&mut self, state: ValveState) -> Result<(), StorageError> {
        let byte = encode(state);
        self.storage.write(VALVE_NAMESPACE, VALVE_KEY, &[byte])?;

        match self.read_byte() {
            Ok(read_back) if read_back == byte => Ok(()),
            Ok(read_back) => {
                warn!(
                    "ValveStore: read-back mismatch (wrote 0x{:02x}, read 0x{:02x})",
                    byte, read_back
                );
                Err(StorageError::VerifyFailed)
            }
            Err(_) => Err(StorageError::VerifyFailed),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Give back the storage medium (e.g. to rebuild the store after a
    /// simulated reset).
    pub fn into_inner(self) -> S {
        self.storage
    }

    fn read_byte(&self) -> Result<u8, StorageError> {
        let mut buf = [0u8; 1];
        let len = self.storage.read(VALVE_NAMESPACE, VALVE_KEY, &mut buf)?;
        if len == 0 {
            // An empty blob is not a committed value.
            return Err(StorageError::NotFound);
        }
        Ok(buf[0])
    }
}
