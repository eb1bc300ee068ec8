//! Tunable transfer parameters.
//!
//! Defaults match the target this tool was written for: 256-byte payloads,
//! a 10 second budget per write and per read, and an application region
//! spanning flash sectors 2 through 7.

use std::time::Duration;

use thiserror::Error;

use crate::packet::MAX_PAYLOAD;

/// First byte of flash sector 2, where the application region begins.
pub const APP_REGION_START: u32 = 0x0800_8000;
/// Last byte of flash sector 7.
pub const APP_REGION_END: u32 = 0x0807_FFFF;
/// Largest image the device can flash.
pub const APP_FW_MAX_SIZE: usize = (APP_REGION_END - APP_REGION_START) as usize;

/// Budget for each write and each read of a handshake.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Parameters for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Time allowed to flush one frame, and separately to read its response.
    pub timeout: Duration,
    /// Largest Data payload to send, `1..=MAX_PAYLOAD`.
    pub max_payload: usize,
    /// Images larger than this are rejected before any I/O.
    pub max_image_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_payload: MAX_PAYLOAD,
            max_image_size: APP_FW_MAX_SIZE,
        }
    }
}

impl TransferConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_payload == 0 || self.max_payload > MAX_PAYLOAD {
            return Err(ConfigError::MaxPayload(self.max_payload));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max payload {0} is outside 1..={MAX_PAYLOAD}")]
    MaxPayload(usize),
    #[error("timeout must be nonzero")]
    ZeroTimeout,
}
