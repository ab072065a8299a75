//! Link configuration.

use crate::constants::{BAUD_RATE, IAC_MAX_ATTEMPTS, TIMEOUT_MS};
use crate::types::ProtocolVersion;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for a connection to the ECU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial baud rate
    pub baud_rate: u32,
    /// Inter-byte read timeout in milliseconds
    pub timeout_ms: u64,
    /// ECU generation, selects the frame layout
    pub protocol: ProtocolVersion,
    /// Ceiling on IAC step commands per move
    pub iac_max_attempts: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            baud_rate: BAUD_RATE,
            timeout_ms: TIMEOUT_MS,
            protocol: ProtocolVersion::default(),
            iac_max_attempts: IAC_MAX_ATTEMPTS,
        }
    }
}

impl LinkConfig {
    pub fn with_protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_iac_max_attempts(mut self, attempts: u32) -> Self {
        self.iac_max_attempts = attempts;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
