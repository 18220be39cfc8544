//! Bus configuration.
//!
//! [`KbusConfig`] holds the limits applied by every device of a
//! [`Kbus`](crate::ksock::Kbus).  Sensible defaults are provided via the
//! [`Default`] implementation, and a builder-style API allows callers to
//! customise individual fields fluently.  The struct deserializes from the
//! `[kbus]` table of a TOML file; missing keys keep their defaults.

use serde::{Deserialize, Serialize};

/// Limits applied by every device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KbusConfig {
    /// Number of devices that can be opened (indices `0..num_devices`).
    ///
    /// Default: **3**.
    pub num_devices: usize,

    /// Maximum length of a message name or binding pattern, in bytes.
    ///
    /// Default: **1000**.
    pub max_name_len: usize,

    /// Maximum size of a message payload, in bytes.
    ///
    /// Default: **4096**.
    pub max_data_len: usize,

    /// Maximum number of copies waiting in one endpoint's queue.
    ///
    /// Default: **100**.
    pub max_queue_len: usize,
}

impl Default for KbusConfig {
    fn default() -> Self {
        Self {
            num_devices: 3,
            max_name_len: 1000,
            max_data_len: 4096,
            max_queue_len: 100,
        }
    }
}

impl KbusConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_num_devices(mut self, count: usize) -> Self {
        self.num_devices = count;
        self
    }

    pub fn with_max_name_len(mut self, bytes: usize) -> Self {
        self.max_name_len = bytes;
        self
    }

    pub fn with_max_data_len(mut self, bytes: usize) -> Self {
        self.max_data_len = bytes;
        self
    }

    pub fn with_max_queue_len(mut self, messages: usize) -> Self {
        self.max_queue_len = messages;
        self
    }
}
