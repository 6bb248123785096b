//! Dispatcher configuration.

use crate::error::DispatchError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_WORKER_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_ADMISSION_QUEUE_CAPACITY: usize = 1024 * 60;
pub const DEFAULT_MAXIMUM_CONCURRENCY: usize = 32;
pub const DEFAULT_PACKET_TIMEOUT_MS: u64 = 1_800_000;
pub const DEFAULT_OUTBOUND_FLUSH_INTERVAL: u64 = 10;
pub const DEFAULT_MAX_WORKERS_PER_LISTENER: usize = 1024;

/// Tuning knobs of a [`crate::PacketDispatcher`].
///
/// Every field has a default, so a JSON document only needs the fields it changes:
///
/// ```
/// use packet_dispatch::DispatchConfig;
///
/// let config = DispatchConfig::from_json_str(r#"{ "maximum_concurrency": 4 }"#).unwrap();
/// assert_eq!(config.maximum_concurrency, 4);
/// assert_eq!(config.worker_queue_capacity, 1024);
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Bounded queue size of each listener worker pool.
    pub worker_queue_capacity: usize,
    /// Pending packets per direction waiting for an admission slot.
    pub admission_queue_capacity: usize,
    /// Packets per direction allowed to occupy listener workers at once.
    pub maximum_concurrency: usize,
    /// Time after creation at which an unresolved packet expires.
    pub packet_timeout_ms: u64,
    /// Offset added to the sending index to form the initial delivery position.
    pub sending_delta: u64,
    /// Outbound buffers are flushed every this many ticks; inbound every tick.
    pub outbound_flush_interval: u64,
    /// Window `set_workers` has to reach its target.
    pub resize_timeout_ms: u64,
    /// Period at which a blocked `stop` checks for a racing resize.
    pub stop_poll_ms: u64,
    pub max_workers_per_listener: usize,
    /// Warn about a registered listener that has no workers after this long.
    pub unstarted_warning_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_queue_capacity: DEFAULT_WORKER_QUEUE_CAPACITY,
            admission_queue_capacity: DEFAULT_ADMISSION_QUEUE_CAPACITY,
            maximum_concurrency: DEFAULT_MAXIMUM_CONCURRENCY,
            packet_timeout_ms: DEFAULT_PACKET_TIMEOUT_MS,
            sending_delta: 0,
            outbound_flush_interval: DEFAULT_OUTBOUND_FLUSH_INTERVAL,
            resize_timeout_ms: 1_000,
            stop_poll_ms: 50,
            max_workers_per_listener: DEFAULT_MAX_WORKERS_PER_LISTENER,
            unstarted_warning_ms: 2_000,
        }
    }
}

impl DispatchConfig {
    pub fn from_json_str(json: &str) -> Result<Self, DispatchError> {
        let config: Self = serde_json::from_str(json).map_err(|error| {
            DispatchError::InvalidConfig(format!("Unable to parse JSON: {error}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DispatchError> {
        let path = path.as_ref();
        debug!("dispatch config file: {path:?}");

        let data = fs::read_to_string(path).map_err(|error| {
            DispatchError::InvalidConfig(format!("Unable to read {path:?}: {error}"))
        })?;
        Self::from_json_str(&data)
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        let checks = [
            ("worker_queue_capacity", self.worker_queue_capacity as u64),
            ("admission_queue_capacity", self.admission_queue_capacity as u64),
            ("maximum_concurrency", self.maximum_concurrency as u64),
            ("outbound_flush_interval", self.outbound_flush_interval),
            ("resize_timeout_ms", self.resize_timeout_ms),
            ("stop_poll_ms", self.stop_poll_ms),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(DispatchError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }

    pub fn packet_timeout(&self) -> Duration {
        Duration::from_millis(self.packet_timeout_ms)
    }

    pub fn resize_timeout(&self) -> Duration {
        Duration::from_millis(self.resize_timeout_ms)
    }

    pub fn stop_poll(&self) -> Duration {
        Duration::from_millis(self.stop_poll_ms)
    }

    pub fn unstarted_warning(&self) -> Duration {
        Duration::from_millis(self.unstarted_warning_ms)
    }
}
