//! Channel configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{BUFFER_ALIGNMENT, DEFAULT_POLL_INTERVAL_MS, DEFAULT_READ_TIMEOUT_MS, MIN_BUFFER_SIZE};

/// Settings shared by senders and receivers.
///
/// Both sides must agree on `namespace` to find each other.
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// Staging buffer hint. Only a floor; messages may exceed it.
    pub buffer_size: usize,
    /// Upper bound of one multiplexer wait.
    pub poll_interval: Duration,
    /// Bound on reading a message body once its header arrived.
    pub read_timeout: Duration,
    /// Directory holding the channel sockets.
    pub namespace: PathBuf,
}

impl PipeConfig {
    /// Creates a configuration with the default settings.
    pub fn new() -> Self {
        Self {
            buffer_size: MIN_BUFFER_SIZE,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            namespace: std::env::temp_dir().join("msgpipe"),
        }
    }

    /// Sets the staging buffer hint.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Sets the multiplexer wait bound.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the bound on reading a message body.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the directory holding channel sockets.
    pub fn with_namespace(mut self, namespace: impl Into<PathBuf>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Staging buffer size actually allocated per connection.
    ///
    /// Hints too close to `usize::MAX` to round up are rounded down instead.
    pub fn effective_buffer_size(&self) -> usize {
        let size = self.buffer_size.max(MIN_BUFFER_SIZE);
        size.checked_next_multiple_of(BUFFER_ALIGNMENT)
            .unwrap_or(size - size % BUFFER_ALIGNMENT)
    }

    /// Location of the socket backing `name`.
    pub fn channel_path(&self, name: &str) -> PathBuf {
        channel_path(&self.namespace, name)
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn channel_path(namespace: &Path, name: &str) -> PathBuf {
    namespace.join(format!("{name}.sock"))
}
