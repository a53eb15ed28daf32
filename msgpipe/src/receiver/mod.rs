//! Receiving side of a channel.
//!
//! A [`Receiver`] binds a channel name and runs a background worker that
//! accepts senders, reads their messages and hands each one to a callback.
//! The worker owns every connection; the only thing the owning thread can
//! touch afterwards is the callback, through [`Receiver::set_callback`].

mod multiplexer;
mod pool;
mod slot;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use log::{debug, error};
use tokio_util::sync::CancellationToken;

use crate::config::PipeConfig;
use crate::endpoint::PipeListener;
use crate::error::Result;
use crate::sink::DeliverySink;
use multiplexer::Multiplexer;

/// Counters updated by the worker and read by [`Receiver::stats`].
#[derive(Debug, Default)]
pub(crate) struct Counters {
    connections_accepted: AtomicU64,
    messages_delivered: AtomicU64,
    bytes_delivered: AtomicU64,
    slots_dropped: AtomicU64,
}

/// Snapshot of a receiver's activity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Senders attached so far.
    pub connections_accepted: u64,

    /// Messages handed to the callback.
    pub messages_delivered: u64,

    /// Payload bytes handed to the callback.
    pub bytes_delivered: u64,

    /// Connections torn down after a disconnect or failure.
    pub slots_dropped: u64,
}

/// The receiving end of a named channel.
///
/// Dropping the receiver stops its worker, closes every connection and
/// removes the channel socket before returning.
pub struct Receiver {
    name: String,
    path: PathBuf,
    sink: DeliverySink,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl Receiver {
    /// Starts receiving on `name` with the default configuration.
    ///
    /// `buffer_size` is a hint for the per-connection staging buffer. It is
    /// raised to [`MIN_BUFFER_SIZE`](crate::MIN_BUFFER_SIZE) if smaller and
    /// does not limit message size.
    pub fn new<F>(name: &str, buffer_size: usize, callback: F) -> Result<Self>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        Self::with_config(
            name,
            PipeConfig::default().with_buffer_size(buffer_size),
            callback,
        )
    }

    /// Starts receiving on `name`.
    ///
    /// Fails if the channel cannot be created, including when another
    /// receiver is already serving it. No worker is started in that case.
    pub fn with_config<F>(name: &str, config: PipeConfig, callback: F) -> Result<Self>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let path = config.channel_path(name);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let listener = {
            let _guard = runtime.enter();
            PipeListener::bind(name, &path)?
        };

        let sink = DeliverySink::new(Box::new(callback));
        let counters = Arc::new(Counters::default());
        let shutdown = CancellationToken::new();
        let multiplexer = Multiplexer::new(
            name.to_owned(),
            listener,
            &config,
            sink.clone(),
            Arc::clone(&counters),
            shutdown.clone(),
        );

        let worker = thread::Builder::new()
            .name(format!("msgpipe-{name}"))
            .spawn(move || runtime.block_on(multiplexer.run()))?;
        debug!(
            "Channel `{}` receiver started with {} byte buffers",
            name,
            config.effective_buffer_size()
        );

        Ok(Self {
            name: name.to_owned(),
            path,
            sink,
            counters,
            shutdown,
            worker: Some(worker),
        })
    }

    /// Replaces the callback. The next delivered message goes to the new one.
    ///
    /// Blocks while a delivery is in progress.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        self.sink.replace(Box::new(callback));
    }

    /// Channel name this receiver serves.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location of the channel socket.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a snapshot of the worker's counters.
    pub fn stats(&self) -> ReceiverStats {
        ReceiverStats {
            connections_accepted: self.counters.connections_accepted.load(Ordering::Relaxed),
            messages_delivered: self.counters.messages_delivered.load(Ordering::Relaxed),
            bytes_delivered: self.counters.bytes_delivered.load(Ordering::Relaxed),
            slots_dropped: self.counters.slots_dropped.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("running", &self.worker.is_some())
            .finish()
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.shutdown.cancel();

        let Some(worker) = self.worker.take() else {
            return;
        };
        // Dropped from inside its own callback; the worker exits on its own.
        if worker.thread().id() == thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            error!("Channel `{}` worker panicked", self.name);
        }
    }
}
