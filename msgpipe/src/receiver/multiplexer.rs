//! The receiver's worker loop.
//!
//! Each pass waits for the first slot whose outstanding operation completed
//! and advances that one slot through the connect/read/deliver cycle:
//!
//! ```text
//!   Connecting ──accept──► Reading ──message──► Delivering
//!                             ▲                     │
//!                             └─────callback────────┘
//! ```
//!
//! A failed accept or read drops the slot; the next pass refills the
//! acceptance slot if needed.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use log::{debug, info, trace, warn};
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::Counters;
use super::pool::AcceptancePool;
use super::slot::Completion;
use crate::config::PipeConfig;
use crate::endpoint::PipeListener;
use crate::error::Error;
use crate::protocol::MessageHeader;
use crate::sink::DeliverySink;

pub(crate) struct Multiplexer {
    name: String,
    listener: PipeListener,
    pool: AcceptancePool,
    sink: DeliverySink,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
    poll_interval: Duration,
    read_timeout: Duration,
}

impl Multiplexer {
    pub(crate) fn new(
        name: String,
        listener: PipeListener,
        config: &PipeConfig,
        sink: DeliverySink,
        counters: Arc<Counters>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            name,
            listener,
            pool: AcceptancePool::new(config.effective_buffer_size()),
            sink,
            counters,
            shutdown,
            poll_interval: config.poll_interval,
            read_timeout: config.read_timeout,
        }
    }

    /// Runs until the shutdown token fires, then tears down every slot.
    pub(crate) async fn run(mut self) {
        debug!(
            "Channel `{}` multiplexer started on {:?}",
            self.name,
            self.listener.path()
        );

        loop {
            self.pool.ensure_acceptance();

            let (index, completion) = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                ready = self.pool.next_ready(&self.listener) => ready,
                _ = time::sleep(self.poll_interval) => continue,
            };

            self.dispatch(index, completion).await;
        }

        self.pool.clear();
        info!("Channel `{}` receiver stopped", self.name);
    }

    async fn dispatch(&mut self, index: usize, completion: Completion) {
        match completion {
            Completion::Accepted(Ok(stream)) => {
                // Reopen acceptance before serving this sender.
                self.pool.open();
                self.pool.slot_mut(index).attach(stream);
                self.counters.connections_accepted.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Channel `{}` accepted a sender ({} slots)",
                    self.name,
                    self.pool.len()
                );
            }
            Completion::Accepted(Err(err)) => {
                warn!("Channel `{}` accept failed: {}", self.name, err);
                self.drop_slot(index);
                tokio::select! {
                    _ = self.shutdown.cancelled() => {}
                    _ = time::sleep(self.poll_interval) => {}
                }
            }
            Completion::Header(Ok(header)) => self.receive(index, header).await,
            Completion::Header(Err(err)) => self.fail(index, err),
        }
    }

    /// Reads the body behind `header` and hands it to the sink. Only the
    /// body read is bounded by `read_timeout`.
    async fn receive(&mut self, index: usize, header: MessageHeader) {
        let slot = self.pool.slot_mut(index);

        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return,
            outcome = time::timeout(self.read_timeout, slot.read_body(header)) => {
                outcome.unwrap_or(Err(Error::TimedOut))
            }
        };

        match outcome {
            Ok(len) => {
                trace!("Channel `{}` delivering {} bytes", self.name, len);
                self.counters.messages_delivered.fetch_add(1, Ordering::Relaxed);
                self.counters.bytes_delivered.fetch_add(len as u64, Ordering::Relaxed);
                self.sink.deliver(slot.begin_delivery());
                slot.finish_delivery();
            }
            Err(err) => self.fail(index, err),
        }
    }

    fn fail(&mut self, index: usize, err: Error) {
        match err {
            Error::Disconnected => debug!("Channel `{}` sender disconnected", self.name),
            err => warn!("Channel `{}` dropping connection: {}", self.name, err),
        }
        self.drop_slot(index);
    }

    fn drop_slot(&mut self, index: usize) {
        self.pool.remove(index);
        self.counters.slots_dropped.fetch_add(1, Ordering::Relaxed);
    }
}
