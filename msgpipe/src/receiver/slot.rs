//! A single connection slot and its read state.

use std::io;
use std::task::{Context, Poll};

use log::trace;

use crate::buffer::MessageBuffer;
use crate::endpoint::{PipeListener, PipeStream};
use crate::error::{Error, Result};
use crate::protocol::MessageHeader;

/// Where a slot is in its connect/read/deliver cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotState {
    /// Waiting for a sender to attach.
    Connecting,

    /// Attached; waiting for the next message.
    Reading,

    /// Handing a complete message to the callback.
    Delivering,
}

/// Outcome of a slot's outstanding operation.
#[derive(Debug)]
pub(crate) enum Completion {
    /// The pending accept finished.
    Accepted(io::Result<PipeStream>),

    /// The attached sender's next message header arrived, or the stream
    /// ended or failed before one did.
    Header(Result<MessageHeader>),
}

/// One endpoint plus its staging buffer and read state.
#[derive(Debug)]
pub(crate) struct ConnectionSlot {
    id: u64,
    endpoint: Option<PipeStream>,
    buffer: MessageBuffer,
    state: SlotState,
    pending: bool,
}

impl ConnectionSlot {
    /// Creates a slot awaiting a connection.
    pub(crate) fn connecting(id: u64, buffer_size: usize) -> Self {
        Self {
            id,
            endpoint: None,
            buffer: MessageBuffer::new(buffer_size),
            state: SlotState::Connecting,
            pending: true,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn state(&self) -> SlotState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.pending
    }

    /// Polls this slot's completion signal.
    ///
    /// A connecting slot waits on the listener; a reading slot on the next
    /// header from its own stream. A delivering slot has nothing outstanding.
    pub(crate) fn poll_completion(
        &mut self,
        listener: &PipeListener,
        cx: &mut Context<'_>,
    ) -> Poll<Completion> {
        if !self.pending {
            return Poll::Pending;
        }

        let poll = match (self.state, self.endpoint.as_mut()) {
            (SlotState::Connecting, _) => listener.poll_accept(cx).map(Completion::Accepted),
            (SlotState::Reading, Some(endpoint)) => {
                endpoint.poll_header(cx).map(Completion::Header)
            }
            (SlotState::Reading, None) => {
                Poll::Ready(Completion::Header(Err(Error::NotConnected)))
            }
            (SlotState::Delivering, _) => Poll::Pending,
        };

        if poll.is_ready() {
            self.pending = false;
        }
        poll
    }

    /// Takes ownership of a freshly accepted sender and starts reading.
    pub(crate) fn attach(&mut self, endpoint: PipeStream) {
        trace!("Slot {} attached", self.id);
        self.endpoint = Some(endpoint);
        self.state = SlotState::Reading;
        self.pending = true;
    }

    /// Reads the payload announced by `header` into the slot's buffer.
    pub(crate) async fn read_body(&mut self, header: MessageHeader) -> Result<usize> {
        let endpoint = self.endpoint.as_mut().ok_or(Error::NotConnected)?;
        endpoint.read_body(header, &mut self.buffer).await
    }

    /// Enters `Delivering` and returns the message to hand out.
    pub(crate) fn begin_delivery(&mut self) -> &[u8] {
        self.state = SlotState::Delivering;
        self.buffer.as_slice()
    }

    /// Goes back to reading the next message from the same sender.
    pub(crate) fn finish_delivery(&mut self) {
        self.buffer.reset();
        self.state = SlotState::Reading;
        self.pending = true;
    }

    /// Disconnects and closes the endpoint.
    pub(crate) fn close(&mut self) {
        if self.endpoint.take().is_some() {
            trace!("Slot {} closed", self.id);
        }
        self.pending = false;
    }
}
