//! The ordered set of connection slots owned by a receiver.

use std::task::{Context, Poll};

use futures::future::poll_fn;
use log::{debug, trace};

use super::slot::{Completion, ConnectionSlot, SlotState};
use crate::endpoint::PipeListener;

/// Keeps one slot open for new senders next to the slots serving attached
/// ones.
#[derive(Debug)]
pub(crate) struct AcceptancePool {
    slots: Vec<ConnectionSlot>,
    buffer_size: usize,
    next_id: u64,
}

impl AcceptancePool {
    pub(crate) fn new(buffer_size: usize) -> Self {
        Self {
            slots: Vec::new(),
            buffer_size,
            next_id: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots waiting for a sender.
    pub(crate) fn connecting(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state() == SlotState::Connecting)
            .count()
    }

    /// Adds a slot awaiting a connection and returns its index.
    pub(crate) fn open(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.slots.push(ConnectionSlot::connecting(id, self.buffer_size));
        trace!("Opened connecting slot {}", id);
        self.slots.len() - 1
    }

    /// Refills the acceptance slot if the last one was lost.
    pub(crate) fn ensure_acceptance(&mut self) {
        if self.connecting() == 0 {
            self.open();
        }
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut ConnectionSlot {
        &mut self.slots[index]
    }

    /// Closes the slot at `index` and drops it from the pool.
    ///
    /// Slots behind it shift down by one.
    pub(crate) fn remove(&mut self, index: usize) {
        let mut slot = self.slots.remove(index);
        slot.close();
        debug!("Removed slot {} ({} left)", slot.id(), self.slots.len());
    }

    /// Tears down every slot.
    pub(crate) fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.close();
        }
        self.slots.clear();
    }

    /// Waits for the first slot, in pool order, whose operation completed.
    pub(crate) async fn next_ready(&mut self, listener: &PipeListener) -> (usize, Completion) {
        poll_fn(|cx| self.poll_next_ready(listener, cx)).await
    }

    fn poll_next_ready(
        &mut self,
        listener: &PipeListener,
        cx: &mut Context<'_>,
    ) -> Poll<(usize, Completion)> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Poll::Ready(completion) = slot.poll_completion(listener, cx) {
                return Poll::Ready((index, completion));
            }
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tokio::net::UnixStream;

    #[test]
    fn test_open_and_refill() {
        let mut pool = AcceptancePool::new(1024);
        assert!(pool.is_empty());

        pool.ensure_acceptance();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.connecting(), 1);

        pool.ensure_acceptance();
        assert_eq!(pool.len(), 1);

        pool.remove(0);
        assert!(pool.is_empty());
        pool.ensure_acceptance();
        assert_eq!(pool.connecting(), 1);
    }

    #[tokio::test]
    async fn test_acceptance_depth_maintained() {
        let dir = tempfile::tempdir().unwrap();
        let listener = PipeListener::bind("depth", &dir.path().join("depth.sock")).unwrap();
        let mut pool = AcceptancePool::new(1024);
        pool.ensure_acceptance();

        let _first = UnixStream::connect(listener.path()).await.unwrap();
        let _second = UnixStream::connect(listener.path()).await.unwrap();

        for attached in 1..=2 {
            let (index, completion) = pool.next_ready(&listener).await;
            let stream = match completion {
                Completion::Accepted(result) => result.unwrap(),
                other => panic!("unexpected completion: {:?}", other),
            };
            pool.open();
            pool.slot_mut(index).attach(stream);

            assert_eq!(pool.len(), attached + 1);
            assert_eq!(pool.connecting(), 1);
        }

        pool.clear();
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_first_ready_slot_wins() {
        let dir = tempfile::tempdir().unwrap();
        let listener = PipeListener::bind("order", &dir.path().join("order.sock")).unwrap();
        let mut pool = AcceptancePool::new(1024);
        pool.ensure_acceptance();

        let first = UnixStream::connect(listener.path()).await.unwrap();
        let (index, completion) = pool.next_ready(&listener).await;
        let Completion::Accepted(Ok(stream)) = completion else {
            panic!("expected an accepted stream");
        };
        pool.open();
        pool.slot_mut(index).attach(stream);

        // EOF completes the attached slot; a second sender makes the
        // connecting slot ready too. Slot 0 comes first.
        drop(first);
        let _second = UnixStream::connect(listener.path()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let (index, completion) = pool.next_ready(&listener).await;
        assert_eq!(index, 0);
        assert!(matches!(completion, Completion::Header(Err(Error::Disconnected))));
    }
}
