//! The replaceable callback messages are delivered to.

use std::sync::Arc;

use parking_lot::Mutex;

/// Callback invoked once per received message.
///
/// The slice borrows the connection's staging buffer and is only valid for
/// the duration of the call; copy out anything that must outlive it. The
/// callback runs on the receiver's worker thread and stalls every other
/// connection while it runs.
pub type Callback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Lock-guarded slot holding the current callback.
///
/// Clones share the same slot, so a replacement made through one handle is
/// seen by the next delivery through any other.
#[derive(Clone)]
pub(crate) struct DeliverySink {
    callback: Arc<Mutex<Callback>>,
}

impl DeliverySink {
    pub(crate) fn new(callback: Callback) -> Self {
        Self {
            callback: Arc::new(Mutex::new(callback)),
        }
    }

    /// Swaps in a new callback. Waits for an in-flight delivery to finish.
    pub(crate) fn replace(&self, callback: Callback) {
        *self.callback.lock() = callback;
    }

    /// Hands `message` to the current callback.
    pub(crate) fn deliver(&self, message: &[u8]) {
        let mut callback = self.callback.lock();
        (*callback)(message);
    }
}
