//! Growable staging buffer for incoming messages.
//!
//! Each connection owns one [`MessageBuffer`]. A message is first read into
//! the buffer's current capacity; when the header says more bytes remain, the
//! buffer grows step by step as they arrive and the remainder is appended
//! behind the bytes already read.

/// A growable byte buffer holding at most one message.
#[derive(Debug)]
pub struct MessageBuffer {
    /// The underlying storage; its length is the capacity.
    data: Vec<u8>,

    /// Number of bytes filled.
    len: usize,
}

impl MessageBuffer {
    /// Creates an empty buffer with `capacity` bytes of storage.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            len: 0,
        }
    }

    /// Returns the number of filled bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no bytes are filled.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the storage size.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Returns the filled bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Returns the unfilled tail of the storage.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.len..]
    }

    /// Marks `n` more bytes of the spare region as filled.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the spare capacity.
    pub fn advance(&mut self, n: usize) {
        assert!(
            n <= self.capacity() - self.len,
            "advance past end of buffer: {} + {} > {}",
            self.len,
            n,
            self.capacity()
        );
        self.len += n;
    }

    /// Grows the storage to hold at least `capacity` bytes.
    ///
    /// Filled bytes are kept in place. Never shrinks.
    pub fn ensure_capacity(&mut self, capacity: usize) {
        if capacity > self.data.len() {
            self.data.resize(capacity, 0);
        }
    }

    /// Forgets the filled bytes, keeping the storage.
    pub fn reset(&mut self) {
        self.len = 0;
    }
}

impl AsRef<[u8]> for MessageBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}
