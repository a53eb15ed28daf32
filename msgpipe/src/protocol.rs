//! Message framing on the channel byte stream.
//!
//! Every message is preceded by a fixed header carrying its length, which is
//! how the receiver finds message boundaries and learns how much data is
//! still pending after a short read.
//!
//! # Header Format
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          Magic ("MP")         |    Version    |   Reserved    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  Payload Length (little endian)               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          Payload...                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use crate::error::{Error, Result};

/// Header size in bytes.
pub const HEADER_SIZE: usize = 8;

/// Magic bytes opening every header.
pub const MAGIC: [u8; 2] = *b"MP";

/// Framing version.
pub const VERSION: u8 = 1;

/// Largest payload a single message can carry.
pub const MAX_MESSAGE_SIZE: usize = u32::MAX as usize;

/// Header preceding each message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Payload length in bytes.
    pub length: u32,
}

impl MessageHeader {
    /// Creates a header for a payload of `len` bytes.
    pub fn new(len: usize) -> Result<Self> {
        let length = u32::try_from(len).map_err(|_| Error::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        })?;
        Ok(Self { length })
    }

    /// Payload length as a `usize`.
    pub fn payload_len(&self) -> usize {
        self.length as usize
    }

    /// Serializes the header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&MAGIC);
        buf[2] = VERSION;
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    /// Parses a header, rejecting foreign or incompatible data.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        if buf[0..2] != MAGIC || buf[2] != VERSION {
            return Err(Error::InvalidHeader);
        }
        let length = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Ok(Self { length })
    }
}

/// Writes header and payload into `out`, replacing its contents.
pub fn encode_message(out: &mut Vec<u8>, payload: &[u8]) -> Result<()> {
    let header = MessageHeader::new(payload.len())?;
    out.clear();
    out.reserve(HEADER_SIZE + payload.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(payload);
    Ok(())
}
