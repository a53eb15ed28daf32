//! Error types shared by the sender and the receiver.

use std::io;
use std::path::PathBuf;

/// Errors produced by msgpipe channels.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Another receiver is already serving this channel.
    #[error("channel `{name}` already has a live receiver")]
    ChannelInUse {
        /// Name of the contested channel.
        name: String,
    },

    /// The channel endpoint could not be created.
    #[error("failed to create channel at {}: {source}", path.display())]
    ChannelCreation {
        /// Filesystem location of the channel.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The sender holds no endpoint.
    #[error("not connected to a receiver")]
    NotConnected,

    /// The peer closed the connection.
    #[error("peer disconnected")]
    Disconnected,

    /// A message header had a bad magic number or version.
    #[error("invalid message header")]
    InvalidHeader,

    /// The payload does not fit in a single message.
    #[error("message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge {
        /// Size of the rejected payload.
        size: usize,
        /// Largest payload a message can carry.
        max: usize,
    },

    /// The rest of a message did not arrive in time.
    #[error("timed out waiting for message data")]
    TimedOut,

    /// Any other I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns true if the failure means the endpoint is stale and a fresh
    /// connection may succeed.
    pub fn is_reconnectable(&self) -> bool {
        match self {
            Error::NotConnected | Error::Disconnected => true,
            Error::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::NotConnected
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotFound
            ),
            _ => false,
        }
    }
}

/// Result alias for msgpipe operations.
pub type Result<T> = core::result::Result<T, Error>;
