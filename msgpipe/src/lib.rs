//! # msgpipe - Message-Oriented Local Channels
//!
//! msgpipe provides one-way, message-oriented inter-process communication
//! over a named local channel:
//!
//! - **Named channels**: a channel name maps to a socket under a namespace directory
//! - **Whole-message delivery**: every `send` reaches the receiver's callback exactly once, intact
//! - **Arbitrary message sizes**: the staging buffer grows to fit oversized messages
//! - **Many senders**: the receiver always keeps an acceptance slot open
//! - **Opportunistic reconnect**: senders reconnect once when the receiver went away
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐          ┌──────────────────────────────────────┐
//! │          Sender          │          │               Receiver               │
//! │  ┌────────────────────┐  │          │  ┌────────────────────────────────┐  │
//! │  │ connect / reconnect│  │  named   │  │    Completion Multiplexer      │  │
//! │  ├────────────────────┤  │ channel  │  │  (worker thread, tokio task)   │  │
//! │  │  header + payload  │──┼─────────►│  ├────────────────────────────────┤  │
//! │  ├────────────────────┤  │          │  │        Acceptance Pool         │  │
//! │  │       flush        │  │          │  │  ┌──────┐ ┌──────┐ ┌────────┐  │  │
//! │  └────────────────────┘  │          │  │  │ slot │ │ slot │ │connect │  │  │
//! └──────────────────────────┘          │  │  └──────┘ └──────┘ └────────┘  │  │
//!                                       │  ├────────────────────────────────┤  │
//!                                       │  │   Delivery Sink (callback)     │  │
//!                                       │  └────────────────────────────────┘  │
//!                                       └──────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use msgpipe::{Receiver, Sender};
//!
//! let _receiver = Receiver::new("example", 1024, |message: &[u8]| {
//!     println!("received {} bytes", message.len());
//! })?;
//!
//! let mut sender = Sender::new("example");
//! sender.send(b"hello\0")?;
//! # Ok::<(), msgpipe::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
pub mod config;
mod endpoint;
pub mod error;
pub mod protocol;
pub mod receiver;
pub mod sender;
mod sink;

// Re-export commonly used types
pub use buffer::MessageBuffer;
pub use config::PipeConfig;
pub use error::{Error, Result};
pub use receiver::{Receiver, ReceiverStats};
pub use sender::Sender;
pub use sink::Callback;

/// Smallest staging buffer a receiver will allocate.
pub const MIN_BUFFER_SIZE: usize = 1024;

/// Staging buffer sizes are rounded up to a multiple of this.
pub const BUFFER_ALIGNMENT: usize = 64;

/// Default upper bound of one multiplexer wait, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1;

/// Default bound on reading the rest of a message, in milliseconds.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;
