//! Sending side of a channel.
//!
//! A [`Sender`] holds at most one connection to the channel's receiver. It
//! connects on demand and reconnects once when a write finds the connection
//! stale, which is how it survives the receiver being restarted. Messages
//! are never queued: a send made while no receiver is listening fails.

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use crate::config::PipeConfig;
use crate::error::{Error, Result};
use crate::protocol::encode_message;

/// The sending end of a named channel.
///
/// Not internally synchronized; share it across threads only behind a lock.
#[derive(Debug)]
pub struct Sender {
    /// Channel name.
    name: String,

    /// Socket location derived from the name.
    path: PathBuf,

    /// Current connection, if any.
    endpoint: Option<UnixStream>,

    /// Reusable buffer holding the framed message.
    frame_buf: Vec<u8>,
}

impl Sender {
    /// Opens a sender on `name` with the default configuration.
    ///
    /// Succeeds even when no receiver exists yet; the connection is then
    /// made by the first [`send`](Self::send).
    pub fn new(name: &str) -> Self {
        Self::with_config(name, &PipeConfig::default())
    }

    /// Opens a sender on `name`, looking for the receiver in the configured
    /// namespace.
    pub fn with_config(name: &str, config: &PipeConfig) -> Self {
        let mut sender = Self {
            name: name.to_owned(),
            path: config.channel_path(name),
            endpoint: None,
            frame_buf: Vec::new(),
        };
        if let Err(err) = sender.connect() {
            debug!("Channel `{}` has no receiver yet: {}", sender.name, err);
        }
        sender
    }

    /// Sends `message` as one message.
    ///
    /// If the connection is missing or stale, reconnects once and retries.
    /// Any other failure, or a failed retry, is returned as is. A successful
    /// send has handed the whole frame to the kernel before returning.
    pub fn send(&mut self, message: &[u8]) -> Result<()> {
        encode_message(&mut self.frame_buf, message)?;

        match self.write_frame() {
            Ok(()) => {}
            Err(err) if err.is_reconnectable() => {
                debug!("Channel `{}` write failed ({}), reconnecting", self.name, err);
                self.connect()?;
                self.write_frame()?;
            }
            Err(err) => return Err(err),
        }

        self.flush()?;
        trace!("Channel `{}` sent {} bytes", self.name, message.len());
        Ok(())
    }

    /// Returns true if the sender currently holds a connection.
    ///
    /// The connection may still turn out stale on the next send.
    pub fn is_connected(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Channel name this sender targets.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location of the channel socket.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes the current connection, if any, and opens a new one.
    fn connect(&mut self) -> Result<()> {
        self.endpoint = None;
        let stream = UnixStream::connect(&self.path)?;
        debug!("Channel `{}` connected to {:?}", self.name, self.path);
        self.endpoint = Some(stream);
        Ok(())
    }

    fn write_frame(&mut self) -> Result<()> {
        let endpoint = self.endpoint.as_mut().ok_or(Error::NotConnected)?;
        endpoint.write_all(&self.frame_buf)?;
        Ok(())
    }

    /// Unix sockets keep no user-space buffer: once `write_all` returns the
    /// frame is with the kernel, so this only reports a lost connection.
    fn flush(&mut self) -> Result<()> {
        let endpoint = self.endpoint.as_mut().ok_or(Error::NotConnected)?;
        endpoint.flush()?;
        Ok(())
    }
}
