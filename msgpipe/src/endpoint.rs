//! Channel endpoints backed by Unix domain sockets.
//!
//! [`PipeListener`] is the receiving side of a named channel and hands out one
//! [`PipeStream`] per attached sender. Both must be created inside a tokio
//! runtime context.

use std::fs;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use log::{debug, info, trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::net::{UnixListener, UnixStream};

use crate::buffer::MessageBuffer;
use crate::error::{Error, Result};
use crate::protocol::{MessageHeader, HEADER_SIZE};
use crate::MIN_BUFFER_SIZE;

/// Receiving end of a named channel.
///
/// The socket file is removed when the listener is dropped.
#[derive(Debug)]
pub(crate) struct PipeListener {
    inner: UnixListener,
    path: PathBuf,
}

impl PipeListener {
    /// Creates the channel `name` at `path`.
    ///
    /// Only one listener may serve a path at a time. A leftover socket file
    /// that nobody answers on is treated as stale and replaced.
    pub(crate) fn bind(name: &str, path: &Path) -> Result<Self> {
        let creation_error = |source: io::Error| Error::ChannelCreation {
            path: path.to_owned(),
            source,
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(creation_error)?;
        }

        match fs::symlink_metadata(path) {
            Ok(meta) if !meta.file_type().is_socket() => {
                return Err(creation_error(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "path exists and is not a socket",
                )));
            }
            Ok(_) => match std::os::unix::net::UnixStream::connect(path) {
                Ok(_) => {
                    return Err(Error::ChannelInUse {
                        name: name.to_owned(),
                    });
                }
                Err(err) => {
                    debug!("Removing stale channel socket {:?} ({})", path, err);
                    fs::remove_file(path).map_err(creation_error)?;
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(creation_error(err)),
        }

        let inner = UnixListener::bind(path).map_err(creation_error)?;
        info!("Channel `{}` listening on {:?}", name, path);

        Ok(Self {
            inner,
            path: path.to_owned(),
        })
    }

    /// Polls for the next attached sender.
    pub(crate) fn poll_accept(&self, cx: &mut Context<'_>) -> Poll<io::Result<PipeStream>> {
        self.inner
            .poll_accept(cx)
            .map_ok(|(stream, _)| PipeStream::new(stream))
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PipeListener {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed channel socket {:?}", self.path),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!("Failed to remove channel socket {:?}: {}", self.path, err),
        }
    }
}

/// One accepted sender connection.
///
/// The header of the next message is collected without blocking, so an idle
/// sender never holds up the worker. Header bytes that arrived so far are
/// kept across polls.
#[derive(Debug)]
pub(crate) struct PipeStream {
    inner: UnixStream,
    header: [u8; HEADER_SIZE],
    header_len: usize,
}

impl PipeStream {
    fn new(inner: UnixStream) -> Self {
        Self {
            inner,
            header: [0u8; HEADER_SIZE],
            header_len: 0,
        }
    }

    /// Polls until the next message header is complete.
    ///
    /// EOF, including EOF in the middle of a header, is reported as
    /// [`Error::Disconnected`].
    pub(crate) fn poll_header(&mut self, cx: &mut Context<'_>) -> Poll<Result<MessageHeader>> {
        while self.header_len < HEADER_SIZE {
            let mut buf = ReadBuf::new(&mut self.header[self.header_len..]);
            match Pin::new(&mut self.inner).poll_read(cx, &mut buf) {
                Poll::Ready(Ok(())) => {}
                Poll::Ready(Err(err)) => return Poll::Ready(Err(Error::Io(err))),
                Poll::Pending => return Poll::Pending,
            }
            let n = buf.filled().len();
            if n == 0 {
                return Poll::Ready(Err(Error::Disconnected));
            }
            self.header_len += n;
        }

        self.header_len = 0;
        Poll::Ready(MessageHeader::from_bytes(&self.header))
    }

    /// Reads the payload announced by `header` into `buffer`, returning its
    /// length.
    ///
    /// The first read is limited to the buffer's capacity. Whatever is still
    /// pending after that is appended behind it, growing the buffer by at
    /// most its current size at a time, so storage follows the bytes that
    /// actually arrive rather than the announced length.
    pub(crate) async fn read_body(
        &mut self,
        header: MessageHeader,
        buffer: &mut MessageBuffer,
    ) -> Result<usize> {
        let total = header.payload_len();

        buffer.reset();
        let first = total.min(buffer.capacity());
        self.inner
            .read_exact(&mut buffer.spare_mut()[..first])
            .await
            .map_err(disconnect_on_eof)?;
        buffer.advance(first);

        let mut remaining = total - first;
        if remaining > 0 {
            trace!(
                "Message of {} bytes exceeds staging buffer of {}, {} bytes pending",
                total,
                buffer.capacity(),
                remaining
            );
        }
        while remaining > 0 {
            if buffer.spare_mut().is_empty() {
                let step = remaining.min(buffer.capacity().max(MIN_BUFFER_SIZE));
                buffer.ensure_capacity(buffer.len() + step);
            }
            let want = remaining.min(buffer.spare_mut().len());
            let n = self.inner.read(&mut buffer.spare_mut()[..want]).await?;
            if n == 0 {
                return Err(Error::Disconnected);
            }
            buffer.advance(n);
            remaining -= n;
        }

        Ok(buffer.len())
    }
}

fn disconnect_on_eof(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::Disconnected
    } else {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_message;
    use futures::future::poll_fn;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::time::timeout;

    async fn connected_pair(listener: &PipeListener) -> (UnixStream, PipeStream) {
        let client = UnixStream::connect(listener.path()).await.unwrap();
        let server = poll_fn(|cx| listener.poll_accept(cx)).await.unwrap();
        (client, server)
    }

    async fn read_message(server: &mut PipeStream, buffer: &mut MessageBuffer) -> Result<usize> {
        let header = poll_fn(|cx| server.poll_header(cx)).await?;
        server.read_body(header, buffer).await
    }

    #[tokio::test]
    async fn test_read_small_message() {
        let dir = tempfile::tempdir().unwrap();
        let listener = PipeListener::bind("small", &dir.path().join("small.sock")).unwrap();
        let (mut client, mut server) = connected_pair(&listener).await;

        let mut frame = Vec::new();
        encode_message(&mut frame, b"hello\0").unwrap();
        client.write_all(&frame).await.unwrap();

        let mut buffer = MessageBuffer::new(1024);
        let len = read_message(&mut server, &mut buffer).await.unwrap();
        assert_eq!(len, 6);
        assert_eq!(buffer.as_slice(), b"hello\0");
        assert_eq!(buffer.capacity(), 1024);
    }

    #[tokio::test]
    async fn test_read_grows_for_large_message() {
        let dir = tempfile::tempdir().unwrap();
        let listener = PipeListener::bind("large", &dir.path().join("large.sock")).unwrap();
        let (mut client, mut server) = connected_pair(&listener).await;

        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let mut frame = Vec::new();
        encode_message(&mut frame, &payload).unwrap();
        client.write_all(&frame).await.unwrap();

        let mut buffer = MessageBuffer::new(1024);
        let len = read_message(&mut server, &mut buffer).await.unwrap();
        assert_eq!(len, payload.len());
        assert_eq!(buffer.as_slice(), payload.as_slice());
        assert_eq!(buffer.capacity(), payload.len());
    }

    #[tokio::test]
    async fn test_consecutive_messages_keep_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let listener = PipeListener::bind("seq", &dir.path().join("seq.sock")).unwrap();
        let (mut client, mut server) = connected_pair(&listener).await;

        let mut frame = Vec::new();
        encode_message(&mut frame, &[7u8; 3000]).unwrap();
        client.write_all(&frame).await.unwrap();
        encode_message(&mut frame, b"tail").unwrap();
        client.write_all(&frame).await.unwrap();

        let mut buffer = MessageBuffer::new(1024);
        assert_eq!(read_message(&mut server, &mut buffer).await.unwrap(), 3000);
        assert!(buffer.as_slice().iter().all(|&b| b == 7));
        assert_eq!(read_message(&mut server, &mut buffer).await.unwrap(), 4);
        assert_eq!(buffer.as_slice(), b"tail");
    }

    #[tokio::test]
    async fn test_idle_stream_has_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let listener = PipeListener::bind("idle", &dir.path().join("idle.sock")).unwrap();
        let (mut client, mut server) = connected_pair(&listener).await;

        let mut frame = Vec::new();
        encode_message(&mut frame, b"first").unwrap();
        client.write_all(&frame).await.unwrap();
        let mut buffer = MessageBuffer::new(1024);
        assert_eq!(read_message(&mut server, &mut buffer).await.unwrap(), 5);

        let idle = timeout(Duration::from_millis(50), poll_fn(|cx| server.poll_header(cx))).await;
        assert!(idle.is_err());

        // A header split across writes is picked up where it left off.
        encode_message(&mut frame, b"second").unwrap();
        client.write_all(&frame[..3]).await.unwrap();
        let partial = timeout(Duration::from_millis(50), poll_fn(|cx| server.poll_header(cx))).await;
        assert!(partial.is_err());
        client.write_all(&frame[3..]).await.unwrap();
        assert_eq!(read_message(&mut server, &mut buffer).await.unwrap(), 6);
        assert_eq!(buffer.as_slice(), b"second");
    }

    #[tokio::test]
    async fn test_announced_length_does_not_drive_allocation() {
        let dir = tempfile::tempdir().unwrap();
        let listener = PipeListener::bind("liar", &dir.path().join("liar.sock")).unwrap();
        let (mut client, mut server) = connected_pair(&listener).await;

        client
            .write_all(&MessageHeader::new(256 * 1024 * 1024).unwrap().to_bytes())
            .await
            .unwrap();
        client.write_all(&[0xAB; 2048]).await.unwrap();

        let mut buffer = MessageBuffer::new(1024);
        let result = timeout(
            Duration::from_millis(200),
            read_message(&mut server, &mut buffer),
        )
        .await;
        assert!(result.is_err());
        assert!(buffer.capacity() <= 4 * 1024, "capacity {}", buffer.capacity());
    }

    #[tokio::test]
    async fn test_eof_inside_body_is_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let listener = PipeListener::bind("cut", &dir.path().join("cut.sock")).unwrap();
        let (mut client, mut server) = connected_pair(&listener).await;

        client
            .write_all(&MessageHeader::new(4000).unwrap().to_bytes())
            .await
            .unwrap();
        client.write_all(&[1u8; 1500]).await.unwrap();
        drop(client);

        let mut buffer = MessageBuffer::new(1024);
        let result = read_message(&mut server, &mut buffer).await;
        assert!(matches!(result, Err(Error::Disconnected)));
    }

    #[tokio::test]
    async fn test_eof_is_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let listener = PipeListener::bind("eof", &dir.path().join("eof.sock")).unwrap();
        let (client, mut server) = connected_pair(&listener).await;
        drop(client);

        let mut buffer = MessageBuffer::new(1024);
        let result = read_message(&mut server, &mut buffer).await;
        assert!(matches!(result, Err(Error::Disconnected)));
    }

    #[tokio::test]
    async fn test_garbage_header_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let listener = PipeListener::bind("junk", &dir.path().join("junk.sock")).unwrap();
        let (mut client, mut server) = connected_pair(&listener).await;
        client.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();

        let mut buffer = MessageBuffer::new(1024);
        let result = read_message(&mut server, &mut buffer).await;
        assert!(matches!(result, Err(Error::InvalidHeader)));
    }

    #[tokio::test]
    async fn test_second_listener_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busy.sock");
        let _first = PipeListener::bind("busy", &path).unwrap();

        let second = PipeListener::bind("busy", &path);
        assert!(matches!(second, Err(Error::ChannelInUse { ref name }) if name == "busy"));
    }

    #[tokio::test]
    async fn test_stale_socket_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.sock");
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let listener = PipeListener::bind("stale", &path).unwrap();
        let _client = UnixStream::connect(listener.path()).await.unwrap();
    }

    #[tokio::test]
    async fn test_regular_file_not_clobbered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.sock");
        fs::write(&path, b"keep me").unwrap();

        let result = PipeListener::bind("file", &path);
        assert!(matches!(result, Err(Error::ChannelCreation { .. })));
        assert_eq!(fs::read(&path).unwrap(), b"keep me");
    }

    #[tokio::test]
    async fn test_drop_removes_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.sock");
        let listener = PipeListener::bind("gone", &path).unwrap();
        assert!(path.exists());

        drop(listener);
        assert!(!path.exists());
    }
}
