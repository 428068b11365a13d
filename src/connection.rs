//! Connections
//!
//! A [`Connection`] is one physical, single-use byte stream to the daemon.
//! It is opened fresh for every logical operation, handed to exactly one
//! caller, and discarded after one request/response (or one long-lived
//! streaming) exchange. Connections are never pooled or reused: a broken
//! exchange can only ever poison itself.
//!
//! The connection carries an ordered list of [`TransportStage`] tags
//! describing its processing pipeline. When the endpoint is secured the TLS
//! stage is always first, so every byte is decrypted before the HTTP framing
//! sees it.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::error::TransportError;
use crate::http::{HttpDecoder, HttpRequest, HttpResponse};

/// Byte streams a connection can be built from
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

/// Unique identifier for one connection
///
/// Used to correlate instrumentation output; two connections never share an
/// id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Generate a new unique connection id from 128 random bits
    #[must_use]
    pub fn new() -> Self {
        use rand::Rng;
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(format!("conn_{}", hex::encode(bytes)))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One stage of a connection's processing pipeline, in pipeline order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportStage {
    /// Secure session wrapper (encryption and peer identity verification)
    Tls,
    /// HTTP request/response boundary detection
    HttpFraming,
    /// Byte-counting diagnostic observer
    Logging,
}

/// A single-use bidirectional byte stream to the daemon
///
/// Implements [`AsyncRead`] and [`AsyncWrite`] for long-lived streaming
/// exchanges, and offers [`send_request`](Self::send_request) /
/// [`read_response`](Self::read_response) for the common one-shot case.
pub struct Connection {
    id: ConnectionId,
    peer: String,
    stages: Vec<TransportStage>,
    stream: Box<dyn ByteStream>,
    decoder: HttpDecoder,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap an established stream
    pub(crate) fn new(stream: Box<dyn ByteStream>, peer: String, stages: Vec<TransportStage>) -> Self {
        Self {
            id: ConnectionId::new(),
            peer,
            stages,
            stream,
            decoder: HttpDecoder::new(),
        }
    }

    /// The connection's unique id
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Human-readable description of the peer endpoint
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// The processing pipeline, in order
    #[must_use]
    pub fn stages(&self) -> &[TransportStage] {
        &self.stages
    }

    /// Whether the first pipeline stage is the secure session wrapper
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.stages.first() == Some(&TransportStage::Tls)
    }

    /// Attach the byte-counting diagnostic observer
    ///
    /// Observation only: bytes pass through unaltered.
    pub(crate) fn instrument(self) -> Self {
        let Self {
            id,
            peer,
            mut stages,
            stream,
            decoder,
        } = self;
        let stream: Box<dyn ByteStream> = Box::new(Instrumented::new(stream, id.clone()));
        stages.push(TransportStage::Logging);
        Self {
            id,
            peer,
            stages,
            stream,
            decoder,
        }
    }

    /// Write one request frame
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the write fails.
    pub async fn send_request(&mut self, request: &HttpRequest) -> Result<(), TransportError> {
        self.stream.write_all(&request.encode()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read until one complete response has been framed
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Frame`] for malformed responses and
    /// [`TransportError::Io`] for read failures.
    pub async fn read_response(&mut self) -> Result<HttpResponse, TransportError> {
        let mut buf = [0u8; 8192];
        loop {
            if let Some(response) = self.decoder.decode()? {
                return Ok(response);
            }
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                self.decoder.mark_eof();
                return match self.decoder.decode()? {
                    Some(response) => Ok(response),
                    None => Err(TransportError::Frame(
                        "connection closed before a complete response".to_string(),
                    )),
                };
            }
            self.decoder.push(&buf[..n]);
        }
    }

    /// Gracefully close the connection
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the shutdown fails.
    pub async fn close(mut self) -> Result<(), TransportError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}

/// Byte-counting observer around a stream
///
/// Counts and traces bytes in each direction without touching them. Totals
/// are logged when the connection is dropped.
struct Instrumented<S> {
    inner: S,
    id: ConnectionId,
    bytes_in: u64,
    bytes_out: u64,
}

impl<S> Instrumented<S> {
    fn new(inner: S, id: ConnectionId) -> Self {
        Self {
            inner,
            id,
            bytes_in: 0,
            bytes_out: 0,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Instrumented<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let n = buf.filled().len() - before;
                if n > 0 {
                    this.bytes_in += n as u64;
                    tracing::trace!(conn = %this.id, bytes = n, "read");
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Instrumented<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                if n > 0 {
                    this.bytes_out += n as u64;
                    tracing::trace!(conn = %this.id, bytes = n, "write");
                }
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

impl<S> Drop for Instrumented<S> {
    fn drop(&mut self) {
        tracing::debug!(
            conn = %self.id,
            bytes_in = self.bytes_in,
            bytes_out = self.bytes_out,
            "connection closed"
        );
    }
}
