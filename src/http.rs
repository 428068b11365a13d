//! HTTP Framing
//!
//! Request/response boundary detection for the byte streams the transport
//! hands out. Every connection, local or network, speaks HTTP/1.1 to the
//! daemon; this module writes request frames and incrementally splits the
//! inbound byte stream into complete responses. It knows where a message
//! ends (content-length, chunked encoding, or connection close) and nothing
//! about what the body means.
//!
//! # Limits
//!
//! Head and body sizes are bounded before buffering to prevent memory
//! exhaustion from a misbehaving peer.

use crate::error::TransportError;

/// Maximum size of a response head (status line plus headers)
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Maximum size of a response body
pub const MAX_BODY_SIZE: usize = 32 * 1024 * 1024;

/// An HTTP request to be written on a connection
///
/// Thin frame builder: the command layer supplies method, path, headers and
/// an already-encoded body.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// Request method (`GET`, `POST`, ...)
    pub method: String,
    /// Request path including any query string
    pub path: String,
    /// Header name/value pairs, written in order
    pub headers: Vec<(String, String)>,
    /// Request body bytes
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Create a request with the given method and path
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Create a GET request
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    /// Create a POST request
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new("POST", path)
    }

    /// Append a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the request body
    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Encode the request to wire bytes
    ///
    /// `Content-Length` is added for non-empty bodies and `Connection:
    /// close` by default, unless the caller supplied those headers itself.
    /// Connections are single-use, so close-delimited exchanges are the
    /// norm.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.body.len());
        out.extend_from_slice(self.method.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.path.as_bytes());
        out.extend_from_slice(b" HTTP/1.1\r\n");

        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        if !self.body.is_empty() && !self.has_header("content-length") {
            out.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        if !self.has_header("connection") {
            out.extend_from_slice(b"Connection: close\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

/// A complete HTTP response as delivered by the framing layer
#[derive(Clone, Debug)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Reason phrase from the status line
    pub reason: String,
    /// Header name/value pairs in wire order
    pub headers: Vec<(String, String)>,
    /// Body bytes
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// First header value with the given name, case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// How the current response's body is delimited
#[derive(Debug)]
enum BodyState {
    /// Still reading the head
    AwaitingHead,
    /// `Content-Length` body with this many bytes left
    Fixed { remaining: usize },
    /// Chunked encoding: expecting a chunk-size line
    ChunkSize,
    /// Chunked encoding: expecting chunk data plus trailing CRLF
    ChunkData { remaining: usize },
    /// Chunked encoding: consuming trailer lines after the last chunk
    ChunkTrailer,
    /// Body runs until the peer closes the connection
    UntilEof,
}

/// Incremental response decoder
///
/// Feed raw bytes with [`push`](Self::push), then call
/// [`decode`](Self::decode) until it yields a complete response. Mark end of
/// stream with [`mark_eof`](Self::mark_eof) so close-delimited bodies can
/// complete.
#[derive(Debug)]
pub struct HttpDecoder {
    buf: Vec<u8>,
    head: Option<(u16, String, Vec<(String, String)>)>,
    body: Vec<u8>,
    state: BodyState,
    eof: bool,
}

impl Default for HttpDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(4096),
            head: None,
            body: Vec::new(),
            state: BodyState::AwaitingHead,
            eof: false,
        }
    }

    /// Append raw bytes from the stream
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Mark that the stream has reached end of file
    pub fn mark_eof(&mut self) {
        self.eof = true;
    }

    /// Try to decode one complete response from the buffered bytes
    ///
    /// Returns `Ok(None)` when more data is needed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Frame`] for malformed heads, oversized
    /// messages, invalid chunk framing, or a stream that ends mid-message.
    pub fn decode(&mut self) -> Result<Option<HttpResponse>, TransportError> {
        if self.head.is_none() && !self.parse_head()? {
            return Ok(None);
        }

        loop {
            match self.state {
                BodyState::AwaitingHead => unreachable!("head parsed above"),
                BodyState::Fixed { remaining } => {
                    let take = remaining.min(self.buf.len());
                    self.take_body(take)?;
                    let remaining = remaining - take;
                    self.state = BodyState::Fixed { remaining };
                    if remaining == 0 {
                        return Ok(Some(self.finish()));
                    }
                    if self.eof {
                        return Err(TransportError::Frame(format!(
                            "stream ended with {remaining} body bytes outstanding"
                        )));
                    }
                    return Ok(None);
                }
                BodyState::ChunkSize => {
                    let Some(line_end) = find(&self.buf, b"\r\n") else {
                        return self.need_more_line();
                    };
                    let line = &self.buf[..line_end];
                    // chunk extensions after ';' are ignored
                    let size_part = line
                        .split(|&b| b == b';')
                        .next()
                        .unwrap_or(line);
                    let size_str = std::str::from_utf8(size_part)
                        .map_err(|_| TransportError::Frame("non-ascii chunk size".to_string()))?
                        .trim();
                    let size = usize::from_str_radix(size_str, 16).map_err(|_| {
                        TransportError::Frame(format!("invalid chunk size {size_str:?}"))
                    })?;
                    // bound before any arithmetic on it; a hostile peer can
                    // declare a chunk near usize::MAX
                    if size > MAX_BODY_SIZE {
                        return Err(TransportError::Frame(format!(
                            "declared chunk of {size} bytes exceeds {MAX_BODY_SIZE}"
                        )));
                    }
                    self.buf.drain(..line_end + 2);
                    if size == 0 {
                        self.state = BodyState::ChunkTrailer;
                    } else {
                        self.state = BodyState::ChunkData { remaining: size };
                    }
                }
                BodyState::ChunkData { remaining } => {
                    // wait for the whole chunk plus its CRLF terminator
                    if self.buf.len() < remaining + 2 {
                        return self.need_more_line();
                    }
                    if &self.buf[remaining..remaining + 2] != b"\r\n" {
                        return Err(TransportError::Frame(
                            "chunk data not terminated by CRLF".to_string(),
                        ));
                    }
                    self.take_body(remaining)?;
                    self.buf.drain(..2);
                    self.state = BodyState::ChunkSize;
                }
                BodyState::ChunkTrailer => {
                    let Some(line_end) = find(&self.buf, b"\r\n") else {
                        return self.need_more_line();
                    };
                    let empty = line_end == 0;
                    self.buf.drain(..line_end + 2);
                    if empty {
                        return Ok(Some(self.finish()));
                    }
                    // trailer header dropped; boundary detection only
                }
                BodyState::UntilEof => {
                    let take = self.buf.len();
                    self.take_body(take)?;
                    if self.eof {
                        return Ok(Some(self.finish()));
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Returns true once a complete head has been parsed off the buffer
    fn parse_head(&mut self) -> Result<bool, TransportError> {
        let Some(head_end) = find(&self.buf, b"\r\n\r\n") else {
            if self.buf.len() > MAX_HEAD_SIZE {
                return Err(TransportError::Frame(format!(
                    "response head exceeds {MAX_HEAD_SIZE} bytes"
                )));
            }
            if self.eof && !self.buf.is_empty() {
                return Err(TransportError::Frame(
                    "stream ended before a complete response head".to_string(),
                ));
            }
            return Ok(false);
        };
        if head_end > MAX_HEAD_SIZE {
            return Err(TransportError::Frame(format!(
                "response head exceeds {MAX_HEAD_SIZE} bytes"
            )));
        }

        let head_bytes = self.buf[..head_end].to_vec();
        self.buf.drain(..head_end + 4);

        let head_str = std::str::from_utf8(&head_bytes)
            .map_err(|_| TransportError::Frame("response head is not valid UTF-8".to_string()))?;
        let mut lines = head_str.split("\r\n");

        let status_line = lines
            .next()
            .ok_or_else(|| TransportError::Frame("empty response head".to_string()))?;
        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or("");
        if !version.starts_with("HTTP/1.") {
            return Err(TransportError::Frame(format!(
                "unexpected protocol version {version:?}"
            )));
        }
        let status: u16 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| TransportError::Frame(format!("bad status line {status_line:?}")))?;
        let reason = parts.next().unwrap_or("").to_string();

        let mut headers = Vec::new();
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                return Err(TransportError::Frame(format!("malformed header line {line:?}")));
            };
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        self.state = body_state_for(status, &headers)?;
        self.head = Some((status, reason, headers));
        Ok(true)
    }

    fn take_body(&mut self, n: usize) -> Result<(), TransportError> {
        if self.body.len() + n > MAX_BODY_SIZE {
            return Err(TransportError::Frame(format!(
                "response body exceeds {MAX_BODY_SIZE} bytes"
            )));
        }
        self.body.extend_from_slice(&self.buf[..n]);
        self.buf.drain(..n);
        Ok(())
    }

    fn need_more_line(&self) -> Result<Option<HttpResponse>, TransportError> {
        if self.eof {
            return Err(TransportError::Frame(
                "stream ended inside chunked framing".to_string(),
            ));
        }
        if self.buf.len() > MAX_BODY_SIZE {
            return Err(TransportError::Frame(format!(
                "response body exceeds {MAX_BODY_SIZE} bytes"
            )));
        }
        Ok(None)
    }

    fn finish(&mut self) -> HttpResponse {
        let (status, reason, headers) = self.head.take().unwrap_or((0, String::new(), Vec::new()));
        self.state = BodyState::AwaitingHead;
        HttpResponse {
            status,
            reason,
            headers,
            body: std::mem::take(&mut self.body),
        }
    }
}

/// Determine how the body is delimited from the parsed head
fn body_state_for(
    status: u16,
    headers: &[(String, String)],
) -> Result<BodyState, TransportError> {
    // no body by definition
    if matches!(status, 204 | 304) || (100..200).contains(&status) {
        return Ok(BodyState::Fixed { remaining: 0 });
    }

    let header = |name: &str| {
        headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    };

    if let Some(te) = header("transfer-encoding") {
        if te.to_ascii_lowercase().contains("chunked") {
            return Ok(BodyState::ChunkSize);
        }
    }
    if let Some(len) = header("content-length") {
        let remaining: usize = len.trim().parse().map_err(|_| {
            TransportError::Frame(format!("invalid content-length {len:?}"))
        })?;
        if remaining > MAX_BODY_SIZE {
            return Err(TransportError::Frame(format!(
                "declared body of {remaining} bytes exceeds {MAX_BODY_SIZE}"
            )));
        }
        return Ok(BodyState::Fixed { remaining });
    }
    Ok(BodyState::UntilEof)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_get_request() {
        let req = HttpRequest::get("/_ping").header("Host", "localhost");
        let wire = String::from_utf8(req.encode()).unwrap();
        assert!(wire.starts_with("GET /_ping HTTP/1.1\r\n"));
        assert!(wire.contains("Host: localhost\r\n"));
        assert!(wire.contains("Connection: close\r\n"));
        assert!(wire.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_encode_post_adds_content_length() {
        let req = HttpRequest::post("/containers/create").body(b"{}".to_vec());
        let wire = String::from_utf8(req.encode()).unwrap();
        assert!(wire.contains("Content-Length: 2\r\n"));
        assert!(wire.ends_with("\r\n\r\n{}"));
    }

    #[test]
    fn test_decode_content_length_body() {
        let mut dec = HttpDecoder::new();
        dec.push(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
        let resp = dec.decode().unwrap().unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.reason, "OK");
        assert_eq!(resp.body, b"hello");
    }

    #[test]
    fn test_decode_across_split_reads() {
        let mut dec = HttpDecoder::new();
        let wire = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n0123456789";
        for chunk in wire.chunks(7) {
            dec.push(chunk);
        }
        // decode only sees the full message after all pushes
        let resp = dec.decode().unwrap().unwrap();
        assert_eq!(resp.body, b"0123456789");
    }

    #[test]
    fn test_decode_incremental_returns_none_until_complete() {
        let mut dec = HttpDecoder::new();
        dec.push(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nab");
        assert!(dec.decode().unwrap().is_none());
        dec.push(b"cd");
        assert_eq!(dec.decode().unwrap().unwrap().body, b"abcd");
    }

    #[test]
    fn test_decode_chunked_body() {
        let mut dec = HttpDecoder::new();
        dec.push(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n");
        dec.push(b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n");
        let resp = dec.decode().unwrap().unwrap();
        assert_eq!(resp.body, b"Wikipedia");
    }

    #[test]
    fn test_decode_chunked_with_trailer() {
        let mut dec = HttpDecoder::new();
        dec.push(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n");
        dec.push(b"3\r\nabc\r\n0\r\nX-Done: yes\r\n\r\n");
        let resp = dec.decode().unwrap().unwrap();
        assert_eq!(resp.body, b"abc");
    }

    #[test]
    fn test_decode_eof_delimited_body() {
        let mut dec = HttpDecoder::new();
        dec.push(b"HTTP/1.1 200 OK\r\n\r\nstream until close");
        assert!(dec.decode().unwrap().is_none());
        dec.mark_eof();
        let resp = dec.decode().unwrap().unwrap();
        assert_eq!(resp.body, b"stream until close");
    }

    #[test]
    fn test_decode_no_content() {
        let mut dec = HttpDecoder::new();
        dec.push(b"HTTP/1.1 204 No Content\r\n\r\n");
        let resp = dec.decode().unwrap().unwrap();
        assert_eq!(resp.status, 204);
        assert!(resp.body.is_empty());
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let mut dec = HttpDecoder::new();
        dec.push(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 0\r\n\r\n");
        let resp = dec.decode().unwrap().unwrap();
        assert_eq!(resp.header("content-type"), Some("application/json"));
        assert_eq!(resp.header("x-missing"), None);
    }

    #[test]
    fn test_oversized_head_rejected() {
        let mut dec = HttpDecoder::new();
        dec.push(b"HTTP/1.1 200 OK\r\n");
        dec.push(&vec![b'a'; MAX_HEAD_SIZE + 16]);
        assert!(matches!(dec.decode(), Err(TransportError::Frame(_))));
    }

    #[test]
    fn test_truncated_fixed_body_rejected() {
        let mut dec = HttpDecoder::new();
        dec.push(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc");
        dec.mark_eof();
        assert!(matches!(dec.decode(), Err(TransportError::Frame(_))));
    }

    #[test]
    fn test_bad_status_line_rejected() {
        let mut dec = HttpDecoder::new();
        dec.push(b"NOT-HTTP nonsense\r\n\r\n");
        assert!(matches!(dec.decode(), Err(TransportError::Frame(_))));
    }

    #[test]
    fn test_oversized_chunk_size_rejected() {
        // a chunk size near usize::MAX must yield a framing error, not
        // overflow the buffer arithmetic
        let mut dec = HttpDecoder::new();
        dec.push(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n");
        dec.push(b"ffffffffffffffff\r\nX");
        assert!(matches!(dec.decode(), Err(TransportError::Frame(_))));
    }

    #[test]
    fn test_declared_oversized_body_rejected() {
        let mut dec = HttpDecoder::new();
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n",
            MAX_BODY_SIZE + 1
        );
        dec.push(head.as_bytes());
        assert!(matches!(dec.decode(), Err(TransportError::Frame(_))));
    }
}
