use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

use crate::http::headers::HeaderMap;
use crate::http::request::{Method, Request};

/// Separator between the header block and the body.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Largest header block accepted, terminator excluded.
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Upper bound for a single body read from the socket.
const BODY_READ_CHUNK: usize = 10 * 1024;

/// Body buffers are never preallocated beyond this, whatever the peer declares.
const MAX_BODY_PREALLOC: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),

    #[error("timed out after {0:?} waiting for request body")]
    Timeout(Duration),

    #[error("failed to read request body: {0}")]
    Io(#[from] io::Error),
}

/// Request line and headers, before the body is read.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub path: String,
    pub version: String,
    pub headers: HeaderMap,
}

/// Parses a full request: head from `head`, body from `buffered` then `reader`.
///
/// `head` is the header block without its terminator. `buffered` holds the
/// bytes already received after the terminator; only the body's share of
/// them is consumed, anything past `content-length` stays in place for the
/// next request. Each socket read is bounded by `read_timeout`.
pub async fn parse_http_request<R>(
    head: &[u8],
    buffered: &mut BytesMut,
    reader: &mut R,
    read_timeout: Duration,
) -> Result<Request, ParseError>
where
    R: AsyncRead + Unpin,
{
    let RequestHead {
        method,
        path,
        version,
        headers,
    } = parse_head(head)?;

    let body = match headers.get("content-length") {
        Some(raw) => match raw.parse::<usize>() {
            Ok(length) => read_body(buffered, length, reader, read_timeout).await?,
            Err(_) => {
                tracing::warn!(content_length = raw, "Invalid Content-Length value, ignoring body");
                Bytes::new()
            }
        },
        None => Bytes::new(),
    };

    Ok(Request {
        method,
        path,
        version,
        headers,
        body,
    })
}

/// Parses the request line and header fields.
///
/// Bytes are decoded as ISO-8859-1, so arbitrary octets never fail to
/// decode. Header lines without a colon are skipped.
pub fn parse_head(head: &[u8]) -> Result<RequestHead, ParseError> {
    let text: String = head.iter().map(|&b| char::from(b)).collect();
    let mut lines = text.split("\r\n");

    let request_line = lines.next().unwrap_or("");
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    let [method, path, version] = parts[..] else {
        return Err(ParseError::MalformedRequestLine(request_line.to_string()));
    };

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }

        let Some((name, value)) = line.split_once(':') else {
            tracing::debug!(line, "Skipping malformed header line");
            continue;
        };

        headers.append(&name.trim().to_ascii_lowercase(), value.trim());
    }

    Ok(RequestHead {
        method: Method::parse(method),
        path: path.to_string(),
        version: version.to_string(),
        headers,
    })
}

/// Reads exactly `content_length` body bytes, or fewer if the peer closes.
///
/// Starts from the front of `buffered` and never reads past the declared
/// length from `reader`.
pub async fn read_body<R>(
    buffered: &mut BytesMut,
    content_length: usize,
    reader: &mut R,
    read_timeout: Duration,
) -> Result<Bytes, ParseError>
where
    R: AsyncRead + Unpin,
{
    let prefix = buffered.split_to(content_length.min(buffered.len()));
    if prefix.len() == content_length {
        return Ok(prefix.freeze());
    }

    let mut body = BytesMut::with_capacity(content_length.min(MAX_BODY_PREALLOC));
    body.extend_from_slice(&prefix);

    let mut chunk = vec![0u8; BODY_READ_CHUNK];
    while body.len() < content_length {
        let want = (content_length - body.len()).min(BODY_READ_CHUNK);
        let n = timeout(read_timeout, reader.read(&mut chunk[..want]))
            .await
            .map_err(|_| ParseError::Timeout(read_timeout))??;

        if n == 0 {
            tracing::debug!(
                expected = content_length,
                received = body.len(),
                "Client closed while sending body"
            );
            break;
        }

        body.extend_from_slice(&chunk[..n]);
    }

    Ok(body.freeze())
}

/// Position of the header terminator in `buf`, if present.
pub fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}
