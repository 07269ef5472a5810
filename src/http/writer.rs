use std::io;
use std::time::{Duration, SystemTime};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::SessionError;
use crate::http::headers::HeaderMap;
use crate::http::response::{Body, Response};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Terminating chunk of a chunked body.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Headers the engine computes; user entries never replace them.
fn engine_headers(resp: &Response, server: &str, now: SystemTime) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("date", httpdate::fmt_http_date(now));
    headers.insert("server", server);

    if resp.is_chunked() {
        headers.insert("transfer-encoding", "chunked");
    }

    if !resp.head_only {
        if let Body::Full(body) = &resp.body {
            if !body.is_empty() {
                headers.insert("content-length", body.len().to_string());
            }
        }
        if let Some(media_type) = &resp.content_type {
            headers.insert("content-type", media_type.as_str());
        }
    }

    headers
}

/// Serializes the status line and header block, including the blank line.
pub fn serialize_head(resp: &Response, server: &str, now: SystemTime) -> Vec<u8> {
    let mut headers = engine_headers(resp, server, now);

    for (name, value) in resp.headers.iter() {
        // Framing belongs to the engine unless no body follows.
        let framing = name == "content-length" || name == "transfer-encoding";
        if framing && !resp.head_only {
            continue;
        }
        headers.insert_if_absent(name, value);
    }

    let mut buf = Vec::with_capacity(256);

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    // Headers
    for (k, v) in headers.iter() {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf
}

/// Frames one chunk as `<HEX>\r\n<bytes>\r\n`. Empty chunks produce nothing,
/// since a zero-length frame would end the body early.
pub fn encode_chunk(chunk: &[u8]) -> Option<Vec<u8>> {
    if chunk.is_empty() {
        return None;
    }

    let mut frame = format!("{:X}\r\n", chunk.len()).into_bytes();
    frame.extend_from_slice(chunk);
    frame.extend_from_slice(b"\r\n");
    Some(frame)
}

/// Writes responses to a socket, bounding every send by a timeout.
pub struct ResponseWriter<'a> {
    server_name: &'a str,
    write_timeout: Duration,
}

impl<'a> ResponseWriter<'a> {
    pub fn new(server_name: &'a str, write_timeout: Duration) -> Self {
        Self {
            server_name,
            write_timeout,
        }
    }

    /// Sends `response`.
    ///
    /// Head-only responses send the header block alone. Fixed bodies go out
    /// with the header block in a single write. Chunked bodies send the
    /// header block, one frame per non-empty chunk, then the last chunk; a
    /// failure part way through is not retried.
    pub async fn write<W>(&self, stream: &mut W, response: Response) -> Result<(), SessionError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut head = serialize_head(&response, self.server_name, SystemTime::now());

        if response.head_only {
            self.send(stream, &head).await?;
            return self.flush(stream).await;
        }

        match response.body {
            Body::Full(body) => {
                head.extend_from_slice(&body);
                self.send(stream, &head).await?;
            }
            Body::Chunked(chunks) => {
                self.send(stream, &head).await?;
                for chunk in chunks {
                    if let Some(frame) = encode_chunk(&chunk) {
                        self.send(stream, &frame).await?;
                    }
                }
                self.send(stream, LAST_CHUNK).await?;
            }
        }

        self.flush(stream).await
    }

    async fn send<W>(&self, stream: &mut W, buf: &[u8]) -> Result<(), SessionError>
    where
        W: AsyncWrite + Unpin,
    {
        timeout(self.write_timeout, stream.write_all(buf))
            .await
            .map_err(|_| SessionError::Write(io::ErrorKind::TimedOut.into()))?
            .map_err(SessionError::from_write)
    }

    async fn flush<W>(&self, stream: &mut W) -> Result<(), SessionError>
    where
        W: AsyncWrite + Unpin,
    {
        timeout(self.write_timeout, stream.flush())
            .await
            .map_err(|_| SessionError::Write(io::ErrorKind::TimedOut.into()))?
            .map_err(SessionError::from_write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::{ResponseBuilder, StatusCode};

    #[test]
    fn unknown_status_still_serializes() {
        let resp = ResponseBuilder::new(StatusCode(299)).build();
        let head = serialize_head(&resp, "test", SystemTime::UNIX_EPOCH);

        assert!(head.starts_with(b"HTTP/1.1 299 Unknown\r\n"));
        assert!(head.ends_with(b"\r\n\r\n"));
    }

    #[test]
    fn empty_chunk_is_skipped() {
        assert_eq!(encode_chunk(b""), None);
        assert_eq!(encode_chunk(&[b'x'; 26]).unwrap()[..4], *b"1A\r\n");
    }
}
