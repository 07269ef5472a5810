use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use futures_util::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::Instrument;

use crate::config::{ConnectionConfig, ServerConfig};
use crate::error::{HandlerFault, SessionError};
use crate::handler::Handler;
use crate::http::parser::{
    HEADER_TERMINATOR, MAX_HEAD_SIZE, ParseError, find_headers_end, parse_http_request,
};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;

/// Size of a single socket read while waiting for the header block.
const READ_CHUNK: usize = 2048;

/// Per-connection settings, shared by every session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on every socket read and write.
    pub idle_timeout: Duration,
    pub max_requests: usize,
    /// Value of the `server` response header.
    pub server_name: String,
}

impl SessionConfig {
    pub fn from_config(
        server: &ServerConfig,
        connection: &ConnectionConfig,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            idle_timeout: connection.idle_timeout()?,
            max_requests: connection.max_requests,
            server_name: server.name.clone(),
        })
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed between requests.
    PeerClosed,
    /// The request asked for (or defaulted to) a non-persistent connection.
    KeepAliveDeclined,
    RequestLimitReached,
    /// Malformed or incomplete request, answered with 400.
    BadRequest,
    /// Handler failed, answered with 500.
    HandlerFault,
    IdleTimeout,
    PeerReset,
    TransportFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub requests_served: usize,
    pub reason: CloseReason,
}

pub enum ConnectionState {
    Reading,
    Dispatching(Request),
    Writing(Response, Disposition),
    Deciding(Disposition),
    Closed(CloseReason),
}

/// What happens once a response has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A handler response; stay open if the request allowed it.
    Served { keep_alive: bool },
    /// An error response; always close.
    Failed(CloseReason),
}

enum ReadHead {
    Complete(Bytes),
    /// Peer closed part way through a header block.
    Incomplete,
    /// Header block grew past `MAX_HEAD_SIZE`.
    TooLarge,
    /// Peer closed with nothing buffered.
    Closed,
}

/// One client connection, driven until it closes.
///
/// The session owns its socket and receive buffer exclusively. Bytes read
/// past the end of one request stay in the buffer for the next one.
pub struct Connection<S, H> {
    stream: S,
    peer: SocketAddr,
    buffer: BytesMut,
    requests_served: usize,
    running: bool,
    config: Arc<SessionConfig>,
    handler: Arc<H>,
}

impl<S, H> Connection<S, H>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    H: Handler,
{
    pub fn new(stream: S, peer: SocketAddr, config: Arc<SessionConfig>, handler: Arc<H>) -> Self {
        Self {
            stream,
            peer,
            buffer: BytesMut::with_capacity(4096),
            requests_served: 0,
            running: true,
            config,
            handler,
        }
    }

    /// Serves requests until the connection closes, then closes the socket.
    ///
    /// Every failure is contained here; the summary says how it ended.
    pub async fn run(mut self) -> SessionSummary {
        let span = tracing::info_span!("conn", peer = %self.peer);
        async move {
            let reason = self.drive().await;
            self.close().await;

            tracing::debug!(
                requests_served = self.requests_served,
                reason = ?reason,
                "Session finished"
            );

            SessionSummary {
                requests_served: self.requests_served,
                reason,
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self) -> CloseReason {
        let mut state = ConnectionState::Reading;

        while self.running {
            state = match state {
                ConnectionState::Closed(reason) => {
                    self.running = false;
                    return reason;
                }
                other => match self.step(other).await {
                    Ok(next) => next,
                    Err(err) => ConnectionState::Closed(Self::classify(err)),
                },
            };
        }

        CloseReason::PeerClosed
    }

    async fn step(&mut self, state: ConnectionState) -> Result<ConnectionState, SessionError> {
        let next = match state {
            ConnectionState::Reading => self.read_request().await?,

            ConnectionState::Dispatching(request) => self.dispatch(request).await,

            ConnectionState::Writing(response, disposition) => {
                let status = response.status;
                ResponseWriter::new(&self.config.server_name, self.config.idle_timeout)
                    .write(&mut self.stream, response)
                    .await?;
                tracing::debug!(status = status.as_u16(), "Response sent");
                ConnectionState::Deciding(disposition)
            }

            ConnectionState::Deciding(disposition) => self.decide(disposition),

            closed @ ConnectionState::Closed(_) => closed,
        };

        Ok(next)
    }

    async fn read_request(&mut self) -> Result<ConnectionState, SessionError> {
        let head = match self.read_head().await? {
            ReadHead::Complete(head) => head,
            ReadHead::Closed => return Ok(ConnectionState::Closed(CloseReason::PeerClosed)),
            ReadHead::Incomplete => {
                tracing::info!("Incomplete request, peer closed before end of headers");
                return Ok(Self::reject(Response::bad_request(), CloseReason::BadRequest));
            }
            ReadHead::TooLarge => {
                tracing::info!(limit = MAX_HEAD_SIZE, "Header block too large");
                return Ok(Self::reject(Response::bad_request(), CloseReason::BadRequest));
            }
        };

        let parsed = parse_http_request(
            &head,
            &mut self.buffer,
            &mut self.stream,
            self.config.idle_timeout,
        )
        .await;

        match parsed {
            Ok(request) => {
                tracing::info!(
                    method = %request.method,
                    path = %request.path,
                    version = %request.version,
                    "Request received"
                );
                Ok(ConnectionState::Dispatching(request))
            }
            Err(ParseError::Timeout(after)) => Err(SessionError::IdleTimeout(after)),
            Err(ParseError::Io(err)) => Err(SessionError::from_read(err)),
            Err(err) => {
                tracing::info!(error = %err, "Failed to parse request");
                Ok(Self::reject(Response::bad_request(), CloseReason::BadRequest))
            }
        }
    }

    /// Reads until the header terminator is buffered.
    ///
    /// Returns the header block without the terminator; the terminator is
    /// consumed and everything after it stays in the buffer. Only bytes not
    /// searched yet are scanned after each read.
    async fn read_head(&mut self) -> Result<ReadHead, SessionError> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut searched = 0;

        loop {
            if let Some(end) = find_headers_end(&self.buffer[searched..]).map(|at| searched + at) {
                if end > MAX_HEAD_SIZE {
                    return Ok(ReadHead::TooLarge);
                }
                let head = self.buffer.split_to(end).freeze();
                self.buffer.advance(HEADER_TERMINATOR.len());
                return Ok(ReadHead::Complete(head));
            }

            if self.buffer.len() > MAX_HEAD_SIZE {
                return Ok(ReadHead::TooLarge);
            }
            // A terminator may straddle the end of what is buffered.
            searched = self.buffer.len().saturating_sub(HEADER_TERMINATOR.len() - 1);

            let idle = self.config.idle_timeout;
            let n = timeout(idle, self.stream.read(&mut chunk))
                .await
                .map_err(|_| SessionError::IdleTimeout(idle))?
                .map_err(SessionError::from_read)?;

            if n == 0 {
                tracing::debug!(buffered = self.buffer.len(), "Socket closed by peer");
                if self.buffer.is_empty() {
                    return Ok(ReadHead::Closed);
                }
                self.buffer.clear();
                return Ok(ReadHead::Incomplete);
            }

            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    async fn dispatch(&mut self, request: Request) -> ConnectionState {
        let keep_alive = request.keep_alive();

        // The handler call happens inside the guarded future.
        let handler = Arc::clone(&self.handler);
        let result = AssertUnwindSafe(async { handler.handle(&request).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HandlerFault::Panicked(panic_message(&*panic))));

        match result {
            Ok(mut response) => {
                if request.is_head() {
                    response.head_only = true;
                }
                ConnectionState::Writing(response, Disposition::Served { keep_alive })
            }
            Err(fault) => {
                tracing::error!(
                    error = %fault,
                    method = %request.method,
                    path = %request.path,
                    "Error while handling request"
                );
                Self::reject(Response::internal_error(), CloseReason::HandlerFault)
            }
        }
    }

    fn decide(&mut self, disposition: Disposition) -> ConnectionState {
        let keep_alive = match disposition {
            Disposition::Failed(reason) => return ConnectionState::Closed(reason),
            Disposition::Served { keep_alive } => keep_alive,
        };

        self.requests_served += 1;

        if !keep_alive {
            return ConnectionState::Closed(CloseReason::KeepAliveDeclined);
        }

        if self.requests_served >= self.config.max_requests {
            tracing::info!(
                requests_served = self.requests_served,
                "Connection reached max requests limit"
            );
            return ConnectionState::Closed(CloseReason::RequestLimitReached);
        }

        ConnectionState::Reading
    }

    fn reject(response: Response, reason: CloseReason) -> ConnectionState {
        ConnectionState::Writing(response, Disposition::Failed(reason))
    }

    fn classify(err: SessionError) -> CloseReason {
        match err {
            SessionError::IdleTimeout(after) => {
                tracing::debug!(timeout = ?after, "Connection timed out (idle)");
                CloseReason::IdleTimeout
            }
            SessionError::PeerReset(err) => {
                tracing::debug!(error = %err, "Connection reset by peer");
                CloseReason::PeerReset
            }
            err @ (SessionError::Read(_) | SessionError::Write(_)) => {
                tracing::warn!(error = %err, "Unexpected connection error");
                CloseReason::TransportFailure
            }
        }
    }

    async fn close(&mut self) {
        self.running = false;
        if let Ok(Err(err)) = timeout(self.config.idle_timeout, self.stream.shutdown()).await {
            tracing::trace!(error = %err, "Socket shutdown failed");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
