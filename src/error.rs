//! Error types shared by the connection session and the worker pool.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failure raised by a request handler.
///
/// Always answered with a 500 and a closed connection.
#[derive(Debug, Error)]
pub enum HandlerFault {
    #[error("handler failed: {0}")]
    Failed(#[from] anyhow::Error),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerFault {
    pub fn msg(message: impl std::fmt::Display + std::fmt::Debug + Send + Sync + 'static) -> Self {
        HandlerFault::Failed(anyhow::Error::msg(message))
    }
}

/// Transport-level failure that ends a session without a response.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no bytes exchanged within {0:?}")]
    IdleTimeout(Duration),

    #[error("connection reset by peer: {0}")]
    PeerReset(#[source] io::Error),

    #[error("socket read failed: {0}")]
    Read(#[source] io::Error),

    #[error("socket write failed: {0}")]
    Write(#[source] io::Error),
}

impl SessionError {
    /// Classifies a read error, separating abrupt disconnects from real faults.
    pub fn from_read(err: io::Error) -> Self {
        if is_disconnect(&err) {
            SessionError::PeerReset(err)
        } else {
            SessionError::Read(err)
        }
    }

    pub fn from_write(err: io::Error) -> Self {
        if is_disconnect(&err) {
            SessionError::PeerReset(err)
        } else {
            SessionError::Write(err)
        }
    }
}

fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/// The worker pool no longer admits work.
#[derive(Debug, Error)]
#[error("worker pool is shut down")]
pub struct PoolClosed;
