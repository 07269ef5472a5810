use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpSocket};
use tracing::info;

use crate::config::{Config, PoolConfig, ServerConfig};
use crate::handler::Handler;
use crate::http::connection::{Connection, SessionConfig};
use crate::server::pool::WorkerPool;

/// Pause after a failed accept, so a persistent error does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Accepts TCP connections and hands each one to the worker pool.
pub struct Server {
    listener: TcpListener,
    pool: WorkerPool,
    session: Arc<SessionConfig>,
}

impl Server {
    /// Binds the IPv4 listening socket with the configured backlog.
    pub async fn bind(
        server: &ServerConfig,
        pool: &PoolConfig,
        session: SessionConfig,
    ) -> anyhow::Result<Self> {
        let listen_addr = server.listen_addr();
        let addr = tokio::net::lookup_host(&listen_addr)
            .await
            .with_context(|| format!("failed to resolve {listen_addr}"))?
            .find(SocketAddr::is_ipv4)
            .with_context(|| format!("no IPv4 address for {listen_addr}"))?;

        let socket = TcpSocket::new_v4()?;
        if server.development_mode {
            socket.set_reuseaddr(true)?;
        }
        socket
            .bind(addr)
            .with_context(|| format!("failed to bind {addr}"))?;
        let listener = socket.listen(server.backlog)?;

        info!(
            address = %listener.local_addr()?,
            backlog = server.backlog,
            workers = pool.workers,
            capacity = pool.capacity,
            "Listening"
        );

        Ok(Self {
            listener,
            pool: WorkerPool::from_config(pool),
            session: Arc::new(session),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` resolves, then closes the
    /// listening socket and waits for in-flight connections to finish.
    pub async fn run<H, F>(self, handler: Arc<H>, shutdown: F) -> anyhow::Result<()>
    where
        H: Handler,
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            pool,
            session,
        } = self;
        tokio::pin!(shutdown);

        loop {
            let admission = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                admission = pool.admit() => admission?,
            };

            let accepted = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                accepted = listener.accept() => accepted,
            };

            let (socket, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept connection");
                    drop(admission);
                    if backoff(&mut shutdown, ACCEPT_ERROR_BACKOFF).await {
                        break;
                    }
                    continue;
                }
            };

            info!(%peer, in_flight = pool.in_flight(), "Accepted connection");

            let conn = Connection::new(socket, peer, session.clone(), handler.clone());
            pool.submit(admission, async move {
                let summary = conn.run().await;
                info!(
                    %peer,
                    requests_served = summary.requests_served,
                    reason = ?summary.reason,
                    "Closed connection"
                );
            });
        }

        info!("Shutdown signal received, no longer accepting connections");
        drop(listener);
        pool.shutdown().await;

        Ok(())
    }
}

/// Sleeps for `pause` unless `shutdown` resolves first; true on shutdown.
async fn backoff<S>(shutdown: &mut S, pause: Duration) -> bool
where
    S: Future + Unpin,
{
    tokio::select! {
        biased;
        _ = &mut *shutdown => true,
        _ = tokio::time::sleep(pause) => false,
    }
}

/// Binds according to `cfg` and serves until `shutdown` resolves.
pub async fn run<H, F>(cfg: &Config, handler: H, shutdown: F) -> anyhow::Result<()>
where
    H: Handler,
    F: Future<Output = ()>,
{
    let session = SessionConfig::from_config(&cfg.server, &cfg.connection)?;
    let server = Server::bind(&cfg.server, &cfg.pool, session).await?;
    server.run(Arc::new(handler), shutdown).await
}
