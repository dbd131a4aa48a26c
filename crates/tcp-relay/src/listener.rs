//! Listener and acceptor: binds the local address and spawns one session
//! task per accepted client.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use session_log::{EventKind, LogRecord, SessionLogger};
use tokio::net::{TcpListener, TcpStream};

use crate::relay::ChunkInspector;
use crate::session::handle_connection;
use crate::session_id::SessionIdSource;

/// Default chunk size: twice the RFC 5321 4.5.3.1.4 command line limit.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Configuration for the relay.
pub struct RelayConfig {
    /// Local address to accept client connections on.
    pub listen_addr: String,
    /// Upstream address dialed once per accepted connection.
    pub upstream_addr: String,
    /// Maximum bytes read in one I/O operation.
    pub chunk_size: usize,
    /// Run on every chunk in both directions.
    pub inspector: Arc<dyn ChunkInspector>,
    /// Session log plus verbosity.
    pub logger: SessionLogger,
    /// Called once per accepted connection for the session id.
    pub session_ids: SessionIdSource,
}

/// Source of inbound client connections for [`Relay::serve`].
pub trait Acceptor: Send + Sync {
    /// Wait for the next client connection.
    fn accept(
        &self,
    ) -> Pin<Box<dyn Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send + '_>>;
}

impl Acceptor for TcpListener {
    fn accept(
        &self,
    ) -> Pin<Box<dyn Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send + '_>> {
        Box::pin(TcpListener::accept(self))
    }
}

/// The relay server.
///
/// Accepts client connections and hands each one to its own Tokio task,
/// which dials the upstream and runs the two pumps. There is no admission
/// control: every accepted connection gets a session.
pub struct Relay {
    config: Arc<RelayConfig>,
}

impl Relay {
    /// Wrap `config` for sharing with every session task.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Bind the listening socket. Failure here is fatal to the caller.
    pub async fn bind(&self) -> io::Result<TcpListener> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!(
            %local_addr,
            upstream = %self.config.upstream_addr,
            "relay listening"
        );
        self.config
            .logger
            .log(
                LogRecord::info(
                    EventKind::Listening,
                    format!(
                        "listening on {local_addr}, sending to {}",
                        self.config.upstream_addr
                    ),
                )
                .with_details(serde_json::json!({
                    "local_addr": local_addr.to_string(),
                    "upstream_addr": self.config.upstream_addr,
                })),
            )
            .await;

        Ok(listener)
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Accept errors are logged and the loop continues. Sessions already
    /// running are left alone when the loop stops.
    pub async fn serve<A, F>(&self, listener: A, shutdown: F)
    where
        A: Acceptor,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("relay stopped accepting connections");
                    return;
                }
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, client_addr)) => {
                    let config = Arc::clone(&self.config);
                    tokio::spawn(handle_connection(stream, client_addr, config));
                }
                Err(err) => {
                    tracing::warn!(%err, "accept failed");
                    self.config
                        .logger
                        .log(LogRecord::error(
                            EventKind::AcceptFailed,
                            format!("accept failed: {err}"),
                        ))
                        .await;
                }
            }
        }
    }
}
