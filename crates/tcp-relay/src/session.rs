//! Session establishment: id generation, upstream dial, and the two pumps.

use std::net::SocketAddr;
use std::sync::Arc;

use session_log::{EventKind, LogRecord};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::listener::RelayConfig;
use crate::pump::{Pump, PumpEnd, PumpReport};
use crate::relay::{Direction, SessionContext};
use crate::session_id::SessionIdError;

/// Failures that abort a single session before any byte is relayed.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unable to generate session id: {0}")]
    SessionId(#[from] SessionIdError),

    #[error("error dialing upstream {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Open the upstream connection for one session. No retry.
pub async fn dial_upstream(addr: &str) -> Result<TcpStream, SessionError> {
    TcpStream::connect(addr)
        .await
        .map_err(|source| SessionError::Dial {
            addr: addr.to_string(),
            source,
        })
}

/// Handle one accepted client connection from establishment to teardown.
///
/// Any establishment failure drops (closes) the client connection and is
/// logged; nothing here can affect another session.
pub async fn handle_connection(
    client: TcpStream,
    client_addr: SocketAddr,
    config: Arc<RelayConfig>,
) {
    let session_id = match (config.session_ids)() {
        Ok(id) => id,
        Err(err) => {
            let err = SessionError::from(err);
            tracing::error!(%client_addr, %err, "session aborted");
            config
                .logger
                .log(
                    LogRecord::error(
                        EventKind::SessionAborted,
                        format!("unable to start session for {client_addr}: {err}"),
                    )
                    .with_details(serde_json::json!({ "client_addr": client_addr.to_string() })),
                )
                .await;
            return;
        }
    };

    tracing::info!(%session_id, %client_addr, "new connection");
    config
        .logger
        .log(
            LogRecord::info(
                EventKind::SessionOpened,
                format!("new connection from {client_addr}"),
            )
            .with_session(session_id.as_str())
            .with_details(serde_json::json!({ "client_addr": client_addr.to_string() })),
        )
        .await;

    let upstream = match dial_upstream(&config.upstream_addr).await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::warn!(%session_id, %err, "session aborted");
            config
                .logger
                .log(
                    LogRecord::error(EventKind::SessionAborted, err.to_string())
                        .with_session(session_id.as_str()),
                )
                .await;
            return;
        }
    };

    let upstream_addr = match upstream.peer_addr() {
        Ok(addr) => addr,
        Err(err) => {
            tracing::warn!(%session_id, %err, "upstream connection lost before relay start");
            config
                .logger
                .log(
                    LogRecord::error(
                        EventKind::SessionAborted,
                        format!("upstream connection lost before relay start: {err}"),
                    )
                    .with_session(session_id.as_str()),
                )
                .await;
            return;
        }
    };

    tracing::debug!(%session_id, %upstream_addr, "upstream connected");
    config
        .logger
        .log(
            LogRecord::info(
                EventKind::UpstreamConnected,
                format!("established server connection to {upstream_addr}"),
            )
            .with_session(session_id.as_str())
            .with_details(serde_json::json!({ "upstream_addr": upstream_addr.to_string() })),
        )
        .await;

    let ctx = Arc::new(SessionContext {
        session_id,
        client_addr,
        upstream_addr,
    });
    relay_session(client, upstream, ctx, config).await;
}

/// Run both pumps of an established session and wait for them to finish.
///
/// Two independent pumps are required: SMTP peers may send at any time, and
/// a single alternating loop would stall whenever the side it is not reading
/// from speaks first.
pub async fn relay_session(
    client: TcpStream,
    upstream: TcpStream,
    ctx: Arc<SessionContext>,
    config: Arc<RelayConfig>,
) {
    let closer = CancellationToken::new();
    let (client_read, client_write) = client.into_split();
    let (upstream_read, upstream_write) = upstream.into_split();

    let make_pump = |direction| Pump {
        direction,
        ctx: Arc::clone(&ctx),
        inspector: Arc::clone(&config.inspector),
        logger: config.logger.clone(),
        closer: closer.clone(),
        chunk_size: config.chunk_size,
    };

    let up_task = tokio::spawn(
        make_pump(Direction::ClientToUpstream).run(client_read, upstream_write),
    );
    let down_task = tokio::spawn(
        make_pump(Direction::UpstreamToClient).run(upstream_read, client_write),
    );

    let (up, down) = tokio::join!(up_task, down_task);
    let up = report_or_lost(up, Direction::ClientToUpstream, &ctx);
    let down = report_or_lost(down, Direction::UpstreamToClient, &ctx);

    tracing::info!(
        session_id = %ctx.session_id,
        client_addr = %ctx.client_addr,
        upstream_addr = %ctx.upstream_addr,
        bytes_up = up.bytes,
        bytes_down = down.bytes,
        "session closed"
    );
    config
        .logger
        .log(
            LogRecord::info(EventKind::SessionClosed, "session closed")
                .with_session(ctx.session_id.as_str())
                .with_details(serde_json::json!({
                    "clean": !up.end.is_error() && !down.end.is_error(),
                    "client_addr": ctx.client_addr.to_string(),
                    "upstream_addr": ctx.upstream_addr.to_string(),
                    "client_to_upstream_bytes": up.bytes,
                    "upstream_to_client_bytes": down.bytes,
                    "client_to_upstream_end": format!("{:?}", up.end),
                    "upstream_to_client_end": format!("{:?}", down.end),
                })),
        )
        .await;
}

/// Substitute an empty report when a pump task did not return one.
fn report_or_lost(
    joined: Result<PumpReport, tokio::task::JoinError>,
    direction: Direction,
    ctx: &SessionContext,
) -> PumpReport {
    match joined {
        Ok(report) => report,
        // Only reachable if the runtime is shutting down.
        Err(err) => {
            tracing::debug!(session_id = %ctx.session_id, %direction, %err, "pump task lost");
            PumpReport {
                direction,
                bytes: 0,
                end: PumpEnd::Closed,
            }
        }
    }
}
