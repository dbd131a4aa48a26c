//! One-directional relay pump.
//!
//! A pump reads a chunk from its source, shows it to the inspector, and
//! writes it verbatim to its sink, until end of stream, an I/O error, a
//! panic, or the paired pump closing the session. Every exit path cancels the
//! session's close token so the paired pump stops too, and drops both socket
//! halves it owns.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use session_log::{EventKind, LogRecord, SessionLogger};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::dump::hex_dump;
use crate::relay::{ChunkInspector, Direction, SessionContext};

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Why a pump stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpEnd {
    /// The source reached end of stream.
    Eof,
    /// The paired pump terminated first and closed the session.
    Closed,
    ReadFailed(String),
    WriteFailed(String),
    /// A panic was caught at the pump boundary.
    Panicked(String),
}

impl PumpEnd {
    /// Whether this end is an error worth an error-level record.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::ReadFailed(_) | Self::WriteFailed(_) | Self::Panicked(_)
        )
    }
}

/// Result of a finished pump.
#[derive(Debug, Clone)]
pub struct PumpReport {
    pub direction: Direction,
    /// Bytes fully written to the sink.
    pub bytes: u64,
    pub end: PumpEnd,
}

// ---------------------------------------------------------------------------
// Pump
// ---------------------------------------------------------------------------

/// Everything a pump needs besides its two socket halves.
pub struct Pump {
    pub direction: Direction,
    pub ctx: Arc<SessionContext>,
    pub inspector: Arc<dyn ChunkInspector>,
    pub logger: SessionLogger,
    /// Cancelled when either pump of the session exits.
    pub closer: CancellationToken,
    pub chunk_size: usize,
}

impl Pump {
    /// Run the pump to completion.
    ///
    /// Never panics and never returns early without closing the session:
    /// the close token is cancelled by a drop guard, and both halves are
    /// dropped before this returns.
    pub async fn run<R, W>(self, source: R, sink: W) -> PumpReport
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let _close_session = self.closer.clone().drop_guard();
        let mut bytes = 0u64;

        let outcome = AssertUnwindSafe(self.pump(source, sink, &mut bytes))
            .catch_unwind()
            .await;

        let end = match outcome {
            Ok(end) => end,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                tracing::error!(
                    session_id = %self.ctx.session_id,
                    direction = %self.direction,
                    %reason,
                    "recovered from panic in relay pump"
                );
                self.logger
                    .log(
                        LogRecord::error(
                            EventKind::PumpPanicked,
                            format!("recovered from panic: {reason}"),
                        )
                        .with_session(self.ctx.session_id.as_str())
                        .with_direction(self.direction),
                    )
                    .await;
                PumpEnd::Panicked(reason)
            }
        };

        tracing::debug!(
            session_id = %self.ctx.session_id,
            direction = %self.direction,
            bytes,
            ?end,
            "relay pump finished"
        );
        self.logger
            .log(
                LogRecord::debug(EventKind::PumpClosed, "closing both connections")
                    .with_session(self.ctx.session_id.as_str())
                    .with_direction(self.direction)
                    .with_details(serde_json::json!({
                        "bytes": bytes,
                        "end": format!("{end:?}"),
                    })),
            )
            .await;

        PumpReport {
            direction: self.direction,
            bytes,
            end,
        }
    }

    async fn pump<R, W>(&self, mut source: R, mut sink: W, bytes: &mut u64) -> PumpEnd
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; self.chunk_size];

        loop {
            let started = Instant::now();
            let read = tokio::select! {
                biased;
                _ = self.closer.cancelled() => return PumpEnd::Closed,
                read = source.read(&mut buf) => read,
            };

            let n = match read {
                Ok(0) => return PumpEnd::Eof,
                Ok(n) => n,
                Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return PumpEnd::Eof;
                }
                Err(err) => {
                    self.log_stream_error(EventKind::ReadFailed, "read", &err)
                        .await;
                    return PumpEnd::ReadFailed(err.to_string());
                }
            };
            let chunk = &buf[..n];

            if self.logger.verbose() {
                self.log_timing("read", started).await;
                self.logger
                    .log(
                        self.record(LogRecord::debug(
                            EventKind::ChunkDump,
                            format!("received {n} bytes\n{}", hex_dump(chunk)),
                        ))
                        .with_details(serde_json::json!({ "bytes": n })),
                    )
                    .await;
            }

            if let Some(seen) = self.inspector.inspect(chunk, self.direction) {
                tracing::info!(
                    session_id = %self.ctx.session_id,
                    direction = %self.direction,
                    command = %seen.command,
                    value = %seen.value,
                    "smtp command observed"
                );
                self.logger
                    .log(
                        self.record(LogRecord::info(
                            EventKind::CommandObserved,
                            format!("{}: {}", seen.command, seen.value),
                        ))
                        .with_details(serde_json::json!({
                            "command": seen.command,
                            "value": seen.value,
                        })),
                    )
                    .await;
            }

            let started = Instant::now();
            let written = tokio::select! {
                biased;
                _ = self.closer.cancelled() => return PumpEnd::Closed,
                written = sink.write_all(chunk) => written,
            };
            if let Err(err) = written {
                self.log_stream_error(EventKind::WriteFailed, "write", &err)
                    .await;
                return PumpEnd::WriteFailed(err.to_string());
            }
            *bytes += n as u64;

            if self.logger.verbose() {
                self.log_timing("write", started).await;
            }
        }
    }

    fn record(&self, record: LogRecord) -> LogRecord {
        record
            .with_session(self.ctx.session_id.as_str())
            .with_direction(self.direction)
    }

    async fn log_stream_error(&self, event: EventKind, op: &str, err: &std::io::Error) {
        tracing::warn!(
            session_id = %self.ctx.session_id,
            direction = %self.direction,
            %err,
            "{op} failed, closing session"
        );
        self.logger
            .log(self.record(LogRecord::error(event, format!("error {op}: {err}"))))
            .await;
    }

    async fn log_timing(&self, op: &str, started: Instant) {
        let elapsed = started.elapsed();
        self.logger
            .log(
                self.record(LogRecord::debug(
                    EventKind::IoTiming,
                    format!("duration {op} -> {} {elapsed:?}", self.direction),
                ))
                .with_details(serde_json::json!({
                    "op": op,
                    "micros": elapsed.as_micros() as u64,
                })),
            )
            .await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
