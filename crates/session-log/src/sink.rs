use std::path::Path;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::record::LogRecord;
use crate::writer::{LogWriter, SessionLogError};

/// Channel buffer size between producers and the background writer task.
const CHANNEL_BUFFER: usize = 1024;

/// Flush the writer after this many seconds of channel inactivity.
const FLUSH_INTERVAL_SECS: u64 = 1;

enum SinkCommand {
    Record(LogRecord),
    Flush(oneshot::Sender<()>),
}

/// A cheap, cloneable handle for submitting [`LogRecord`] values to the
/// background log writer.
///
/// Every relay task holds a clone. Records are serialised by a single writer,
/// so concurrent producers can never interleave partial lines.
#[derive(Clone)]
pub struct LogSink {
    tx: mpsc::Sender<SinkCommand>,
}

impl LogSink {
    /// Open the log file at `path` and spawn the background writer task.
    ///
    /// Opening happens before the task is spawned, so an unwritable
    /// destination is reported here rather than lost in the background.
    /// The task exits after a final flush once every `LogSink` clone has been
    /// dropped.
    pub async fn start(
        path: impl AsRef<Path>,
    ) -> Result<(Self, JoinHandle<()>), SessionLogError> {
        let (tx, rx) = mpsc::channel::<SinkCommand>(CHANNEL_BUFFER);

        let mut writer = LogWriter::new(path).await?;

        let handle = tokio::spawn(async move {
            run_writer_loop(&mut writer, rx).await;
        });

        Ok((Self { tx }, handle))
    }

    /// Queue a record for writing.
    ///
    /// Waits if the channel is full. If the writer task is gone the record is
    /// dropped with a warning.
    pub async fn log(&self, record: LogRecord) {
        if let Err(err) = self.tx.send(SinkCommand::Record(record)).await {
            if let SinkCommand::Record(record) = err.0 {
                tracing::warn!(
                    event = ?record.event,
                    "session log channel closed; record dropped"
                );
            }
        }
    }

    /// Wait until every record queued before this call has been written and
    /// the file flushed.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(SinkCommand::Flush(ack_tx)).await.is_err() {
            return;
        }
        let _ = ack_rx.await;
    }
}

async fn run_writer_loop(writer: &mut LogWriter, mut rx: mpsc::Receiver<SinkCommand>) {
    let flush_interval = tokio::time::Duration::from_secs(FLUSH_INTERVAL_SECS);
    let mut dirty = false;

    loop {
        let next = tokio::time::timeout(flush_interval, rx.recv()).await;

        match next {
            Ok(Some(SinkCommand::Record(record))) => {
                if let Err(err) = writer.write(&record).await {
                    tracing::error!(%err, "failed to write session log record");
                } else {
                    dirty = true;
                }
            }
            Ok(Some(SinkCommand::Flush(ack))) => {
                if let Err(err) = writer.flush().await {
                    tracing::error!(%err, "session log flush failed");
                } else {
                    dirty = false;
                }
                let _ = ack.send(());
            }
            // Every sender is gone.
            Ok(None) => {
                if dirty {
                    if let Err(err) = writer.flush().await {
                        tracing::error!(%err, "failed to flush session log on shutdown");
                    }
                }
                tracing::debug!("session log writer shutting down");
                return;
            }
            // Idle.
            Err(_) => {
                if dirty {
                    if let Err(err) = writer.flush().await {
                        tracing::error!(%err, "periodic session log flush failed");
                    } else {
                        dirty = false;
                    }
                }
            }
        }
    }
}
