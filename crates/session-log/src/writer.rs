use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::record::LogRecord;

/// Errors that can occur during session log I/O.
#[derive(Debug, thiserror::Error)]
pub enum SessionLogError {
    #[error("failed to create log directory: {0}")]
    CreateDir(std::io::Error),

    #[error("failed to open log file for writing: {0}")]
    OpenFile(std::io::Error),

    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write to log file: {0}")]
    Write(std::io::Error),

    #[error("failed to flush log file: {0}")]
    Flush(std::io::Error),
}

/// Append-only file writer producing one JSON line per [`LogRecord`].
pub struct LogWriter {
    file: tokio::fs::File,
}

impl LogWriter {
    /// Open (or create) the log file at `path` in append mode.
    ///
    /// Missing parent directories are created. On Unix the file is created
    /// with mode `0600` since it records mail envelope addresses.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, SessionLogError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(SessionLogError::CreateDir)?;
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        options.mode(0o600);

        let file = options
            .open(path)
            .await
            .map_err(SessionLogError::OpenFile)?;

        Ok(Self { file })
    }

    /// Serialise `record` as a single line and append it in one write.
    pub async fn write(&mut self, record: &LogRecord) -> Result<(), SessionLogError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        self.file
            .write_all(&line)
            .await
            .map_err(SessionLogError::Write)?;

        Ok(())
    }

    /// Flush buffered bytes to the file.
    pub async fn flush(&mut self) -> Result<(), SessionLogError> {
        self.file.flush().await.map_err(SessionLogError::Flush)
    }
}
