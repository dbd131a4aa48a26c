use crate::record::{LogLevel, LogRecord};
use crate::sink::LogSink;

/// Session log handle carrying the verbosity setting.
///
/// Built once at startup and cloned into every relay task, so the verbosity
/// flag is explicit configuration rather than process-wide state.
#[derive(Clone)]
pub struct SessionLogger {
    sink: LogSink,
    verbose: bool,
}

impl SessionLogger {
    /// Wrap `sink`; `verbose` decides whether debug records are kept.
    pub fn new(sink: LogSink, verbose: bool) -> Self {
        Self { sink, verbose }
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Submit a record. Debug records are discarded unless verbose.
    pub async fn log(&self, record: LogRecord) {
        if record.level == LogLevel::Debug && !self.verbose {
            return;
        }
        self.sink.log(record).await;
    }

    /// Wait until every record submitted so far is on disk.
    pub async fn flush(&self) {
        self.sink.flush().await;
    }
}
