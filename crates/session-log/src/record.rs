use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A single session log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: uuid::Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: LogLevel,
    pub event: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl LogRecord {
    /// Create a record with a fresh UUID v4 and the current UTC timestamp.
    /// Session, direction and details start empty.
    pub fn new(level: LogLevel, event: EventKind, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            level,
            event,
            session_id: None,
            direction: None,
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    /// Shorthand for [`LogRecord::new`] at [`LogLevel::Info`].
    pub fn info(event: EventKind, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, event, message)
    }

    /// Shorthand for [`LogRecord::new`] at [`LogLevel::Debug`]. Only written
    /// in verbose mode.
    pub fn debug(event: EventKind, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Debug, event, message)
    }

    /// Shorthand for [`LogRecord::new`] at [`LogLevel::Error`].
    pub fn error(event: EventKind, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, event, message)
    }

    /// Tag the record with the session it belongs to.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Tag the record with the relay direction it was emitted from.
    pub fn with_direction(mut self, direction: impl ToString) -> Self {
        self.direction = Some(direction.to_string());
        self
    }

    /// Attach structured event data.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

// ---------------------------------------------------------------------------
// Level and event kind
// ---------------------------------------------------------------------------

/// Severity of a record. `Debug` records are only written in verbose mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Error,
}

/// The category of event being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ProxyStarted,
    ProxyStopped,
    Listening,
    AcceptFailed,
    SessionOpened,
    SessionAborted,
    UpstreamConnected,
    CommandObserved,
    ReadFailed,
    WriteFailed,
    PumpPanicked,
    PumpClosed,
    ChunkDump,
    IoTiming,
    SessionClosed,
}
