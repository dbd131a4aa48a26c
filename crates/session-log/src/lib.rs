//! Append-only JSON Lines session log for smtp-proxy.
//!
//! Every relay event (session lifecycle, observed SMTP commands, stream
//! errors and, in verbose mode, hex dumps and I/O timings) is serialised as a
//! single newline-terminated JSON object and appended to the log file.
//!
//! All producers share one background writer task fed through a bounded
//! channel, so records emitted concurrently by any number of relay tasks are
//! never interleaved mid-line.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use session_log::{EventKind, LogRecord, LogSink, SessionLogger};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (sink, _handle) = LogSink::start("smtp-proxy.log").await?;
//! let logger = SessionLogger::new(sink, false);
//!
//! logger
//!     .log(
//!         LogRecord::info(EventKind::CommandObserved, "MAIL FROM: <a@example.com>")
//!             .with_session("0f3a9c21d4e5b687"),
//!     )
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod logger;
pub mod record;
pub mod sink;
pub mod writer;

pub use logger::SessionLogger;
pub use record::{EventKind, LogLevel, LogRecord};
pub use sink::LogSink;
pub use writer::{LogWriter, SessionLogError};
