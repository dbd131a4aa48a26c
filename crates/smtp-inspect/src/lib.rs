//! # smtp-inspect
//!
//! Observation-only recognition of SMTP envelope commands in forwarded
//! chunks.
//!
//! The crate is organised in three layers:
//!
//! 1. **[`commands`]** -- static catalogue of the recognised command prefixes.
//! 2. **[`scanner`]** -- compiles the catalogue into a byte-oriented
//!    [`RegexSet`](regex::bytes::RegexSet) anchored at the chunk start.
//! 3. **[`inspector`]** -- the [`LineInspector`] used by the relay pumps.
//!
//! Inspection never alters the chunk and never fails on binary or malformed
//! input. Commands split across two reads are not reassembled.
//!
//! ## Quick start
//!
//! ```rust
//! use smtp_inspect::{LineInspector, SmtpCommand};
//!
//! let inspector = LineInspector::new().unwrap();
//! let seen = inspector.inspect(b"MAIL FROM:<a@example.com>\r\n").unwrap();
//! assert_eq!(seen.command, SmtpCommand::MailFrom);
//! assert_eq!(seen.value, "<a@example.com>");
//! ```

pub mod commands;
pub mod inspector;
pub mod scanner;

pub use commands::{CommandPattern, SmtpCommand, COMMANDS};
pub use inspector::LineInspector;
pub use scanner::{InspectorError, Observation, Scanner};
