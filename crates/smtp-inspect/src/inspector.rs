//! The inspector invoked inline by each relay pump.

use tracing::trace;

use crate::commands::COMMANDS;
use crate::scanner::{InspectorError, Observation, Scanner};

/// Stateless SMTP line inspector.
///
/// Shared read-only by every pump of every session.
pub struct LineInspector {
    scanner: Scanner,
}

impl LineInspector {
    /// Build an inspector over the full command catalogue.
    pub fn new() -> Result<Self, InspectorError> {
        Ok(Self {
            scanner: Scanner::new()?,
        })
    }

    /// Look for a known command at the start of `chunk`.
    ///
    /// Returns `None` for anything unrecognised, including binary data and
    /// commands whose prefix was split across reads.
    pub fn inspect(&self, chunk: &[u8]) -> Option<Observation> {
        // Most chunks are message data; skip the regex engine for them.
        if !COMMANDS
            .iter()
            .any(|c| chunk.starts_with(c.prefix.as_bytes()))
        {
            return None;
        }

        let seen = self.scanner.scan(chunk)?;
        trace!(command = %seen.command, len = chunk.len(), "smtp command recognised");
        Some(seen)
    }
}
