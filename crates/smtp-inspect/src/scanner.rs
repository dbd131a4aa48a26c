//! Byte-level scanner matching a chunk against the command catalogue.

use regex::bytes::{Regex, RegexSet};
use serde::{Deserialize, Serialize};

use crate::commands::{SmtpCommand, COMMANDS};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while constructing a [`Scanner`].
#[derive(Debug, thiserror::Error)]
pub enum InspectorError {
    #[error("failed to compile command pattern: {0}")]
    RegexCompile(#[from] regex::Error),
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// A recognised command and its argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub command: SmtpCommand,
    /// Text following the prefix up to the end of the first line. Invalid
    /// UTF-8 is replaced lossily.
    pub value: String,
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// Compiled scanner: a [`RegexSet`] to find which command matched, plus the
/// individual regexes (same order as [`COMMANDS`]) for capture extraction.
pub struct Scanner {
    regex_set: RegexSet,
    individual: Vec<Regex>,
}

impl Scanner {
    /// Compile every pattern in [`COMMANDS`].
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::RegexCompile`] if a pattern is invalid.
    pub fn new() -> Result<Self, InspectorError> {
        let pattern_strings: Vec<&str> = COMMANDS.iter().map(|c| c.pattern).collect();

        let regex_set = RegexSet::new(&pattern_strings)?;
        let individual = pattern_strings
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            regex_set,
            individual,
        })
    }

    /// Match `chunk` against the catalogue.
    ///
    /// All patterns are anchored at offset zero, so at most one can match.
    pub fn scan(&self, chunk: &[u8]) -> Option<Observation> {
        let idx = self.regex_set.matches(chunk).into_iter().next()?;
        let captures = self.individual[idx].captures(chunk)?;
        let value = captures.get(1).map(|m| m.as_bytes()).unwrap_or_default();

        Some(Observation {
            command: COMMANDS[idx].command,
            value: String::from_utf8_lossy(value).into_owned(),
        })
    }
}
