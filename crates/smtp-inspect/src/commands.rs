//! Recognised SMTP command prefixes.
//!
//! Matching is case-sensitive and anchored at the first byte of a chunk.
//! The captured group is the rest of the first line, without its terminator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// SMTP commands whose argument is worth logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SmtpCommand {
    /// `MAIL FROM:` -- the envelope sender (RFC 5321 4.1.1.2).
    MailFrom,
    /// `RCPT TO:` -- one envelope recipient (RFC 5321 4.1.1.3).
    RcptTo,
}

impl fmt::Display for SmtpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MailFrom => write!(f, "MAIL FROM"),
            Self::RcptTo => write!(f, "RCPT TO"),
        }
    }
}

/// A single command pattern.
pub struct CommandPattern {
    pub command: SmtpCommand,
    /// The literal prefix as it appears on the wire.
    pub prefix: &'static str,
    /// Byte regex with one capture group for the argument.
    pub pattern: &'static str,
}

pub static COMMANDS: &[CommandPattern] = &[
    CommandPattern {
        command: SmtpCommand::MailFrom,
        prefix: "MAIL FROM:",
        pattern: r"(?-u)\AMAIL FROM:([^\r\n]*)",
    },
    CommandPattern {
        command: SmtpCommand::RcptTo,
        prefix: "RCPT TO:",
        pattern: r"(?-u)\ARCPT TO:([^\r\n]*)",
    },
];
