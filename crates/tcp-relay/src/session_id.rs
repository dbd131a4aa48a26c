//! Random session identifiers used to correlate log records.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;

/// Random bytes per identifier; rendered as twice as many hex characters.
pub const SESSION_ID_BYTES: usize = 8;

/// Signature of a session id generator, [`SessionId::generate`] in production.
pub type SessionIdSource = fn() -> Result<SessionId, SessionIdError>;

#[derive(Debug, thiserror::Error)]
pub enum SessionIdError {
    #[error("randomness source unavailable: {0}")]
    Entropy(#[from] rand::Error),
}

/// Opaque session token drawn from the OS CSPRNG.
///
/// Uniqueness is probabilistic; there is no counter or registry behind it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Draw a fresh identifier from the operating system's CSPRNG.
    ///
    /// Fails only when the randomness source is unavailable; the caller
    /// aborts that one session.
    pub fn generate() -> Result<Self, SessionIdError> {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        OsRng.try_fill_bytes(&mut bytes)?;
        Ok(Self::from_bytes(&bytes))
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
