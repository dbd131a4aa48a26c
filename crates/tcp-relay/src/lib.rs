//! Transparent TCP relay with SMTP command logging.
//!
//! Every accepted client connection is paired with a fresh connection to a
//! fixed upstream. Two pumps per session copy bytes unmodified in each
//! direction while a [`ChunkInspector`] observes the traffic for logging.
//!
//! # Architecture
//!
//! ```text
//! Client  <--TCP-->  tcp-relay  <--TCP-->  Upstream MTA
//!                       |
//!                 [LineInspector]
//!                       |
//!                 [Session log]
//! ```
//!
//! When either pump stops (end of stream, I/O error, or a caught panic) it
//! closes the whole session, which makes the paired pump stop as well.
//! Nothing a session does can stop the listener or another session.

pub mod dump;
pub mod listener;
pub mod pump;
pub mod relay;
pub mod session;
pub mod session_id;

pub use listener::{Acceptor, Relay, RelayConfig, DEFAULT_CHUNK_SIZE};
pub use pump::{Pump, PumpEnd, PumpReport};
pub use relay::{ChunkInspector, Direction, SessionContext};
pub use session::SessionError;
pub use session_id::{SessionId, SessionIdError, SessionIdSource};
