use std::fmt;
use std::net::SocketAddr;

use smtp_inspect::{LineInspector, Observation};

use crate::session_id::SessionId;

/// Which way a pump moves bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client -> upstream server
    ClientToUpstream,
    /// Upstream server -> client
    UpstreamToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientToUpstream => write!(f, "client -> upstream"),
            Self::UpstreamToClient => write!(f, "upstream -> client"),
        }
    }
}

/// Read-only per-session metadata shared by both pumps.
#[derive(Debug)]
pub struct SessionContext {
    pub session_id: SessionId,
    /// The TCP address of the connecting client.
    pub client_addr: SocketAddr,
    /// The address the upstream connection was established to.
    pub upstream_addr: SocketAddr,
}

/// Observation-only hook run on every forwarded chunk.
///
/// Inspectors cannot alter, hold back or reject bytes; the pump forwards the
/// chunk unchanged whatever they return. They must not perform I/O.
pub trait ChunkInspector: Send + Sync {
    fn inspect(&self, chunk: &[u8], direction: Direction) -> Option<Observation>;
}

impl ChunkInspector for LineInspector {
    fn inspect(&self, chunk: &[u8], _direction: Direction) -> Option<Observation> {
        LineInspector::inspect(self, chunk)
    }
}
