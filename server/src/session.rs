//! The session seam between the orchestrator and connected peers.
//!
//! The instance only ever talks to peers through the [`Session`] trait, so the
//! registry, broadcaster and tick loop can be exercised with in-memory
//! sessions as well as real WebSocket clients.

use crate::error::TransportError;
use bytes::Bytes;
use std::fmt;

/// Identifier of one accepted connection, unique for the lifetime of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commands from the game loop to a connection's socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// One binary frame
    Frame(Bytes),
    /// Close the connection with a policy-violation close frame
    Close(String),
    /// Drop the socket without a closing handshake
    Terminate,
}

/// One admitted peer, owned by the client registry while connected.
pub trait Session: Send {
    fn id(&self) -> ClientId;

    /// Origin IP the session was admitted under.
    fn ip(&self) -> &str;

    /// Queues a serialized packet on the session's transport.
    fn send(&self, data: Bytes) -> Result<(), TransportError>;

    /// Hands an inbound packet to the session. Processing waits for the next tick.
    fn receive(&mut self, data: Bytes);

    /// Per-tick advance, called after the arena has advanced for `tick`.
    fn tick(&mut self, tick: u64);

    /// Forcibly closes the transport.
    fn terminate(&mut self);
}
