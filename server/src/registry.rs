//! Canonical set of connected sessions and the global player counter
//!
//! The registry is the only place membership changes, and every change is
//! paired with a counter update and a player count broadcast:
//! - `insert` adds one session, bumps the counter, broadcasts
//! - `remove` takes one session out; only an actual removal touches the counter
//! - `clear` drains everything, subtracts the drained count in one step, and
//!   broadcasts once
//!
//! Sessions are kept in insertion order, which is also the order the tick
//! loop advances them in.

use crate::broadcast::{BroadcastStream, DeliveryReport};
use crate::error::RegistryError;
use crate::session::{ClientId, Session};
use log::info;
use shared::ClientBound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Process-wide count of connected players across all instances.
///
/// Cloning shares the same counter. Writes only happen through
/// [`ClientRegistry`] mutations, which keeps it equal to the summed size of
/// every registry holding a clone.
#[derive(Debug, Clone, Default)]
pub struct PlayerCounter(Arc<AtomicUsize>);

impl PlayerCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn increment(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn decrement_by(&self, amount: usize) -> usize {
        self.0.fetch_sub(amount, Ordering::SeqCst) - amount
    }
}

/// The sessions of one game instance.
pub struct ClientRegistry {
    sessions: Vec<Box<dyn Session>>,
    counter: PlayerCounter,
}

impl ClientRegistry {
    pub fn new(counter: PlayerCounter) -> Self {
        Self {
            sessions: Vec::new(),
            counter,
        }
    }

    /// Registers a session and announces the new player count.
    ///
    /// Rejects a session whose id is already registered; the counter and the
    /// existing session are left untouched in that case.
    pub fn insert(&mut self, session: Box<dyn Session>) -> Result<(), RegistryError> {
        let id = session.id();
        if self.contains(id) {
            return Err(RegistryError::DuplicateSession(id));
        }

        info!("Client {} registered from {}", id, session.ip());
        self.sessions.push(session);
        self.counter.increment();
        self.broadcast_player_count();
        Ok(())
    }

    /// Removes a session by id. Absent ids are not an error and cause no broadcast.
    pub fn remove(&mut self, id: ClientId) -> Option<Box<dyn Session>> {
        let index = self.sessions.iter().position(|s| s.id() == id)?;
        let session = self.sessions.remove(index);

        info!("Client {} disconnected", id);
        self.counter.decrement_by(1);
        self.broadcast_player_count();
        Some(session)
    }

    /// Removes every session and returns them in insertion order.
    pub fn clear(&mut self) -> Vec<Box<dyn Session>> {
        self.counter.decrement_by(self.sessions.len());
        self.broadcast_player_count();
        std::mem::take(&mut self.sessions)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.sessions.iter().any(|s| s.id() == id)
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut Box<dyn Session>> {
        self.sessions.iter_mut().find(|s| s.id() == id)
    }

    /// Ids of the sessions admitted under `ip`.
    pub fn ids_from(&self, ip: &str) -> Vec<ClientId> {
        self.sessions
            .iter()
            .filter(|s| s.ip() == ip)
            .map(|s| s.id())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Box<dyn Session>> {
        self.sessions.iter()
    }

    /// Mutable access to the sessions, in insertion order. Membership cannot
    /// change through this iterator.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Session>> {
        self.sessions.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn counter(&self) -> &PlayerCounter {
        &self.counter
    }

    /// Starts a broadcast to every registered session.
    pub fn broadcast(&self) -> BroadcastStream<'_> {
        BroadcastStream::new(&self.sessions)
    }

    /// Sends `[PlayerCount][vu global count]` to every registered session.
    pub fn broadcast_player_count(&self) -> DeliveryReport {
        let mut stream = self.broadcast();
        stream
            .u8(ClientBound::PlayerCount as u8)
            .vu(self.counter.get() as u64);
        stream.send()
    }
}
