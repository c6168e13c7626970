//! In-memory sessions and arenas for unit tests.

use crate::arena::{Arena, ArenaState};
use crate::error::TransportError;
use crate::registry::ClientRegistry;
use crate::session::{ClientId, Session};
use bytes::Bytes;
use std::sync::{Arc, Mutex};

/// Ordered record of collaborator calls shared between mocks.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub struct MockSession {
    id: ClientId,
    ip: String,
    log: EventLog,
    sent: Arc<Mutex<Vec<Bytes>>>,
    broken: bool,
}

impl MockSession {
    pub fn new(id: u32, ip: &str, log: &EventLog) -> Self {
        Self {
            id: ClientId(id),
            ip: ip.to_string(),
            log: Arc::clone(log),
            sent: Arc::new(Mutex::new(Vec::new())),
            broken: false,
        }
    }

    /// A session whose transport refuses every send.
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    pub fn sent(&self) -> Arc<Mutex<Vec<Bytes>>> {
        Arc::clone(&self.sent)
    }

    pub fn boxed(self) -> Box<dyn Session> {
        Box::new(self)
    }
}

impl Session for MockSession {
    fn id(&self) -> ClientId {
        self.id
    }

    fn ip(&self) -> &str {
        &self.ip
    }

    fn send(&self, data: Bytes) -> Result<(), TransportError> {
        if self.broken {
            return Err(TransportError::Closed);
        }
        self.sent.lock().unwrap().push(data);
        Ok(())
    }

    fn receive(&mut self, data: Bytes) {
        self.log
            .lock()
            .unwrap()
            .push(format!("recv:{}:{}", self.id, data.len()));
    }

    fn tick(&mut self, tick: u64) {
        self.log
            .lock()
            .unwrap()
            .push(format!("tick:{}:{}", self.id, tick));
    }

    fn terminate(&mut self) {
        self.log
            .lock()
            .unwrap()
            .push(format!("terminate:{}", self.id));
    }
}

/// Arena whose readiness is controlled by the test through a shared cell.
pub struct MockArena {
    pub state: Arc<Mutex<ArenaState>>,
    log: EventLog,
}

impl MockArena {
    pub fn new(state: &Arc<Mutex<ArenaState>>, log: &EventLog) -> Self {
        Self {
            state: Arc::clone(state),
            log: Arc::clone(log),
        }
    }
}

impl Arena for MockArena {
    fn name(&self) -> &str {
        "mock"
    }

    fn state(&self) -> ArenaState {
        *self.state.lock().unwrap()
    }

    fn advance(&mut self, tick: u64, clients: &ClientRegistry) {
        self.log
            .lock()
            .unwrap()
            .push(format!("arena:{}:{}", tick, clients.len()));
    }
}
