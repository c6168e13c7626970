use crate::error::TransportError;
use crate::session::{ClientId, Outbound, Session};
use bytes::Bytes;
use log::{debug, info};
use shared::{ClientBound, ServerBound, Writer};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

// Inbound packets beyond this are dropped until the next tick drains the queue
const MAX_PENDING_PACKETS: usize = 256;

/// Capacity of the queue between the game loop and a connection's socket task.
/// Sends to a peer whose queue is full fail with [`TransportError::Backlogged`].
pub const OUTBOUND_QUEUE_SIZE: usize = 128;

/// A WebSocket peer admitted into a game instance.
#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    pub ip: String,
    pub addr: SocketAddr,
    pub connected_at: Instant,
    pub last_seen: Instant,
    pub last_tick: u64,
    pub pending_packets: VecDeque<Bytes>,
    outbound: Option<mpsc::Sender<Outbound>>,
    terminated: bool,
}

impl Client {
    pub fn new(
        id: ClientId,
        ip: String,
        addr: SocketAddr,
        outbound: mpsc::Sender<Outbound>,
    ) -> Self {
        let now = Instant::now();
        Client {
            id,
            ip,
            addr,
            connected_at: now,
            last_seen: now,
            last_tick: 0,
            pending_packets: VecDeque::new(),
            outbound: Some(outbound),
            terminated: false,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    fn handle_packet(&mut self, packet: &[u8]) {
        let Some(&opcode) = packet.first() else {
            return;
        };

        match ServerBound::from_u8(opcode) {
            Some(ServerBound::Ping) => {
                let mut writer = Writer::new();
                writer.u8(ClientBound::Ping as u8);
                // A closed transport is picked up by the socket task.
                let _ = self.send(writer.finish());
            }
            None => debug!("Client {} sent unhandled opcode {:#04x}", self.id, opcode),
        }
    }
}

impl Session for Client {
    fn id(&self) -> ClientId {
        self.id
    }

    fn ip(&self) -> &str {
        &self.ip
    }

    fn send(&self, data: Bytes) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        outbound
            .try_send(Outbound::Frame(data))
            .map_err(|e| match e {
                TrySendError::Full(_) => TransportError::Backlogged,
                TrySendError::Closed(_) => TransportError::Closed,
            })
    }

    fn receive(&mut self, data: Bytes) {
        self.last_seen = Instant::now();
        if self.pending_packets.len() >= MAX_PENDING_PACKETS {
            debug!("Client {} inbound queue full, dropping packet", self.id);
            return;
        }
        self.pending_packets.push_back(data);
    }

    fn tick(&mut self, tick: u64) {
        self.last_tick = tick;
        while let Some(packet) = self.pending_packets.pop_front() {
            self.handle_packet(&packet);
        }
    }

    fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        self.pending_packets.clear();
        info!(
            "Terminating client {} ({}) after {:.1}s",
            self.id,
            self.ip,
            self.connected_at.elapsed().as_secs_f32()
        );
        // With a full queue the command cannot be queued; dropping the sender
        // still ends the socket task once it drains what is already queued
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.try_send(Outbound::Terminate);
        }
    }
}
