//! One running game instance: arena, sessions, admission state and the tick
//! scheduler, with the start/end/restart lifecycle tying them together.
//!
//! All methods take `&mut self` and run to completion without awaiting, so a
//! tick, an admission and a lifecycle transition can never interleave. The
//! only async method is [`GameInstance::wait_for_tick`], which holds no state
//! across its suspension point.

use crate::admission::{AdmissionPolicy, ConnectionRequest, IpCache};
use crate::arena::{Arena, ArenaFactory, ArenaState};
use crate::config::InstanceConfig;
use crate::error::AdmissionError;
use crate::registry::{ClientRegistry, PlayerCounter};
use crate::scheduler::TickScheduler;
use crate::session::{ClientId, Session};
use bytes::Bytes;
use log::{debug, info, warn};

/// What a scheduler firing did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No sessions registered; nothing ran
    Idle,
    /// The arena and every session advanced to this tick
    Advanced(u64),
    /// The arena closed, or was left winding down with nobody in it, so the
    /// instance restarted
    Restarted,
}

pub struct GameInstance {
    config: InstanceConfig,
    policy: AdmissionPolicy,
    arena_factory: ArenaFactory,
    arena: Option<Box<dyn Arena>>,
    clients: ClientRegistry,
    ip_cache: IpCache,
    scheduler: TickScheduler,
    running: bool,
    players_on_map: bool,
    tick: u64,
}

impl GameInstance {
    /// Creates a stopped instance. Call [`start`](Self::start) to open it.
    pub fn new(config: InstanceConfig, counter: PlayerCounter, arena_factory: ArenaFactory) -> Self {
        Self {
            config,
            policy: AdmissionPolicy::new(config.connection_limit, config.mode),
            arena_factory,
            arena: None,
            clients: ClientRegistry::new(counter),
            ip_cache: IpCache::new(),
            scheduler: TickScheduler::new(config.tick_period),
            running: false,
            players_on_map: false,
            tick: 0,
        }
    }

    /// Boots a fresh arena and arms the tick scheduler. No-op while running.
    pub fn start(&mut self) {
        if self.running {
            return;
        }

        info!("New game instance booting up");

        let arena = (self.arena_factory)();
        info!("Hosting {} arena", arena.name());
        self.arena = Some(arena);

        self.tick = 0;
        self.scheduler.arm();

        self.running = true;
        self.players_on_map = true;
    }

    /// Stops the instance: disarms the scheduler, terminates and drops every
    /// session, and forgets all admission state. Starts again if `restart`.
    pub fn end(&mut self, restart: bool) {
        info!(
            "{} Game Instance.",
            if restart { "Restarting" } else { "Ending" }
        );

        self.scheduler.disarm();

        for session in self.clients.iter_mut() {
            session.terminate();
        }
        self.clients.clear();
        self.ip_cache.clear();

        self.running = false;
        self.players_on_map = false;

        if restart {
            self.start();
        }
    }

    /// Decides whether a connection may join and registers its session if so.
    ///
    /// `make_session` is only called once the connection is admitted, with
    /// the IP the session is accounted under. On any error nothing about the
    /// instance has changed and the caller closes the transport.
    pub fn admit<F>(
        &mut self,
        request: &ConnectionRequest,
        make_session: F,
    ) -> Result<ClientId, AdmissionError>
    where
        F: FnOnce(String) -> Box<dyn Session>,
    {
        debug!("Incoming client");

        if !self.is_open() {
            warn!("Arena is not open: Closing client");
            return Err(AdmissionError::ArenaNotOpen);
        }

        let ip = self.policy.check(request, &self.ip_cache).map_err(|e| {
            warn!("Rejecting client: {}", e);
            e
        })?;

        let session = make_session(ip.clone());
        let id = session.id();
        if self.clients.contains(id) {
            warn!("Rejecting client: session {} already registered", id);
            return Err(crate::error::RegistryError::DuplicateSession(id).into());
        }

        self.ip_cache.acquire(&ip);
        self.clients.insert(session)?;
        Ok(id)
    }

    /// Removes a session whose transport went away. Unknown ids are ignored.
    pub fn disconnect(&mut self, id: ClientId) -> bool {
        match self.clients.remove(id) {
            Some(session) => {
                self.ip_cache.release(session.ip());
                true
            }
            None => false,
        }
    }

    /// Routes an inbound packet to its session; it is processed on the next tick.
    pub fn receive(&mut self, id: ClientId, data: Bytes) {
        match self.clients.get_mut(id) {
            Some(session) => session.receive(data),
            None => debug!("Dropping packet from unregistered client {}", id),
        }
    }

    /// Bans `ip` for the rest of this instance and drops its sessions.
    /// Returns how many sessions were terminated.
    pub fn ban_ip(&mut self, ip: &str) -> usize {
        self.ip_cache.ban(ip);
        let ids = self.clients.ids_from(ip);
        for id in &ids {
            if let Some(mut session) = self.clients.remove(*id) {
                session.terminate();
            }
        }
        warn!("Banned {} ({} sessions terminated)", ip, ids.len());
        ids.len()
    }

    /// Resolves at the next scheduler firing. Pending forever while stopped.
    pub async fn wait_for_tick(&mut self) {
        self.scheduler.wait().await
    }

    /// Handles one scheduler firing.
    pub fn on_timer(&mut self) -> TickOutcome {
        if self.clients.is_empty() {
            // A round that closed with nobody left to tick it down would
            // never reach Closed, so start over right away
            if self.arena_state().is_some_and(|state| state != ArenaState::Open) {
                self.end(true);
                return TickOutcome::Restarted;
            }
            return TickOutcome::Idle;
        }

        self.tick += 1;
        let tick = self.tick;

        if let Some(arena) = self.arena.as_mut() {
            arena.advance(tick, &self.clients);
        }
        for session in self.clients.iter_mut() {
            session.tick(tick);
        }

        if self.arena_state() == Some(ArenaState::Closed) {
            self.end(true);
            return TickOutcome::Restarted;
        }
        TickOutcome::Advanced(tick)
    }

    /// Whether new sessions may join right now.
    pub fn is_open(&self) -> bool {
        self.running && self.arena_state() == Some(ArenaState::Open)
    }

    pub fn arena_state(&self) -> Option<ArenaState> {
        self.arena.as_ref().map(|arena| arena.state())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn players_on_map(&self) -> bool {
        self.players_on_map
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn ip_cache(&self) -> &IpCache {
        &self.ip_cache
    }

    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }
}
