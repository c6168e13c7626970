//! The arena seam and the bundled round-based arena.
//!
//! The instance treats the arena as an opaque simulation: it asks whether new
//! sessions may join and advances it once per tick before any session. A fresh
//! arena is built from an [`ArenaFactory`] on every (re)start.

use crate::gamemode::Gamemode;
use crate::registry::ClientRegistry;
use log::info;
use shared::ClientBound;

/// Ticks an arena stays in [`ArenaState::Closing`] before it reports closed.
pub const CLOSING_GRACE_TICKS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaState {
    /// Accepting new sessions
    Open,
    /// The round was decided
    Over,
    /// No new sessions; the round is winding down
    Closing,
    /// Finished; the instance restarts with a new arena
    Closed,
}

pub trait Arena: Send {
    fn name(&self) -> &str;

    fn state(&self) -> ArenaState;

    /// Advances the simulation to `tick`. The arena may broadcast gameplay
    /// updates to `clients`.
    fn advance(&mut self, tick: u64, clients: &ClientRegistry);
}

pub type ArenaFactory = Box<dyn Fn() -> Box<dyn Arena> + Send>;

/// Arena that stays open for a fixed number of ticks, then closes.
pub struct RoundArena {
    gamemode: Gamemode,
    state: ArenaState,
    round_ticks: Option<u64>,
    closing_since: Option<u64>,
}

impl RoundArena {
    pub fn new(gamemode: Gamemode, round_ticks: Option<u64>) -> Self {
        Self {
            gamemode,
            state: ArenaState::Open,
            round_ticks,
            closing_since: None,
        }
    }

    fn notify(clients: &ClientRegistry, message: &str) {
        let mut stream = clients.broadcast();
        stream.u8(ClientBound::Notification as u8).string_nt(message);
        stream.send();
    }
}

impl Arena for RoundArena {
    fn name(&self) -> &str {
        self.gamemode.display_name()
    }

    fn state(&self) -> ArenaState {
        self.state
    }

    fn advance(&mut self, tick: u64, clients: &ClientRegistry) {
        match self.state {
            ArenaState::Open => {
                if self.round_ticks.is_some_and(|limit| tick >= limit) {
                    info!("{} round over at tick {}, closing arena", self.name(), tick);
                    self.state = ArenaState::Closing;
                    self.closing_since = Some(tick);
                    Self::notify(clients, "Arena closed: No players can join");
                }
            }
            ArenaState::Over | ArenaState::Closing => {
                let since = *self.closing_since.get_or_insert(tick);
                if tick - since >= CLOSING_GRACE_TICKS {
                    self.state = ArenaState::Closed;
                }
            }
            ArenaState::Closed => {}
        }
    }
}
