use crate::arena::{Arena, ArenaFactory, RoundArena};
use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Gamemodes a server can host, keyed by their config name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gamemode {
    Ffa,
    Teams,
    FourTeams,
    Sandbox,
    Domination,
    Survival,
    Tag,
    Mothership,
    Maze,
}

impl Gamemode {
    pub const ALL: [Gamemode; 9] = [
        Gamemode::Ffa,
        Gamemode::Teams,
        Gamemode::FourTeams,
        Gamemode::Sandbox,
        Gamemode::Domination,
        Gamemode::Survival,
        Gamemode::Tag,
        Gamemode::Mothership,
        Gamemode::Maze,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Gamemode::Ffa => "ffa",
            Gamemode::Teams => "teams",
            Gamemode::FourTeams => "4teams",
            Gamemode::Sandbox => "sandbox",
            Gamemode::Domination => "dom",
            Gamemode::Survival => "survival",
            Gamemode::Tag => "tag",
            Gamemode::Mothership => "mot",
            Gamemode::Maze => "maze",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Gamemode::Ffa => "FFA",
            Gamemode::Teams => "2 Teams",
            Gamemode::FourTeams => "4 Teams",
            Gamemode::Sandbox => "Sandbox",
            Gamemode::Domination => "Domination",
            Gamemode::Survival => "Survival",
            Gamemode::Tag => "Tag",
            Gamemode::Mothership => "Mothership",
            Gamemode::Maze => "Maze",
        }
    }

    /// Survival and tag are listed but have no arena yet.
    pub fn is_available(self) -> bool {
        !matches!(self, Gamemode::Survival | Gamemode::Tag)
    }

    /// Builds the factory the instance uses to create a fresh arena on every start.
    pub fn arena_factory(self, round_ticks: Option<u64>) -> Result<ArenaFactory, ConfigError> {
        if !self.is_available() {
            return Err(ConfigError::UnavailableGamemode(self.key().to_string()));
        }

        let round_ticks = match self {
            Gamemode::Sandbox => None,
            _ => round_ticks,
        };
        Ok(Box::new(move || -> Box<dyn Arena> {
            Box::new(RoundArena::new(self, round_ticks))
        }))
    }
}

impl FromStr for Gamemode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Gamemode::ALL
            .into_iter()
            .find(|mode| mode.key() == s)
            .ok_or_else(|| ConfigError::UnknownGamemode(s.to_string()))
    }
}

impl fmt::Display for Gamemode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
