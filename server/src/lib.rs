//! # Arena Host Server Library
//!
//! This library hosts one game instance behind a WebSocket listener. It decides
//! which connections may join, keeps the canonical set of connected sessions and
//! the global player count, drives the fixed-rate tick, and restarts the
//! instance when its arena closes.
//!
//! ## Core Responsibilities
//!
//! ### Admission Control
//! Every connection that finishes its WebSocket handshake is checked before a
//! session exists for it:
//! - The client IP is resolved from `X-Forwarded-For` or the peer address
//! - Outside development mode the forwarded chain must be consistent
//! - Banned IPs and IPs at their per-IP connection limit are refused
//! - Nothing is admitted while the arena is not open
//!
//! ### Client Registry
//! The registry is the only place membership changes. Each insert, remove and
//! clear updates the process-wide player counter and broadcasts the new count
//! to every connected session.
//!
//! ### Tick Scheduling
//! A fixed-period scheduler fires while the instance runs. A firing with no
//! sessions does nothing; otherwise the arena advances first and then every
//! session in the order it joined.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! Socket tasks only move bytes. Every decision (admission, inbound routing,
//! ticks, restarts) is made by [`network::Server::run`] one message at a time,
//! so a tick and an admission never interleave and the instance needs no locks.
//!
//! ### Session Seam
//! The instance talks to peers only through the [`session::Session`] trait and
//! to the simulation only through the [`arena::Arena`] trait. Both have
//! in-memory implementations for tests.
//!
//! ## Module Organization
//!
//! - `admission`: address resolution, the per-IP cache and the admission policy
//! - `arena`: the arena seam and the bundled round-based arena
//! - `broadcast`: encode-once fan-out to every registered session
//! - `client`: the WebSocket-backed session
//! - `config`: server configuration, TOML loading and validation
//! - `error`: error enums per concern
//! - `gamemode`: the table of hostable gamemodes
//! - `instance`: the game instance lifecycle
//! - `network`: listener, socket tasks and the main server loop
//! - `registry`: sessions and the global player counter
//! - `scheduler`: the fixed-period tick scheduler
//! - `session`: the session trait and socket commands
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         port: 8080,
//!         gamemode: "teams".to_string(),
//!         ..Default::default()
//!     };
//!
//!     // Binds the listener and boots the first instance
//!     let mut server = Server::new(config).await?;
//!
//!     // Restart or stop the server from another task
//!     let handle = server.handle();
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         handle.shutdown();
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod arena;
pub mod broadcast;
pub mod client;
pub mod config;
pub mod error;
pub mod gamemode;
pub mod instance;
pub mod network;
pub mod registry;
pub mod scheduler;
pub mod session;

#[cfg(test)]
mod testing;
