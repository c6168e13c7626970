//! Connection admission: address resolution, per-IP accounting, and bans.
//!
//! Admission runs before a session exists. [`AdmissionPolicy::check`] only
//! reads the [`IpCache`]; the caller commits the admission with
//! [`IpCache::acquire`] once it has decided to register the session, so a
//! rejected connection never leaves a trace in the cache.

use crate::config::{ConnectionLimit, RunMode};
use crate::error::AdmissionError;
use std::collections::HashMap;

/// Address metadata of a connection that finished its transport handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionRequest {
    /// Raw `X-Forwarded-For` value, repeated headers joined with commas
    pub forwarded_for: Option<String>,
    /// Direct peer address as seen by the socket
    pub peer_addr: Option<String>,
}

/// The two ends of the forwarded address chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    /// First hop of the chain
    pub first: String,
    /// Last hop of the chain, used as the client's IP
    pub candidate: String,
}

impl ConnectionRequest {
    /// Splits the forwarded chain (or the peer address when there is no
    /// header) and picks its first and last hops.
    pub fn resolve(&self) -> ResolvedAddress {
        let source = self
            .forwarded_for
            .as_deref()
            .filter(|header| !header.is_empty())
            .or(self.peer_addr.as_deref())
            .unwrap_or("");

        let hops: Vec<&str> = source.split(',').map(str::trim).collect();
        ResolvedAddress {
            first: hops.first().copied().unwrap_or("").to_string(),
            candidate: hops.last().copied().unwrap_or("").to_string(),
        }
    }
}

/// Per-IP admission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpEntry {
    /// Number of registered sessions from the IP
    Connections(u32),
    /// Fails every limit check, whatever the configured limit
    Banned,
}

/// Concurrent connection counts keyed by IP.
///
/// An IP is present only while it has registered sessions or is banned;
/// absence reads as zero connections.
#[derive(Debug, Default)]
pub struct IpCache {
    entries: HashMap<String, IpEntry>,
}

impl IpCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ip: &str) -> IpEntry {
        self.entries
            .get(ip)
            .copied()
            .unwrap_or(IpEntry::Connections(0))
    }

    pub fn connections(&self, ip: &str) -> u32 {
        match self.get(ip) {
            IpEntry::Connections(count) => count,
            IpEntry::Banned => 0,
        }
    }

    pub fn is_banned(&self, ip: &str) -> bool {
        self.get(ip) == IpEntry::Banned
    }

    /// Counts one more session from `ip`. A banned entry stays banned.
    pub fn acquire(&mut self, ip: &str) -> IpEntry {
        let entry = self
            .entries
            .entry(ip.to_string())
            .or_insert(IpEntry::Connections(0));
        if let IpEntry::Connections(count) = entry {
            *count += 1;
        }
        *entry
    }

    /// Counts one session from `ip` as gone. The entry is dropped when it
    /// reaches zero and never goes below it.
    pub fn release(&mut self, ip: &str) {
        match self.entries.get_mut(ip) {
            Some(IpEntry::Connections(count)) if *count > 1 => *count -= 1,
            Some(IpEntry::Connections(_)) => {
                self.entries.remove(ip);
            }
            Some(IpEntry::Banned) | None => {}
        }
    }

    pub fn ban(&mut self, ip: &str) {
        self.entries.insert(ip.to_string(), IpEntry::Banned);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Address and limit rules applied to every incoming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    pub limit: ConnectionLimit,
    pub mode: RunMode,
}

impl AdmissionPolicy {
    pub fn new(limit: ConnectionLimit, mode: RunMode) -> Self {
        Self { limit, mode }
    }

    /// Resolves the client IP and checks it against the address, ban and
    /// limit rules. Returns the IP the session should be registered under.
    pub fn check(
        &self,
        request: &ConnectionRequest,
        cache: &IpCache,
    ) -> Result<String, AdmissionError> {
        let ResolvedAddress { first, candidate } = request.resolve();

        // Multi-hop chains are compared end to end; only a single-hop chain
        // (or a proxy that repeats the client) passes outside development.
        if !self.mode.trusts_forwarded_headers() {
            if candidate.is_empty() {
                return Err(AdmissionError::MissingAddress);
            }
            if first != candidate {
                return Err(AdmissionError::AddressMismatch {
                    forwarded: first,
                    candidate,
                });
            }
        }

        match cache.get(&candidate) {
            IpEntry::Banned => Err(AdmissionError::Banned(candidate)),
            IpEntry::Connections(count) => match self.limit {
                ConnectionLimit::PerIp(limit) if count >= limit => {
                    Err(AdmissionError::ConnectionLimit {
                        ip: candidate,
                        count,
                        limit,
                    })
                }
                _ => Ok(candidate),
            },
        }
    }
}
