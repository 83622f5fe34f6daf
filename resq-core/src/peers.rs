//! Peer table rebuilt from observed traffic.
//!
//! Peers are display-only. Nothing here feeds into merge decisions.

use std::collections::HashMap;

use resq_types::{DeviceId, Peer, Role};

#[derive(Debug, Clone)]
struct PeerEntry {
    role: Option<Role>,
    last_seen: i64,
}

/// Devices seen on any transport, with the time they were last heard from.
#[derive(Debug, Clone)]
pub struct PeerTable {
    /// How long (ms) a peer counts as connected after it was last seen.
    stale_after_ms: i64,
    peers: HashMap<DeviceId, PeerEntry>,
}

impl PeerTable {
    /// Create an empty table.
    pub fn new(stale_after_ms: i64) -> Self {
        Self {
            stale_after_ms,
            peers: HashMap::new(),
        }
    }

    /// Record traffic from `id` at `now`.
    ///
    /// A `None` role keeps whatever role was announced before. `last_seen`
    /// never moves backwards.
    pub fn observe(&mut self, id: DeviceId, role: Option<Role>, now: i64) {
        let entry = self.peers.entry(id).or_insert(PeerEntry {
            role: None,
            last_seen: now,
        });
        entry.last_seen = entry.last_seen.max(now);
        if role.is_some() {
            entry.role = role;
        }
    }

    /// Number of peers ever observed.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True if no peer was observed yet.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Peers ordered by most recently seen, with connectivity as of `now`.
    pub fn snapshot(&self, now: i64) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self
            .peers
            .iter()
            .map(|(id, entry)| Peer {
                id: id.clone(),
                role: entry.role,
                last_seen: entry.last_seen,
                is_connected: now.saturating_sub(entry.last_seen) <= self.stale_after_ms,
            })
            .collect();
        peers.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.id.cmp(&b.id)));
        peers
    }

    /// Number of peers currently considered connected.
    pub fn connected_count(&self, now: i64) -> usize {
        self.peers
            .values()
            .filter(|entry| now.saturating_sub(entry.last_seen) <= self.stale_after_ms)
            .count()
    }
}
