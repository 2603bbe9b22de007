//! Registry of players holding a leased identifier
//!
//! This module tracks every player that was admitted by the hub:
//! - Admission under a capacity limit
//! - Check-ins that keep a registration alive
//! - Expiry of players that stopped checking in
//!
//! Expired or departed identifiers are dropped here for good. They never
//! go back to the lease pool.

use log::info;
use shared::UniqueId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A player admitted with a leased identifier
#[derive(Debug)]
pub struct Client {
    /// Identifier leased to this player
    pub id: UniqueId,
    /// When the player was admitted
    pub joined_at: Instant,
    /// Last time the player checked in
    pub last_seen: Instant,
}

impl Client {
    pub fn new(id: UniqueId) -> Self {
        let now = Instant::now();
        Self {
            id,
            joined_at: now,
            last_seen: now,
        }
    }

    /// Marks the player as active right now
    pub fn check_in(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if the player has been silent for longer than `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Admitted players keyed by their leased identifier
///
/// Enforces the server's capacity limit and removes players whose
/// check-ins have lapsed.
pub struct ClientManager {
    clients: HashMap<UniqueId, Client>,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
        }
    }

    /// Registers a player under its leased identifier
    ///
    /// Returns false if the server is at capacity or the identifier is
    /// already registered.
    pub fn add_client(&mut self, id: UniqueId) -> bool {
        if self.clients.len() >= self.max_clients || self.clients.contains_key(&id) {
            return false;
        }

        info!("Player {} joined", id);
        self.clients.insert(id, Client::new(id));
        true
    }

    /// Removes a player. Returns false if it was already gone.
    pub fn remove_client(&mut self, id: &UniqueId) -> bool {
        if let Some(client) = self.clients.remove(id) {
            info!(
                "Player {} left after {:.1}s",
                client.id,
                client.joined_at.elapsed().as_secs_f32()
            );
            true
        } else {
            false
        }
    }

    /// Refreshes a player's last-seen time. Returns false for unknown ids.
    pub fn check_in(&mut self, id: UniqueId) -> bool {
        if let Some(client) = self.clients.get_mut(&id) {
            client.check_in();
            true
        } else {
            false
        }
    }

    /// Removes and returns every player silent for longer than `timeout`
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<UniqueId> {
        let timed_out: Vec<UniqueId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for id in &timed_out {
            if self.clients.remove(id).is_some() {
                info!("Player {} timed out", id);
            }
        }

        timed_out
    }

    pub fn contains(&self, id: UniqueId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Returns the number of registered players
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
