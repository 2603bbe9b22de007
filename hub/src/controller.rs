//! Hub controller mediating between the session layer and the lease pool
//!
//! The controller takes the lease lock from inside its tokio task. The lock
//! parks the worker thread rather than yielding, so every guard is taken in
//! a short synchronous block and dropped before the next `.await`.

use crate::client_manager::ClientManager;
use crate::error::HubError;
use crate::generator::IdGenerator;
use crate::lease::LeaseManager;
use crate::supplier::{IdSupplier, SupplierConfig};
use log::{debug, info, warn};
use shared::{HubStats, UniqueId, PLAYER_TIMEOUT};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};

type JoinReply = oneshot::Sender<Result<UniqueId, HubError>>;

/// Messages sent from session handlers and the supplier to the hub loop
#[derive(Debug)]
pub enum HubMessage {
    Join { reply: JoinReply },
    CheckIn { player_id: UniqueId },
    Leave { player_id: UniqueId },
    Stats { reply: oneshot::Sender<HubStats> },
    BatchDelivered { count: usize },
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Connected plus waiting players allowed at once
    pub max_clients: usize,
    /// Silence after which a player is dropped
    pub player_timeout: Duration,
    /// How often timeouts are checked and waiting players retried
    pub sweep_interval: Duration,
    pub supplier: SupplierConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_clients: 32,
            player_timeout: PLAYER_TIMEOUT,
            sweep_interval: Duration::from_secs(1),
            supplier: SupplierConfig::default(),
        }
    }
}

/// Cloneable entry point for session handlers
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubMessage>,
}

impl HubHandle {
    /// Waits until the hub leases an identifier for a new player.
    pub async fn join(&self) -> Result<UniqueId, HubError> {
        let (reply, response) = oneshot::channel();
        self.send(HubMessage::Join { reply })?;
        response.await.map_err(|_| HubError::Closed)?
    }

    /// Marks the player as alive so the timeout sweep keeps it.
    pub fn check_in(&self, player_id: UniqueId) -> Result<(), HubError> {
        self.send(HubMessage::CheckIn { player_id })
    }

    /// Removes the player. Its id is retired, not returned to the pool.
    pub fn leave(&self, player_id: UniqueId) -> Result<(), HubError> {
        self.send(HubMessage::Leave { player_id })
    }

    /// Snapshot of demand, pool and player counts.
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply, response) = oneshot::channel();
        self.send(HubMessage::Stats { reply })?;
        response.await.map_err(|_| HubError::Closed)
    }

    /// Asks the hub loop to stop. Queued joiners then get [`HubError::Closed`].
    pub fn shutdown(&self) -> Result<(), HubError> {
        self.send(HubMessage::Shutdown)
    }

    fn send(&self, message: HubMessage) -> Result<(), HubError> {
        self.tx.send(message).map_err(|_| HubError::Closed)
    }
}

/// Admits players with leased identifiers and keeps the pool supplied
///
/// Players that arrive while the pool is empty register demand and wait
/// in arrival order until the supplier delivers a batch. A newcomer is only
/// handed a pooled id once everyone queued ahead of it has been served.
/// Queued players that hang up take their demand back with them.
pub struct HubController {
    leases: Arc<LeaseManager>,
    clients: ClientManager,
    waiting: VecDeque<JoinReply>,
    config: HubConfig,

    hub_tx: mpsc::UnboundedSender<HubMessage>,
    hub_rx: mpsc::UnboundedReceiver<HubMessage>,
}

impl HubController {
    pub fn new(leases: Arc<LeaseManager>, config: HubConfig) -> Self {
        let (hub_tx, hub_rx) = mpsc::unbounded_channel();

        Self {
            leases,
            clients: ClientManager::new(config.max_clients),
            waiting: VecDeque::new(),
            config,
            hub_tx,
            hub_rx,
        }
    }

    pub fn handle(&self) -> HubHandle {
        HubHandle {
            tx: self.hub_tx.clone(),
        }
    }

    /// Main hub loop. Returns after a shutdown request.
    pub async fn run<G>(&mut self, generator: G)
    where
        G: IdGenerator + 'static,
    {
        let supplier = IdSupplier::new(
            Arc::clone(&self.leases),
            generator,
            self.config.supplier.clone(),
        );
        let supplier_task = tokio::spawn(supplier.run(self.hub_tx.clone()));

        let mut sweep = interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Hub started (max {} players, timeout {:?})",
            self.config.max_clients, self.config.player_timeout
        );

        loop {
            tokio::select! {
                message = self.hub_rx.recv() => {
                    match message {
                        Some(HubMessage::Join { reply }) => self.handle_join(reply),
                        Some(HubMessage::CheckIn { player_id }) => {
                            if !self.clients.check_in(player_id) {
                                warn!("Check-in from unknown player {}", player_id);
                            }
                        },
                        Some(HubMessage::Leave { player_id }) => {
                            self.clients.remove_client(&player_id);
                        },
                        Some(HubMessage::Stats { reply }) => {
                            let _ = reply.send(self.stats());
                        },
                        Some(HubMessage::BatchDelivered { count }) => {
                            debug!("{} ids delivered, {} players waiting", count, self.waiting.len());
                            self.serve_waiting();
                        },
                        Some(HubMessage::Shutdown) | None => {
                            info!("Hub shutting down");
                            break;
                        }
                    }
                },

                _ = sweep.tick() => {
                    self.clients.check_timeouts(self.config.player_timeout);
                    self.serve_waiting();
                },
            }
        }

        supplier_task.abort();
        // Waiting joiners see their reply channel close
        self.waiting.clear();
    }

    /// Snapshot of demand, pool and player counts
    pub fn stats(&self) -> HubStats {
        HubStats {
            wanted: self.leases.fetch_wanted_amount_of_unique_ids(),
            available: self.leases.available(),
            leased_total: self.leases.leased_total(),
            connected_players: self.clients.len(),
            waiting_players: self.waiting.len(),
        }
    }

    fn handle_join(&mut self, reply: JoinReply) {
        // Anyone still queued after this means the pool is empty
        self.serve_waiting();

        if self.clients.len() + self.waiting.len() >= self.config.max_clients {
            let _ = reply.send(Err(HubError::ServerFull));
            return;
        }

        let leased = {
            let mut guard = self.leases.acquire();
            let id = guard.fetch_unique_id();
            if id.is_none() {
                guard.notify_want_id();
            }
            id
        };

        match leased {
            Some(id) => self.admit(id, reply),
            None => {
                debug!("Pool empty, player queued at position {}", self.waiting.len() + 1);
                self.waiting.push_back(reply);
            }
        }
    }

    /// Hands pooled identifiers to waiting players in arrival order
    fn serve_waiting(&mut self) {
        self.forget_closed_waiters();

        while !self.waiting.is_empty() {
            let leased = {
                let mut guard = self.leases.acquire();
                guard.fetch_unique_id()
            };
            let Some(id) = leased else {
                break;
            };
            if let Some(reply) = self.waiting.pop_front() {
                self.admit(id, reply);
            }
        }
    }

    /// Drops queued joiners that hung up and withdraws the demand they added
    fn forget_closed_waiters(&mut self) {
        let queued = self.waiting.len();
        self.waiting.retain(|waiting| !waiting.is_closed());

        let abandoned = queued - self.waiting.len();
        if abandoned > 0 {
            self.leases.acquire().withdraw_want_ids(abandoned);
            debug!("{} waiting players hung up", abandoned);
        }
    }

    fn admit(&mut self, id: UniqueId, reply: JoinReply) {
        if !self.clients.add_client(id) {
            warn!("Could not register leased id {}", id);
            let _ = reply.send(Err(HubError::ServerFull));
            return;
        }

        if reply.send(Ok(id)).is_err() {
            // Joiner gave up; the id stays consumed
            self.clients.remove_client(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::SequentialIdGenerator;

    fn fast_config(max_clients: usize) -> HubConfig {
        HubConfig {
            max_clients,
            player_timeout: Duration::from_secs(90),
            sweep_interval: Duration::from_millis(10),
            supplier: SupplierConfig {
                poll_interval: Duration::from_millis(5),
                max_batch: 16,
            },
        }
    }

    fn spawn_hub(config: HubConfig, start: UniqueId) -> (HubHandle, tokio::task::JoinHandle<()>) {
        let mut controller = HubController::new(Arc::new(LeaseManager::new()), config);
        let handle = controller.handle();
        let task = tokio::spawn(async move {
            controller.run(SequentialIdGenerator::new(start)).await;
        });
        (handle, task)
    }

    fn supplier(leases: &Arc<LeaseManager>) -> IdSupplier<SequentialIdGenerator> {
        IdSupplier::new(
            Arc::clone(leases),
            SequentialIdGenerator::new(1),
            SupplierConfig::default(),
        )
    }

    #[test]
    fn test_newcomer_does_not_overtake_queue() {
        let leases = Arc::new(LeaseManager::new());
        let mut controller = HubController::new(Arc::clone(&leases), fast_config(4));
        let mut supplier = supplier(&leases);

        let (first, mut first_rx) = oneshot::channel();
        controller.handle_join(first);
        assert!(first_rx.try_recv().is_err());
        assert_eq!(supplier.supply_once(), Ok(1));

        // Delivered, but the hub has not yet run its serve pass
        let (second, mut second_rx) = oneshot::channel();
        controller.handle_join(second);

        assert_eq!(first_rx.try_recv(), Ok(Ok(1)));
        assert!(second_rx.try_recv().is_err());
        assert_eq!(controller.waiting.len(), 1);
        assert_eq!(leases.fetch_wanted_amount_of_unique_ids(), 1);

        assert_eq!(supplier.supply_once(), Ok(1));
        controller.serve_waiting();
        assert_eq!(second_rx.try_recv(), Ok(Ok(2)));
        assert_eq!(leases.fetch_wanted_amount_of_unique_ids(), 0);
    }

    #[test]
    fn test_waiting_players_served_in_arrival_order() {
        let leases = Arc::new(LeaseManager::new());
        let mut controller = HubController::new(Arc::clone(&leases), fast_config(8));

        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (reply, rx) = oneshot::channel();
            controller.handle_join(reply);
            receivers.push(rx);
        }
        assert_eq!(leases.fetch_wanted_amount_of_unique_ids(), 3);

        leases.acquire().handle_generated_unique_ids(&[30, 10, 20]);
        controller.serve_waiting();

        let served: Vec<_> = receivers
            .iter_mut()
            .map(|rx| rx.try_recv().unwrap().unwrap())
            .collect();
        assert_eq!(served, vec![30, 10, 20]);
        assert!(controller.waiting.is_empty());
    }

    #[test]
    fn test_hung_up_waiters_withdraw_demand() {
        let leases = Arc::new(LeaseManager::new());
        let mut controller = HubController::new(Arc::clone(&leases), fast_config(8));

        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (reply, rx) = oneshot::channel();
            controller.handle_join(reply);
            receivers.push(rx);
        }
        assert_eq!(leases.fetch_wanted_amount_of_unique_ids(), 3);
        drop(receivers);

        controller.serve_waiting();
        assert!(controller.waiting.is_empty());
        assert_eq!(leases.fetch_wanted_amount_of_unique_ids(), 0);

        // A batch already on its way becomes surplus for the next joiner
        leases.acquire().handle_generated_unique_ids(&[5]);
        let (reply, mut rx) = oneshot::channel();
        controller.handle_join(reply);
        assert_eq!(rx.try_recv(), Ok(Ok(5)));
        assert_eq!(leases.fetch_wanted_amount_of_unique_ids(), -1);
    }

    #[tokio::test]
    async fn test_join_waits_for_generated_id() {
        let (hub, task) = spawn_hub(fast_config(4), 100);

        assert_eq!(hub.join().await, Ok(100));
        assert_eq!(hub.join().await, Ok(101));

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.connected_players, 2);
        assert_eq!(stats.leased_total, 2);
        assert_eq!(stats.wanted, 0);

        hub.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_pooled_id_served_without_demand() {
        let leases = Arc::new(LeaseManager::new());
        leases.acquire().handle_generated_unique_ids(&[7]);

        let mut controller = HubController::new(Arc::clone(&leases), fast_config(4));
        let hub = controller.handle();
        let task = tokio::spawn(async move {
            controller.run(SequentialIdGenerator::new(1)).await;
        });

        assert_eq!(hub.join().await, Ok(7));
        assert_eq!(leases.fetch_wanted_amount_of_unique_ids(), -1);

        hub.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_full() {
        let (hub, task) = spawn_hub(fast_config(1), 1);

        assert!(hub.join().await.is_ok());
        assert_eq!(hub.join().await, Err(HubError::ServerFull));

        hub.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_leave_frees_slot() {
        let (hub, task) = spawn_hub(fast_config(1), 1);

        let first = hub.join().await.unwrap();
        hub.leave(first).unwrap();

        let second = hub.join().await.unwrap();
        assert_ne!(first, second);

        hub.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_joins_get_distinct_ids() {
        let (hub, task) = spawn_hub(fast_config(64), 1);

        let joins: Vec<_> = (0..20)
            .map(|_| {
                let hub = hub.clone();
                tokio::spawn(async move { hub.join().await })
            })
            .collect();

        let mut ids = Vec::new();
        for join in joins {
            ids.push(join.await.unwrap().unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 20);

        hub.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_check_in_unknown_player_is_ignored() {
        let (hub, task) = spawn_hub(fast_config(2), 1);

        hub.check_in(12345).unwrap();
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.connected_players, 0);

        hub.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_timed_out_player_is_dropped() {
        let mut config = fast_config(2);
        config.player_timeout = Duration::from_millis(20);
        let (hub, task) = spawn_hub(config, 1);

        hub.join().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.connected_players, 0);
        assert_eq!(stats.leased_total, 1);

        hub.shutdown().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_hub() {
        let (hub, task) = spawn_hub(fast_config(2), 1);
        hub.shutdown().unwrap();
        task.await.unwrap();

        assert_eq!(hub.join().await, Err(HubError::Closed));
        assert_eq!(hub.leave(1), Err(HubError::Closed));
        assert!(hub.stats().await.is_err());
    }
}
