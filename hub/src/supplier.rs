//! Batch delivery path between an identifier source and the lease pool
//!
//! Generation happens without the lease lock. Only the hand-off into the
//! pool takes it, which blocks the calling worker thread until the hub
//! controller lets go.

use crate::controller::HubMessage;
use crate::error::GeneratorError;
use crate::generator::IdGenerator;
use crate::lease::LeaseManager;
use log::{debug, error, info};
use shared::DEFAULT_MAX_BATCH;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct SupplierConfig {
    /// How often outstanding demand is polled
    pub poll_interval: Duration,
    /// Largest batch generated in one go
    pub max_batch: usize,
}

impl Default for SupplierConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            max_batch: DEFAULT_MAX_BATCH,
        }
    }
}

/// Polls demand without the lock and delivers generated batches under it
pub struct IdSupplier<G> {
    leases: Arc<LeaseManager>,
    generator: G,
    config: SupplierConfig,
}

impl<G: IdGenerator> IdSupplier<G> {
    pub fn new(leases: Arc<LeaseManager>, generator: G, config: SupplierConfig) -> Self {
        Self {
            leases,
            generator,
            config,
        }
    }

    /// Covers current demand with at most one batch.
    ///
    /// Returns the number of identifiers delivered.
    pub fn supply_once(&mut self) -> Result<usize, GeneratorError> {
        let wanted = self.leases.fetch_wanted_amount_of_unique_ids();
        if wanted <= 0 {
            return Ok(0);
        }

        let count = (wanted as usize).min(self.config.max_batch.max(1));
        let batch = self.generator.generate_batch(count)?;

        let mut guard = self.leases.acquire();
        guard.handle_generated_unique_ids(&batch);
        guard.release();

        debug!("Delivered {} ids for demand of {}", batch.len(), wanted);
        Ok(batch.len())
    }

    /// Runs until the hub stops listening.
    ///
    /// Every non-empty delivery is reported to the hub so it can serve
    /// waiting players.
    pub async fn run(mut self, hub_tx: mpsc::UnboundedSender<HubMessage>) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "ID supplier started (poll every {:?}, batches up to {})",
            self.config.poll_interval, self.config.max_batch
        );

        loop {
            ticker.tick().await;

            match self.supply_once() {
                Ok(0) => {}
                Ok(count) => {
                    if hub_tx.send(HubMessage::BatchDelivered { count }).is_err() {
                        info!("Hub closed, ID supplier stopping");
                        break;
                    }
                }
                Err(e) => error!("Failed to generate ids: {}", e),
            }
        }
    }
}
