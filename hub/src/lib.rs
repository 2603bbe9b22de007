//! # Lease Hub Library
//!
//! This library provides the identifier-leasing core of the multiplayer game
//! server's communication hub. It sits between the session layer, which
//! admits players, and an external generator that produces globally unique
//! identifiers in batches.
//!
//! ## Core Responsibilities
//!
//! ### Identifier Leasing
//! The lease manager keeps a demand counter and a FIFO pool of generated
//! identifiers. Callers register demand, generators absorb batches into the
//! pool, and each leased identifier leaves the pool for good.
//!
//! ### Lock Discipline
//! All mutation happens under one exclusive, thread-owned lock. Callers
//! either hold a scoped [`lease::LeaseGuard`] or pair `lock()` with
//! `release_lock()` manually; the manual surface rejects calls from threads
//! that do not own the lock with [`error::LeaseError::LockNotHeld`].
//!
//! ### Player Admission
//! The hub controller leases an identifier for every joining player,
//! queues players while the pool is empty and drops players whose
//! check-ins lapse.
//!
//! ## Module Organization
//!
//! ### Lease Module (`lease`)
//! Demand counter, identifier pool and the locking contract around them.
//!
//! ### Generator Module (`generator`)
//! The [`generator::IdGenerator`] seam plus random and sequential sources.
//!
//! ### Supplier Module (`supplier`)
//! Polls demand without the lock and delivers batches under it.
//!
//! ### Client Manager Module (`client_manager`)
//! Admitted players, check-ins and timeouts.
//!
//! ### Controller Module (`controller`)
//! The hub's event loop and the cloneable handle used by session handlers.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use hub::controller::{HubConfig, HubController};
//! use hub::generator::RandomIdGenerator;
//! use hub::lease::LeaseManager;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let leases = Arc::new(LeaseManager::new());
//!     let mut controller = HubController::new(Arc::clone(&leases), HubConfig::default());
//!     let hub = controller.handle();
//!
//!     let task = tokio::spawn(async move {
//!         controller.run(RandomIdGenerator::new()).await;
//!     });
//!
//!     // A session handler asks for an identifier for its player
//!     let player_id = hub.join().await?;
//!     hub.check_in(player_id)?;
//!
//!     hub.shutdown()?;
//!     task.await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod controller;
pub mod error;
pub mod generator;
pub mod lease;
pub mod supplier;
