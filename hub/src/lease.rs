//! Lease manager for externally generated unique identifiers
//!
//! The manager keeps two pieces of state behind one exclusive lock:
//! - the demand counter, raised each time a caller asks for an identifier
//!   and lowered when a generated batch is absorbed
//! - the FIFO pool of identifiers that were generated but not yet leased
//!
//! Two ways of holding the lock are offered. [`LeaseManager::acquire`]
//! returns a [`LeaseGuard`] that releases on drop and exposes the mutating
//! operations directly. The manual [`LeaseManager::lock`] /
//! [`LeaseManager::release_lock`] pair serves callers that cannot keep a
//! guard alive across their calls; every lock-requiring operation on that
//! surface checks ownership first and fails with
//! [`LeaseError::LockNotHeld`] without touching state.
//! The surfaces do not mix: a lock taken through a guard is only released
//! by dropping that guard, and `release_lock` reports it as not held.
//!
//! Ownership is bound to the OS thread that took the lock, so neither
//! surface may be held across an `.await` on a multi-threaded runtime.
//! The lock is not reentrant. Taking it parks the OS thread on a condvar
//! until the current holder lets go, so callers inside tokio tasks block
//! their worker thread for the length of the wait; keep critical sections
//! short and synchronous.

use crate::error::LeaseError;
use log::debug;
use parking_lot::{Condvar, Mutex};
use shared::UniqueId;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::thread::{self, ThreadId};

/// Demand counter and pool of unleased identifiers.
///
/// Constructed once by whatever wires the server together and shared with
/// consumers through an `Arc`.
#[derive(Debug, Default)]
pub struct LeaseManager {
    /// Current owner of the exclusive lock
    holder: Mutex<Option<Owner>>,
    released: Condvar,
    /// Only written under the exclusive lock; read without it
    wanted: AtomicI64,
    pool: Mutex<VecDeque<UniqueId>>,
    leased_total: AtomicU64,
}

/// Who holds the lock and through which surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Owner {
    thread: ThreadId,
    /// Taken by [`LeaseManager::acquire`]; only the guard may release it
    scoped: bool,
}

impl LeaseManager {
    /// Creates a manager with no demand and an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks the calling thread until it owns the exclusive lock.
    ///
    /// Must be paired with exactly one [`release_lock`](Self::release_lock)
    /// on the same thread. Prefer [`acquire`](Self::acquire) where a scoped
    /// guard fits.
    pub fn lock(&self) {
        self.lock_as(false);
    }

    /// Releases the lock taken by [`lock`](Self::lock) on this thread.
    ///
    /// A lock owned by a live [`LeaseGuard`] is not released here; it is
    /// reported as not held and stays with the guard until the guard drops.
    pub fn release_lock(&self) -> Result<(), LeaseError> {
        let mut holder = self.holder.lock();
        let manual = Owner {
            thread: thread::current().id(),
            scoped: false,
        };
        if *holder != Some(manual) {
            return Err(LeaseError::LockNotHeld);
        }
        *holder = None;
        drop(holder);
        self.released.notify_one();
        Ok(())
    }

    /// Fails unless the calling thread currently owns the lock.
    pub fn verify_lock(&self) -> Result<(), LeaseError> {
        let me = thread::current().id();
        if self.holder.lock().is_some_and(|owner| owner.thread == me) {
            Ok(())
        } else {
            Err(LeaseError::LockNotHeld)
        }
    }

    /// Takes the lock and returns a guard that releases it when dropped.
    pub fn acquire(&self) -> LeaseGuard<'_> {
        self.lock_as(true);
        LeaseGuard {
            manager: self,
            _thread_bound: PhantomData,
        }
    }

    /// Records demand for one more identifier. Requires the lock.
    pub fn notify_want_id(&self) -> Result<(), LeaseError> {
        self.verify_lock()?;
        self.add_demand();
        Ok(())
    }

    /// Current demand, read without the lock.
    ///
    /// The value may be stale while another thread is mid-update; generators
    /// use it for cheap polling only.
    pub fn fetch_wanted_amount_of_unique_ids(&self) -> i64 {
        self.wanted.load(Ordering::Relaxed)
    }

    /// Appends a generated batch to the pool in order and lowers demand by
    /// its length. Requires the lock.
    ///
    /// Demand is not clamped: a batch larger than the outstanding demand
    /// leaves it negative.
    pub fn handle_generated_unique_ids(&self, batch: &[UniqueId]) -> Result<(), LeaseError> {
        self.verify_lock()?;
        self.absorb(batch);
        Ok(())
    }

    /// Leases the oldest identifier in the pool. Requires the lock.
    ///
    /// Returns `Ok(None)` when the pool is empty, leaving all state as is.
    pub fn fetch_unique_id(&self) -> Result<Option<UniqueId>, LeaseError> {
        self.verify_lock()?;
        Ok(self.take_oldest())
    }

    /// Number of identifiers waiting in the pool
    pub fn available(&self) -> usize {
        self.pool.lock().len()
    }

    /// Number of identifiers leased since start-up
    pub fn leased_total(&self) -> u64 {
        self.leased_total.load(Ordering::Relaxed)
    }

    fn lock_as(&self, scoped: bool) {
        let owner = Owner {
            thread: thread::current().id(),
            scoped,
        };
        let mut holder = self.holder.lock();
        while holder.is_some() {
            self.released.wait(&mut holder);
        }
        *holder = Some(owner);
    }

    fn add_demand(&self) {
        self.wanted.fetch_add(1, Ordering::Relaxed);
    }

    fn withdraw_demand(&self, count: usize) {
        self.wanted.fetch_sub(count as i64, Ordering::Relaxed);
    }

    fn absorb(&self, batch: &[UniqueId]) {
        self.pool.lock().extend(batch.iter().copied());
        let len = batch.len() as i64;
        let wanted = self.wanted.fetch_sub(len, Ordering::Relaxed) - len;
        debug!("Absorbed {} generated ids, demand now {}", len, wanted);
    }

    fn take_oldest(&self) -> Option<UniqueId> {
        let id = self.pool.lock().pop_front()?;
        self.leased_total.fetch_add(1, Ordering::Relaxed);
        Some(id)
    }

    /// Releases a lock owned by a guard on this thread, and nothing else
    fn unlock_scoped(&self) {
        let scoped = Owner {
            thread: thread::current().id(),
            scoped: true,
        };
        let mut holder = self.holder.lock();
        if *holder == Some(scoped) {
            *holder = None;
            drop(holder);
            self.released.notify_one();
        }
    }
}

/// Exclusive access to a [`LeaseManager`] for the lifetime of the guard.
///
/// Not `Send`: the lock belongs to the thread that acquired it.
#[derive(Debug)]
pub struct LeaseGuard<'a> {
    manager: &'a LeaseManager,
    _thread_bound: PhantomData<*const ()>,
}

impl LeaseGuard<'_> {
    /// Records demand for one more identifier
    pub fn notify_want_id(&mut self) {
        self.manager.add_demand();
    }

    /// Appends a generated batch and lowers demand by its length
    pub fn handle_generated_unique_ids(&mut self, batch: &[UniqueId]) {
        self.manager.absorb(batch);
    }

    /// Leases the oldest pooled identifier, if any
    pub fn fetch_unique_id(&mut self) -> Option<UniqueId> {
        self.manager.take_oldest()
    }

    /// Takes back demand registered by callers that no longer want an id
    ///
    /// If their batch was already delivered this leaves demand negative,
    /// matching the surplus now sitting in the pool.
    pub fn withdraw_want_ids(&mut self, count: usize) {
        self.manager.withdraw_demand(count);
    }

    /// Current demand. Exact while the guard is held, since every writer
    /// needs the lock.
    pub fn wanted(&self) -> i64 {
        self.manager.fetch_wanted_amount_of_unique_ids()
    }

    /// Number of identifiers in the pool
    pub fn available(&self) -> usize {
        self.manager.available()
    }

    /// Copy of the pool in leasing order
    pub fn pooled_ids(&self) -> Vec<UniqueId> {
        self.manager.pool.lock().iter().copied().collect()
    }

    /// Releases the lock now instead of at end of scope
    pub fn release(self) {}
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        self.manager.unlock_scoped();
    }
}
