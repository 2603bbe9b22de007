//! Error types surfaced by the hub library

use thiserror::Error;

/// Misuse of the lease manager's locking contract.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LeaseError {
    /// A lock-requiring call was made by a thread that does not own the lock.
    #[error("lease manager lock is not held by the calling thread")]
    LockNotHeld,
}

/// Failures of an identifier source.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorError {
    #[error("no unused identifier found after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error("identifier range exhausted")]
    Overflow,
}

/// Errors returned to session-layer callers of the hub.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    #[error("server full")]
    ServerFull,
    #[error("hub controller is not running")]
    Closed,
}
