//! Identifier sources feeding the lease pool
//!
//! The hub never invents identifiers itself. An [`IdGenerator`] produces
//! batches on demand and the supplier hands them to the lease manager.

use crate::error::GeneratorError;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{UniqueId, MAX_GENERATION_ATTEMPTS};
use std::collections::HashSet;
use std::ops::RangeInclusive;

/// Produces batches of identifiers that were never produced before.
pub trait IdGenerator: Send {
    fn generate_batch(&mut self, count: usize) -> Result<Vec<UniqueId>, GeneratorError>;
}

/// Draws random identifiers and remembers every one it has issued
///
/// Collisions with earlier draws are retried up to a fixed number of
/// attempts per identifier. Only positive values are drawn by default.
pub struct RandomIdGenerator {
    rng: StdRng,
    range: RangeInclusive<UniqueId>,
    issued: HashSet<UniqueId>,
    max_attempts: u32,
}

impl RandomIdGenerator {
    /// Generator seeded from OS entropy, drawing positive ids
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Deterministic generator for tests and reproducible runs
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng,
            range: 1..=UniqueId::MAX,
            issued: HashSet::new(),
            max_attempts: MAX_GENERATION_ATTEMPTS,
        }
    }

    /// Restricts draws to `range`
    pub fn with_range(mut self, range: RangeInclusive<UniqueId>) -> Self {
        self.range = range;
        self
    }

    /// Draws allowed per id before giving up with [`GeneratorError::Exhausted`].
    /// At least one draw is always made.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Number of identifiers handed out so far
    pub fn issued(&self) -> usize {
        self.issued.len()
    }

    fn next_unused(&mut self) -> Option<UniqueId> {
        for _ in 0..self.max_attempts {
            let id = self.rng.gen_range(self.range.clone());
            if self.issued.insert(id) {
                return Some(id);
            }
        }
        None
    }
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for RandomIdGenerator {
    fn generate_batch(&mut self, count: usize) -> Result<Vec<UniqueId>, GeneratorError> {
        let mut batch = Vec::with_capacity(count);
        for _ in 0..count {
            match self.next_unused() {
                Some(id) => batch.push(id),
                None => {
                    // Forget the partial batch so its ids can be drawn again
                    for id in &batch {
                        self.issued.remove(id);
                    }
                    warn!(
                        "Gave up generating ids after {} attempts ({} already issued)",
                        self.max_attempts,
                        self.issued.len()
                    );
                    return Err(GeneratorError::Exhausted {
                        attempts: self.max_attempts,
                    });
                }
            }
        }
        debug!("Generated batch of {} random ids", batch.len());
        Ok(batch)
    }
}

/// Hands out consecutive identifiers starting from a fixed value
#[derive(Debug, Clone)]
pub struct SequentialIdGenerator {
    next: Option<UniqueId>,
}

impl SequentialIdGenerator {
    pub fn new(start: UniqueId) -> Self {
        Self { next: Some(start) }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate_batch(&mut self, count: usize) -> Result<Vec<UniqueId>, GeneratorError> {
        let Some(start) = self.next else {
            return Err(GeneratorError::Overflow);
        };
        let last = i64::from(start) + count as i64 - 1;
        if last > i64::from(UniqueId::MAX) {
            return Err(GeneratorError::Overflow);
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let last = last as UniqueId;
        self.next = last.checked_add(1);
        Ok((start..=last).collect())
    }
}
