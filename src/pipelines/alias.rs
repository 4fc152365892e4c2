// SPDX-License-Identifier: GPL-3.0-only

//! Bookkeeping for images that borrow frame memory
//!
//! An alias is valid from the moment it is handed out until the next
//! `release_all()`. Releasing bumps a generation counter; every token minted
//! under the previous generation reports itself invalid from then on, even if
//! someone kept it around.

use crate::errors::BridgeError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bounded set of live aliases sharing one generation counter
#[derive(Debug)]
pub struct AliasLedger {
    generation: Arc<AtomicU64>,
    in_flight: usize,
    capacity: usize,
}

/// Proof that an image was created under a particular generation
#[derive(Debug, Clone)]
pub struct AliasToken {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl AliasLedger {
    /// Ledger allowing at most `capacity` aliases between releases
    pub fn new(capacity: usize) -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            in_flight: 0,
            capacity: capacity.max(1),
        }
    }

    /// Reserve a slot for a new alias
    pub fn acquire(&mut self) -> Result<AliasToken, BridgeError> {
        if self.in_flight >= self.capacity {
            return Err(BridgeError::CacheExhausted {
                capacity: self.capacity,
            });
        }
        self.in_flight += 1;
        Ok(AliasToken {
            generation: self.generation.load(Ordering::Acquire),
            current: Arc::clone(&self.generation),
        })
    }

    /// Invalidate every outstanding alias; returns how many there were
    pub fn release_all(&mut self) -> usize {
        let released = self.in_flight;
        self.in_flight = 0;
        if released > 0 {
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        released
    }

    /// Aliases handed out since the last release
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Maximum number of aliases between releases
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl AliasToken {
    /// True until the ledger that minted this token is released
    pub fn is_valid(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }
}
