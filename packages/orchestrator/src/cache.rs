//! Bounded nonce cache with TTL and max-size eviction
//!
//! Replay and the live subscription can both deliver the same nonce at
//! startup; the dispatcher records every nonce it routes here so the second
//! delivery is dropped instead of signed twice.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Bounded set of attestation nonces with TTL and capacity limits.
///
/// On insert at capacity, expired entries are evicted first, then the oldest
/// remaining entry by insertion time.
pub struct NonceCache {
    /// Nonce -> insertion timestamp
    map: HashMap<u64, Instant>,
    max_size: usize,
    ttl: Duration,
}

impl NonceCache {
    pub fn new(max_size: usize, ttl_secs: u64) -> Self {
        Self {
            map: HashMap::new(),
            max_size,
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// Returns true if the nonce is present and not expired.
    pub fn contains(&self, nonce: u64) -> bool {
        self.map.get(&nonce).is_some_and(|&t| t.elapsed() < self.ttl)
    }

    /// Record `nonce`. Returns false when it was already present and fresh.
    pub fn insert(&mut self, nonce: u64) -> bool {
        if self.contains(nonce) {
            return false;
        }

        let now = Instant::now();
        self.map.retain(|_, &mut t| now.duration_since(t) < self.ttl);

        while self.map.len() >= self.max_size && !self.map.is_empty() {
            let oldest = self.map.iter().min_by_key(|(_, t)| *t).map(|(n, _)| *n);
            match oldest {
                Some(n) => {
                    self.map.remove(&n);
                }
                None => break,
            }
        }

        self.map.insert(nonce, now);
        true
    }

    /// Forget `nonce` so a later delivery is processed again.
    pub fn remove(&mut self, nonce: u64) {
        self.map.remove(&nonce);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
