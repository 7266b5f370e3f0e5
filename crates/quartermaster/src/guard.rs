//! Per-key write serialization.
//!
//! A submission reads balances, checks them, then appends. Two submissions touching the
//! same balance key must not interleave those steps, so each takes the guards for every
//! key it touches before reading. Keys are locked in sorted order so overlapping
//! submissions cannot deadlock.
//!
//! Lock entries live only while someone holds or waits on them; releasing the last
//! holder removes the entry.

use std::collections::BTreeSet;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::projector::BalanceKey;

#[derive(Debug)]
pub struct KeyGuards<K: Eq + Hash = BalanceKey> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

/// Held for the duration of one read-check-append sequence.
#[derive(Debug)]
pub struct HeldKeys<'a, K: Eq + Hash = BalanceKey> {
    locks: &'a DashMap<K, Arc<Mutex<()>>>,
    guards: Vec<(K, OwnedMutexGuard<()>)>,
}

impl<K: Eq + Hash> Default for KeyGuards<K> {
    fn default() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }
}

impl<K: Ord + Hash + Clone> KeyGuards<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, keys: BTreeSet<K>) -> HeldKeys<'_, K> {
        let mut held = HeldKeys {
            locks: &self.locks,
            guards: Vec::with_capacity(keys.len()),
        };
        for key in keys {
            let lock = self.locks.entry(key.clone()).or_default().clone();
            held.guards.push((key, lock.lock_owned().await));
        }
        held
    }

    pub async fn acquire_one(&self, key: K) -> HeldKeys<'_, K> {
        self.acquire(BTreeSet::from([key])).await
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K: Eq + Hash> Drop for HeldKeys<'_, K> {
    fn drop(&mut self) {
        for (key, guard) in self.guards.drain(..).rev() {
            drop(guard);
            // the map's own Arc is the only one left when nobody waits
            self.locks.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}
