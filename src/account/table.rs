//! Versioned last-writer-wins table

use std::collections::HashMap;
use std::hash::Hash;

/// One keyed value observed at a source timestamp (milliseconds)
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<K, V> {
    pub key: K,
    pub value: V,
    pub observed_at: u64,
}

impl<K, V> Observation<K, V> {
    pub fn new(key: K, value: V, observed_at: u64) -> Self {
        Self {
            key,
            value,
            observed_at,
        }
    }
}

/// Per-key state where the greatest observation timestamp wins
#[derive(Debug, Clone)]
pub struct AccountStateTable<K, V> {
    entries: HashMap<K, (V, u64)>,
    version: u64,
}

impl<K, V> Default for AccountStateTable<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            version: 0,
        }
    }
}

impl<K: Eq + Hash, V> AccountStateTable<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the observation if its key is new or its timestamp is strictly
    /// newer than the stored one. Returns whether it was accepted.
    pub fn merge(&mut self, observation: Observation<K, V>) -> bool {
        if let Some((_, stored_at)) = self.entries.get(&observation.key) {
            if observation.observed_at <= *stored_at {
                return false;
            }
        }

        self.entries
            .insert(observation.key, (observation.value, observation.observed_at));
        self.version += 1;
        true
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|(value, _)| value)
    }

    pub fn observed_at(&self, key: &K) -> Option<u64> {
        self.entries.get(key).map(|(_, at)| *at)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(key, (value, _))| (key, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of accepted merges so far
    pub fn version(&self) -> u64 {
        self.version
    }
}
