use indexmap::map::Entry;
use indexmap::IndexMap;
use std::hash::Hash;

/// What happens when a key is inserted a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// The stored value is kept; later values are dropped.
    KeepFirst,
    /// The stored value is replaced, but the key keeps its original position.
    KeepLast,
}

/// Insertion-ordered keyed collection with an explicit duplicate policy.
///
/// Iteration yields values in the order their keys were first seen regardless of policy.
#[derive(Debug, Clone)]
pub struct Accumulator<K, V> {
    policy: MergePolicy,
    entries: IndexMap<K, V>,
}

impl<K: Hash + Eq, V> Accumulator<K, V> {
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            policy,
            entries: IndexMap::new(),
        }
    }

    /// Returns true if the key was not present before.
    pub fn upsert(&mut self, key: K, value: V) -> bool {
        match self.entries.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
            Entry::Occupied(mut slot) => {
                if self.policy == MergePolicy::KeepLast {
                    slot.insert(value);
                }
                false
            }
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    pub fn into_values(self) -> impl Iterator<Item = V> {
        self.entries.into_values()
    }
}
