//! Ghost filter: bounded memory of recently evicted keys.
//!
//! When a key is evicted from a shard's small queue without ever being read,
//! its key (not its value) is recorded here. If the same key is inserted
//! again while the filter still remembers it, the new entry is admitted
//! directly into the main queue: the key has demonstrated re-reference
//! behavior that one trip through the small queue could not capture.
//!
//! ## Two-generation aging
//!
//! Exact FIFO ordering is not required, only "recently enough inserted keys
//! are remembered, very old keys are eventually forgotten". The filter keeps
//! two hash-set generations:
//!
//! ```text
//!        insert                   contains?
//!          │                          │
//!          ▼                          ▼
//!   ┌─────────────┐           ┌───────────────┐
//!   │   active    │◄── swap ──│     aging     │   tests hit either set
//!   └─────────────┘           └───────────────┘
//!
//!   when |active| reaches capacity:
//!     1. clear aging            (forget the oldest generation)
//!     2. swap active ↔ aging    (active becomes the aging generation)
//! ```
//!
//! Inserts go into `active`; membership tests consult both. A key therefore
//! survives at least one full generation and at most two after its insert,
//! giving approximate-FIFO retention with amortized O(1) cost and a hard
//! size bound of `2 × capacity` keys.
//!
//! Re-admission does not remove the key; it ages out with its generation.

use std::hash::Hash;

use rustc_hash::FxHashSet;

/// Approximate-FIFO set of recently evicted keys.
///
/// A capacity of 0 disables the filter: nothing is recorded and
/// `contains` always reports `false`.
///
/// # Example
///
/// ```
/// use tierkit::ds::GhostFilter;
///
/// let mut ghost = GhostFilter::new(2);
/// ghost.record("a");
/// assert!(ghost.contains(&"a"));
///
/// // Two full generations later, "a" is forgotten.
/// for key in ["b", "c", "d", "e"] {
///     ghost.record(key);
/// }
/// assert!(!ghost.contains(&"a"));
/// ```
#[derive(Debug)]
pub struct GhostFilter<K> {
    active: FxHashSet<K>,
    aging: FxHashSet<K>,
    capacity: usize,
}

impl<K> GhostFilter<K>
where
    K: Eq + Hash,
{
    /// Creates a filter whose generations each hold up to `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        Self {
            active: FxHashSet::with_capacity_and_hasher(capacity, Default::default()),
            aging: FxHashSet::default(),
            capacity,
        }
    }

    /// Returns the per-generation capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of keys currently remembered.
    ///
    /// A key re-recorded after a rotation can be counted in both
    /// generations, so this is an upper bound rather than an exact count.
    #[inline]
    pub fn len(&self) -> usize {
        self.active.len() + self.aging.len()
    }

    /// Returns `true` if no keys are remembered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.aging.is_empty()
    }

    /// Returns `true` if `key` was recorded recently enough to be remembered.
    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.active.contains(key) || self.aging.contains(key)
    }

    /// Records an evicted key.
    ///
    /// When the active generation is full the aging generation is dropped
    /// and the two are swapped, forgetting everything older than one full
    /// generation in O(1) amortized time.
    pub fn record(&mut self, key: K) {
        if self.capacity == 0 {
            return;
        }
        if self.active.len() >= self.capacity && !self.active.contains(&key) {
            self.aging.clear();
            std::mem::swap(&mut self.active, &mut self.aging);
        }
        self.active.insert(key);
    }

    /// Forgets every key.
    pub fn clear(&mut self) {
        self.active.clear();
        self.aging.clear();
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// The filter never holds more than two generations of keys.
        #[test]
        fn prop_bounded_size(
            capacity in 1usize..64,
            keys in prop::collection::vec(any::<u32>(), 0..500)
        ) {
            let mut ghost = GhostFilter::new(capacity);
            for k in keys {
                ghost.record(k);
                prop_assert!(ghost.len() <= 2 * capacity);
            }
        }

        /// A just-recorded key is always reported present.
        #[test]
        fn prop_fresh_insert_is_present(
            capacity in 1usize..64,
            keys in prop::collection::vec(any::<u32>(), 1..200)
        ) {
            let mut ghost = GhostFilter::new(capacity);
            for k in keys {
                ghost.record(k);
                prop_assert!(ghost.contains(&k));
            }
        }

        /// The most recent `capacity` distinct keys are all remembered.
        #[test]
        fn prop_last_generation_is_remembered(capacity in 1usize..32) {
            let mut ghost = GhostFilter::new(capacity);
            let total = capacity * 5;
            for k in 0..total {
                ghost.record(k);
            }
            // The newest insert plus at least the previous capacity-1 keys
            // span at most one rotation, so all are still present.
            for k in (total - capacity)..total {
                prop_assert!(ghost.contains(&k), "key {} forgotten too early", k);
            }
        }
    }
}
