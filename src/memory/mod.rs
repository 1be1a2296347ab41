//! The memory tier: a sharded, scan-resistant S3-FIFO cache.
//!
//! The tier splits its configured capacity across `N = 2^k` independent
//! shards, each behind its own mutex, and routes every operation with a
//! constant-time hash of the key (see [`crate::ds::route`]). Operations
//! never suspend and never fail; they briefly block on one shard mutex at
//! most.
//!
//! ## Geometry
//!
//! ```text
//!   capacity 10 000 (default)
//!        │
//!        ▼  ≥ 256 entries per shard, at most 4096 shards, power of two
//!   N = 32 shards × 313 entries
//!        │
//!        ▼  per shard
//!   small queue ≈ 10%   main queue = rest   ghost ≈ 100% of shard capacity
//! ```
//!
//! Shard counts are derived, not configured: every shard must hold enough
//! entries for its small/main split to be meaningful, and the shard count is
//! capped to bound per-shard overhead. Because per-shard capacity rounds up,
//! the tier's total capacity can slightly exceed the configured value.
//!
//! ## Locking
//!
//! A thread holds at most one shard lock at a time. Whole-tier operations
//! ([`len`](MemoryTier::len), [`cleanup`](MemoryTier::cleanup),
//! [`flush`](MemoryTier::flush)) visit shards sequentially, releasing each
//! lock before taking the next, so they interleave with concurrent readers
//! and writers rather than stopping the world.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use tierkit::memory::MemoryTier;
//!
//! let tier: MemoryTier<String, u32> = MemoryTier::new(1_000);
//! tier.set("answer".to_string(), 42, Duration::ZERO);
//! assert_eq!(tier.get(&"answer".to_string()), Some(42));
//! assert_eq!(tier.len(), 1);
//! ```

pub(crate) mod shard;

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::{expiry_at, Clock, SystemClock};
use crate::ds::{KeyFastPath, ShardRouter};
use crate::error::ConfigError;
use self::shard::Shard;

/// Smallest per-shard capacity worth splitting into queues.
pub(crate) const MIN_SHARD_CAPACITY: usize = 256;

/// Upper bound on the shard count, to bound per-shard overhead.
pub(crate) const MAX_SHARDS: usize = 4096;

/// Default fraction of each shard given to the small (admission) queue.
pub(crate) const DEFAULT_SMALL_RATIO: f64 = 0.1;

/// Default ghost-filter generation size as a fraction of shard capacity.
pub(crate) const DEFAULT_GHOST_RATIO: f64 = 1.0;

/// Derives the shard count for a total capacity: the largest power of two
/// that keeps every shard at or above [`MIN_SHARD_CAPACITY`], capped at
/// [`MAX_SHARDS`].
pub(crate) fn shard_count_for(capacity: usize) -> usize {
    let target = capacity / MIN_SHARD_CAPACITY;
    if target <= 1 {
        return 1;
    }
    let floor_pow2 = 1usize << (usize::BITS - 1 - target.leading_zeros());
    floor_pow2.min(MAX_SHARDS)
}

/// Sharded S3-FIFO cache bounded by entry count.
///
/// Keys are anything hashable, equality-comparable, and cloneable; values
/// are returned to callers by clone. All operations take `&self` and are
/// safe to call from any number of threads.
pub struct MemoryTier<K, V> {
    shards: Box<[Mutex<Shard<K, V>>]>,
    router: ShardRouter,
    clock: Arc<dyn Clock>,
    capacity: usize,
}

impl<K, V> MemoryTier<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone,
{
    /// Creates a tier with the default queue ratios and the system clock.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        match Self::with_config(
            capacity,
            DEFAULT_SMALL_RATIO,
            DEFAULT_GHOST_RATIO,
            Arc::new(SystemClock),
        ) {
            Ok(tier) => tier,
            Err(err) => panic!("{err}"),
        }
    }

    /// Creates a tier with explicit queue ratios and the system clock.
    ///
    /// `small_ratio` is the fraction of each shard given to the admission
    /// queue (`[0.0, 1.0]`); `ghost_ratio` sizes the ghost filter's
    /// generations relative to shard capacity (`≥ 0.0`).
    pub fn try_with_ratios(
        capacity: usize,
        small_ratio: f64,
        ghost_ratio: f64,
    ) -> Result<Self, ConfigError> {
        Self::with_config(capacity, small_ratio, ghost_ratio, Arc::new(SystemClock))
    }

    /// Full constructor used by the builder: ratios plus an injected clock.
    pub(crate) fn with_config(
        capacity: usize,
        small_ratio: f64,
        ghost_ratio: f64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError("memory capacity must be nonzero".into()));
        }
        if !small_ratio.is_finite() || !(0.0..=1.0).contains(&small_ratio) {
            return Err(ConfigError(format!(
                "small ratio must be in [0.0, 1.0], got {small_ratio}"
            )));
        }
        if !ghost_ratio.is_finite() || ghost_ratio < 0.0 {
            return Err(ConfigError(format!(
                "ghost ratio must be finite and non-negative, got {ghost_ratio}"
            )));
        }

        let shard_count = shard_count_for(capacity);
        let shard_capacity = capacity.div_ceil(shard_count);
        let small_cap = (shard_capacity as f64 * small_ratio).round() as usize;
        let ghost_cap = (shard_capacity as f64 * ghost_ratio).round() as usize;

        let shards = (0..shard_count)
            .map(|_| Mutex::new(Shard::new(shard_capacity, small_cap, ghost_cap)))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            shards,
            router: ShardRouter::new::<K>(shard_count),
            clock,
            capacity,
        })
    }

    /// Returns the configured entry capacity.
    ///
    /// The enforced bound is per shard, so the effective total can exceed
    /// this by at most one entry per shard (rounding).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of shards the tier was split into.
    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Returns the hashing fast path chosen for the key type.
    #[inline]
    pub fn fast_path(&self) -> KeyFastPath {
        self.router.fast_path()
    }

    /// Looks up `key`, returning a clone of the value on a live hit.
    ///
    /// A hit bumps the entry's frequency counter; an expired entry reads as
    /// a miss and is left for `cleanup`/eviction to reclaim.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now_nanos();
        self.shard_for(key).lock().get(key, now)
    }

    /// Inserts or updates `key` with a relative TTL.
    ///
    /// `Duration::ZERO` means the entry never expires. The tier has no
    /// default-TTL notion; TTL defaulting happens in the cache front end.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let expiry = expiry_at(self.clock.now_nanos(), ttl);
        self.set_at(key, value, expiry);
    }

    /// Inserts or updates `key` with an absolute expiry instant
    /// (nanoseconds since the epoch, `0` = never expires).
    ///
    /// This is the form persistence backends speak, so promotion-on-read
    /// reuses the stored expiry unchanged.
    pub fn set_at(&self, key: K, value: V, expiry: u64) {
        self.shard_for(&key).lock().set(key, value, expiry);
    }

    /// Removes `key`, returning `true` if it was resident.
    pub fn remove(&self, key: &K) -> bool {
        self.shard_for(key).lock().remove(key)
    }

    /// Returns the number of resident entries across all shards.
    ///
    /// Counts expired-but-unreclaimed entries; concurrent writers can make
    /// the total approximate by the time it is returned.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Returns `true` if no shard holds any entry.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.lock().len() == 0)
    }

    /// Physically removes every expired entry, shard by shard, returning
    /// how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_nanos();
        self.shards
            .iter()
            .map(|shard| shard.lock().cleanup(now))
            .sum()
    }

    /// Removes every entry and clears every ghost filter, returning the
    /// number of entries removed.
    pub fn flush(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().flush()).sum()
    }

    /// Validates the structural invariants of every shard.
    #[cfg(any(test, debug_assertions))]
    pub fn check_invariants(&self) -> Result<(), String> {
        for (index, shard) in self.shards.iter().enumerate() {
            shard
                .lock()
                .check_invariants()
                .map_err(|violation| format!("shard {index}: {violation}"))?;
        }
        Ok(())
    }

    #[inline]
    fn shard_for(&self, key: &K) -> &Mutex<Shard<K, V>> {
        &self.shards[self.router.shard_index(key)]
    }
}

impl<K, V> fmt::Debug for MemoryTier<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTier")
            .field("capacity", &self.capacity)
            .field("shards", &self.shards.len())
            .field("fast_path", &self.router.fast_path())
            .finish_non_exhaustive()
    }
}
