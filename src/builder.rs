//! Builder for [`Cache`] instances.
//!
//! All options are optional; the default build is a memory-only cache of
//! 10 000 entries with no default TTL.
//!
//! | Option            | Effect                                              | Default |
//! |-------------------|-----------------------------------------------------|---------|
//! | `memory_size`     | Maximum memory-tier entries (approximate; shards round up) | 10 000 |
//! | `default_ttl`     | Applied when `set` is called with `Duration::ZERO`  | none    |
//! | `small_ratio`     | Fraction of each shard for the admission queue      | 0.10    |
//! | `ghost_ratio`     | Ghost-filter generation size vs. shard capacity     | 1.00    |
//! | `persistence`     | Binds a durable tier; absent ⇒ memory-only          | absent  |
//! | `warmup_limit`    | Load at most N entries from persistence at startup  | 0 (off) |
//! | `cleanup_max_age` | One-shot startup deletion of entries older than this | off    |
//! | `clock`           | Time source override (tests)                        | system  |
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use tierkit::Cache;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tierkit::ConfigError> {
//! let cache: Cache<String, String> = Cache::builder()
//!     .memory_size(100_000)
//!     .default_ttl(Duration::from_secs(3600))
//!     .build()?;
//! # drop(cache);
//! # Ok(())
//! # }
//! ```

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::clock::{Clock, SystemClock};
use crate::error::ConfigError;
use crate::memory::{MemoryTier, DEFAULT_GHOST_RATIO, DEFAULT_SMALL_RATIO};
use crate::persist::PersistenceTier;

/// Default memory-tier capacity when none is configured.
pub(crate) const DEFAULT_MEMORY_SIZE: usize = 10_000;

/// Configures and constructs a [`Cache`].
pub struct CacheBuilder<K, V> {
    memory_size: usize,
    default_ttl: Duration,
    small_ratio: f64,
    ghost_ratio: f64,
    warmup_limit: usize,
    cleanup_max_age: Option<Duration>,
    clock: Arc<dyn Clock>,
    persist: Option<Arc<dyn PersistenceTier<K, V>>>,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Starts from the default configuration.
    pub fn new() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            default_ttl: Duration::ZERO,
            small_ratio: DEFAULT_SMALL_RATIO,
            ghost_ratio: DEFAULT_GHOST_RATIO,
            warmup_limit: 0,
            cleanup_max_age: None,
            clock: Arc::new(SystemClock),
            persist: None,
        }
    }

    /// Sets the maximum number of entries held in the memory tier.
    pub fn memory_size(mut self, entries: usize) -> Self {
        self.memory_size = entries;
        self
    }

    /// Sets the TTL applied to `set` calls that pass `Duration::ZERO`.
    ///
    /// Without this, a zero TTL means "never expires".
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Overrides the admission-queue fraction of each shard (`[0.0, 1.0]`).
    pub fn small_ratio(mut self, ratio: f64) -> Self {
        self.small_ratio = ratio;
        self
    }

    /// Overrides the ghost-filter generation size as a fraction of shard
    /// capacity (`≥ 0.0`; `0.0` disables ghost-guided admission).
    pub fn ghost_ratio(mut self, ratio: f64) -> Self {
        self.ghost_ratio = ratio;
        self
    }

    /// Binds a persistence tier. Without one the cache is memory-only.
    pub fn persistence(mut self, tier: Arc<dyn PersistenceTier<K, V>>) -> Self {
        self.persist = Some(tier);
        self
    }

    /// Loads up to `limit` recently updated entries from persistence into
    /// memory on startup, on a detached task. `0` disables warmup.
    pub fn warmup_limit(mut self, limit: usize) -> Self {
        self.warmup_limit = limit;
        self
    }

    /// Schedules a one-shot persistence cleanup at startup, deleting
    /// entries older than `max_age`.
    ///
    /// Set this to the largest TTL in use; backends with native TTL
    /// enforcement make the pass a fast no-op.
    pub fn cleanup_max_age(mut self, max_age: Duration) -> Self {
        self.cleanup_max_age = Some(max_age);
        self
    }

    /// Substitutes the time source. Tests use this with
    /// [`ManualClock`](crate::clock::ManualClock) to drive expiry
    /// deterministically.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validates the configuration and constructs the cache.
    ///
    /// When a persistence tier is bound together with warmup or startup
    /// cleanup, this must be called within a Tokio runtime: the background
    /// tasks are spawned here (and never block construction).
    pub fn build(self) -> Result<Cache<K, V>, ConfigError> {
        let memory = MemoryTier::with_config(
            self.memory_size,
            self.small_ratio,
            self.ghost_ratio,
            Arc::clone(&self.clock),
        )?;
        Ok(Cache::assemble(
            memory,
            self.persist,
            self.clock,
            self.default_ttl,
            self.warmup_limit,
            self.cleanup_max_age,
        ))
    }
}

impl<K, V> Default for CacheBuilder<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
