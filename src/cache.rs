//! The two-tier cache coordinator.
//!
//! [`Cache`] glues the memory tier to an optional [`PersistenceTier`]
//! behind one small surface. The coordination contract is asymmetric on
//! purpose:
//!
//! | Path   | Persistence failure | Caller sees |
//! |--------|---------------------|-------------|
//! | read   | logged              | a miss      |
//! | write  | returned            | error, value still cached in memory |
//! | async write | logged         | nothing     |
//! | delete | logged              | nothing     |
//! | flush  | returned            | error, memory already flushed |
//! | close  | returned            | error, resources released best-effort |
//!
//! The memory tier is authoritative: a synchronous `set` writes memory
//! *first*, so the value is visible to every subsequent `get` in this
//! process even when the durable write fails. Reads never surface
//! persistence errors: a corrupt or unreachable backend is
//! indistinguishable from a cache miss.
//!
//! ## Read path
//!
//! ```text
//! get(key) ── memory hit? ──────────────────────────────► value
//!                │ miss
//!                ├─ no persistence ─────────────────────► miss
//!                ├─ validate_key fails (logged) ────────► miss
//!                ├─ persistence error (logged) ─────────► miss
//!                ├─ persistence miss ────────────────────► miss
//!                └─ persistence hit ── insert into memory
//!                                      (promotion-on-read) ──► value
//! ```
//!
//! ## Background work
//!
//! Construction with a persistence tier may spawn two detached tasks:
//! a **warmup** that streams recently updated entries into memory (bounded
//! by the configured limit and a five-minute budget), and a one-shot
//! **startup cleanup** that deletes entries older than the configured
//! maximum age. Neither blocks construction; both observe the cache's root
//! cancellation token, which [`close`](Cache::close) fires.

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::builder::CacheBuilder;
use crate::clock::{expiry_at, Clock};
use crate::error::CacheError;
use crate::memory::MemoryTier;
use crate::persist::PersistenceTier;

/// Budget for one detached asynchronous persistence write.
pub(crate) const ASYNC_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Budget for the background warmup task.
pub(crate) const WARMUP_TIMEOUT: Duration = Duration::from_secs(300);

/// Two-tier cache: sharded S3-FIFO memory over optional durable storage.
///
/// Built through [`CacheBuilder`]; memory-only unless a persistence tier is
/// bound. All methods take `&self` and are safe to share via [`Arc`] or by
/// reference across tasks.
///
/// # Example
///
/// ```
/// use tokio_util::sync::CancellationToken;
/// use tierkit::Cache;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), tierkit::ConfigError> {
/// let cache: Cache<String, u32> = Cache::builder().memory_size(50_000).build()?;
/// let ctx = CancellationToken::new();
///
/// cache.set(&ctx, "answer".into(), 42, std::time::Duration::ZERO).await.unwrap();
/// assert_eq!(cache.get(&ctx, &"answer".to_string()).await, Some(42));
/// # Ok(())
/// # }
/// ```
pub struct Cache<K, V> {
    memory: Arc<MemoryTier<K, V>>,
    persist: Option<Arc<dyn PersistenceTier<K, V>>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Returns a builder with the default configuration (memory-only,
    /// 10 000 entries, no default TTL).
    pub fn builder() -> CacheBuilder<K, V> {
        CacheBuilder::new()
    }

    /// Assembles a cache and spawns its background tasks.
    ///
    /// Called by the builder only. Spawning requires a Tokio runtime when
    /// warmup or startup cleanup is configured.
    pub(crate) fn assemble(
        memory: MemoryTier<K, V>,
        persist: Option<Arc<dyn PersistenceTier<K, V>>>,
        clock: Arc<dyn Clock>,
        default_ttl: Duration,
        warmup_limit: usize,
        cleanup_max_age: Option<Duration>,
    ) -> Self {
        let cache = Self {
            memory: Arc::new(memory),
            persist,
            clock,
            default_ttl,
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        };

        if let Some(persist) = &cache.persist {
            if let Some(max_age) = cleanup_max_age {
                let persist = Arc::clone(persist);
                let token = cache.shutdown.child_token();
                tokio::spawn(async move {
                    match persist.cleanup(&token, max_age).await {
                        Ok(0) => {},
                        Ok(deleted) => info!(deleted, "persistence cleanup complete"),
                        Err(err) => warn!(error = %err, "error during persistence cleanup"),
                    }
                });
            }

            if warmup_limit > 0 {
                let persist = Arc::clone(persist);
                let memory = Arc::clone(&cache.memory);
                let token = cache.shutdown.child_token();
                tokio::spawn(run_warmup(memory, persist, token, warmup_limit));
            }
        }

        cache
    }

    /// Retrieves a value, reading through to the persistence tier on a
    /// memory miss.
    ///
    /// A persistence hit is inserted into the memory tier with its stored
    /// expiry (promotion-on-read), so the next read is local. Persistence
    /// failures and invalid keys are logged and reported as misses; reads
    /// never fail.
    pub async fn get(&self, ctx: &CancellationToken, key: &K) -> Option<V> {
        if let Some(value) = self.memory.get(key) {
            return Some(value);
        }

        let persist = self.persist.as_ref()?;

        // Hostile keys never reach backend I/O.
        if let Err(err) = persist.validate_key(key) {
            warn!(error = %err, "invalid key for persistence");
            return None;
        }

        match persist.get(ctx, key).await {
            Ok(Some((value, expiry))) => {
                self.memory.set_at(key.clone(), value.clone(), expiry);
                Some(value)
            },
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "persistence load failed");
                None
            },
        }
    }

    /// Stores a value with write-through persistence.
    ///
    /// `Duration::ZERO` means "use the configured default TTL, else no
    /// expiry". The memory tier is **always** written first; a persistence
    /// failure is returned but the in-memory value stays visible to
    /// subsequent reads in this process.
    pub async fn set(
        &self,
        ctx: &CancellationToken,
        key: K,
        value: V,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let expiry = self.expiry_for(ttl);

        if let Some(persist) = &self.persist {
            persist
                .validate_key(&key)
                .map_err(CacheError::invalid_key)?;
        }

        self.memory.set_at(key.clone(), value.clone(), expiry);

        if let Some(persist) = &self.persist {
            persist
                .set(ctx, &key, &value, expiry)
                .await
                .map_err(CacheError::store)?;
        }
        Ok(())
    }

    /// Stores a value, completing the persistence write in the background.
    ///
    /// Key validation and the memory write happen synchronously, so memory
    /// visibility is guaranteed on return; durable visibility is eventual
    /// and best-effort. The detached write runs under its own
    /// 30-second budget, independent of `ctx`, so persistence can complete
    /// even if the caller moves on. Persistence failures are logged, never
    /// returned.
    pub fn set_async(
        &self,
        ctx: &CancellationToken,
        key: K,
        value: V,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if ctx.is_cancelled() {
            return Err(CacheError::Cancelled);
        }
        let expiry = self.expiry_for(ttl);

        if let Some(persist) = &self.persist {
            persist
                .validate_key(&key)
                .map_err(CacheError::invalid_key)?;
        }

        self.memory.set_at(key.clone(), value.clone(), expiry);

        if let Some(persist) = &self.persist {
            let persist = Arc::clone(persist);
            tokio::spawn(async move {
                let detached = CancellationToken::new();
                match tokio::time::timeout(
                    ASYNC_WRITE_TIMEOUT,
                    persist.set(&detached, &key, &value, expiry),
                )
                .await
                {
                    Ok(Ok(())) => {},
                    Ok(Err(err)) => error!(error = %err, "async persistence store failed"),
                    Err(_) => error!("async persistence store timed out"),
                }
            });
        }
        Ok(())
    }

    /// Retrieves a value, computing and storing it on a miss.
    ///
    /// The loader runs outside every shard lock. The computed value is
    /// stored through the synchronous write path; if that write's
    /// persistence half fails, the error is returned even though the value
    /// is already readable from memory.
    pub async fn get_or_set<F>(
        &self,
        ctx: &CancellationToken,
        key: K,
        loader: F,
        ttl: Duration,
    ) -> Result<V, CacheError>
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(ctx, &key).await {
            return Ok(value);
        }
        let value = loader();
        self.set(ctx, key, value.clone(), ttl).await?;
        Ok(value)
    }

    /// Removes a key from both tiers.
    ///
    /// The memory removal is unconditional. Persistence delete failures
    /// (and keys the backend cannot represent) are logged, not surfaced;
    /// deleting is best-effort on the durable side.
    pub async fn delete(&self, ctx: &CancellationToken, key: &K) {
        self.memory.remove(key);

        if let Some(persist) = &self.persist {
            if let Err(err) = persist.validate_key(key) {
                warn!(error = %err, "invalid key for persistence delete");
                return;
            }
            if let Err(err) = persist.delete(ctx, key).await {
                warn!(error = %err, "persistence delete failed");
            }
        }
    }

    /// Physically removes expired entries from the memory tier, returning
    /// how many were removed.
    ///
    /// Persistence-side expiry is handled by the startup cleanup task and
    /// by backends' native TTL support, not by this call.
    pub fn cleanup(&self) -> usize {
        self.memory.cleanup()
    }

    /// Returns the number of entries in the memory tier.
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// Returns `true` if the memory tier is empty.
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Removes every entry from both tiers, returning the total removed.
    ///
    /// The memory tier is flushed first and stays flushed even when the
    /// persistence flush fails; the failure is returned.
    pub async fn flush(&self, ctx: &CancellationToken) -> Result<usize, CacheError> {
        let removed = self.memory.flush();
        match &self.persist {
            Some(persist) => {
                let stored = persist.flush(ctx).await.map_err(CacheError::flush)?;
                Ok(removed + stored)
            },
            None => Ok(removed),
        }
    }

    /// Gives direct access to the memory tier.
    pub fn memory(&self) -> &MemoryTier<K, V> {
        &self.memory
    }

    /// Cancels background work and closes the persistence tier.
    ///
    /// Idempotent: the second and later calls return `Ok(())` without
    /// touching the backend again. A close error does not require a retry;
    /// resources are released best-effort.
    pub async fn close(&self) -> Result<(), CacheError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.cancel();

        if let Some(persist) = &self.persist {
            persist.close().await.map_err(CacheError::Close)?;
        }
        Ok(())
    }

    /// Resolves a caller TTL against the configured default.
    fn expiry_for(&self, ttl: Duration) -> u64 {
        let effective = if ttl.is_zero() { self.default_ttl } else { ttl };
        expiry_at(self.clock.now_nanos(), effective)
    }
}

impl<K, V> std::fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("memory", &self.memory)
            .field("persistent", &self.persist.is_some())
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

/// Streams recently updated entries from persistence into the memory tier.
///
/// Best-effort: item-level errors are logged and skipped, a failure to open
/// the stream abandons the warmup, and the whole task runs under
/// [`WARMUP_TIMEOUT`] so a slow backend cannot pin the cache's token tree.
async fn run_warmup<K, V>(
    memory: Arc<MemoryTier<K, V>>,
    persist: Arc<dyn PersistenceTier<K, V>>,
    token: CancellationToken,
    limit: usize,
) where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let load = async {
        let mut stream = match persist.stream_recent(&token, limit).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "cache warmup failed to start");
                return;
            },
        };

        let mut loaded = 0usize;
        while let Some(item) = stream.next().await {
            if token.is_cancelled() {
                break;
            }
            match item {
                Ok(entry) => {
                    memory.set_at(entry.key, entry.value, entry.expiry);
                    loaded += 1;
                },
                Err(err) => warn!(error = %err, loaded, "error during cache warmup"),
            }
        }
        if loaded > 0 {
            info!(loaded, "cache warmup complete");
        }
    };

    tokio::select! {
        _ = token.cancelled() => {},
        timed = tokio::time::timeout(WARMUP_TIMEOUT, load) => {
            if timed.is_err() {
                warn!("cache warmup timed out");
            }
        },
    }
}
