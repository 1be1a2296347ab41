//! The persistence-tier contract.
//!
//! A persistence tier is any object that can durably store the cache's
//! key/value pairs under the same keys the memory tier uses. Concrete
//! backends (local filesystem, cloud key/value stores, Redis-family
//! servers) live outside this crate; the coordinator only ever speaks this
//! trait.
//!
//! Every method is fallible and takes a [`CancellationToken`]; backends are
//! expected to give up promptly once the token fires. The coordinator holds
//! no shard lock while calling into a persistence tier.
//!
//! Expiry instants are `u64` nanoseconds since the Unix epoch, `0` meaning
//! "no expiry", the same representation the memory tier uses, so values
//! promoted from persistence keep their stored expiry unchanged.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::PersistError;

/// One record as stored by a persistence tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry<K, V> {
    /// The cache key.
    pub key: K,
    /// The stored value.
    pub value: V,
    /// Absolute expiry in nanoseconds since the epoch; `0` = no expiry.
    pub expiry: u64,
}

/// Durable secondary store addressed by cache keys.
///
/// Implementations must be safe to share across tasks; the coordinator
/// calls them concurrently from detached warmup/cleanup/write tasks.
///
/// ## Contract notes
///
/// - `get` returning `Ok(None)` is an ordinary miss, not an error.
/// - `set` has overwrite semantics.
/// - `delete` of a missing key succeeds.
/// - `cleanup` may be a no-op for backends with native TTL handling.
/// - `len` may be O(N); callers treat the result as advisory.
/// - `stream_recent` yields the most recently updated entries first where
///   the backend can order them; unordered is acceptable. `limit == 0`
///   means "all".
/// - `close` is idempotent.
#[async_trait]
pub trait PersistenceTier<K, V>: Send + Sync {
    /// Checks that `key` can be represented by this backend.
    ///
    /// Pure; called before every persistence access so that hostile keys
    /// (path traversal, namespace separators) never reach backend I/O.
    fn validate_key(&self, key: &K) -> Result<(), PersistError>;

    /// Loads the value and expiry stored for `key`, if any.
    async fn get(
        &self,
        ctx: &CancellationToken,
        key: &K,
    ) -> Result<Option<(V, u64)>, PersistError>;

    /// Stores `value` under `key`, overwriting any previous value.
    async fn set(
        &self,
        ctx: &CancellationToken,
        key: &K,
        value: &V,
        expiry: u64,
    ) -> Result<(), PersistError>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn delete(&self, ctx: &CancellationToken, key: &K) -> Result<(), PersistError>;

    /// Removes entries last updated more than `max_age` ago, returning how
    /// many were removed.
    async fn cleanup(
        &self,
        ctx: &CancellationToken,
        max_age: Duration,
    ) -> Result<usize, PersistError>;

    /// Removes every entry owned by this cache's namespace, returning how
    /// many were removed.
    async fn flush(&self, ctx: &CancellationToken) -> Result<usize, PersistError>;

    /// Returns the number of stored entries. Advisory; may be O(N).
    async fn len(&self, ctx: &CancellationToken) -> Result<usize, PersistError>;

    /// Streams up to `limit` recently updated entries (`0` = all).
    ///
    /// Item-level errors are yielded in-stream so a partially readable
    /// backend can still warm the cache with what it has.
    async fn stream_recent(
        &self,
        ctx: &CancellationToken,
        limit: usize,
    ) -> Result<BoxStream<'static, Result<StoredEntry<K, V>, PersistError>>, PersistError>;

    /// Describes where `key` would be stored (a path, an object name, a
    /// Redis key). Diagnostic only; must be pure.
    fn location(&self, key: &K) -> String;

    /// Releases backend resources. Idempotent.
    async fn close(&self) -> Result<(), PersistError>;
}
