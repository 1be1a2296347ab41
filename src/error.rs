//! Error types for the cache and the persistence boundary.
//!
//! The taxonomy is deliberately small:
//!
//! - [`ConfigError`]: invalid construction parameters, surfaced by the
//!   builder and the fallible tier constructors.
//! - [`PersistError`]: anything a persistence tier can fail with: key
//!   validation, backend I/O, or cancellation.
//! - [`CacheError`]: what coordinator operations return to callers. Reads
//!   never produce one (persistence read failures degrade to misses);
//!   writes surface validation and persistence failures.
//!
//! Memory-tier operations are infallible by construction; structural
//! invariants are asserted in debug builds rather than reported at runtime.

use thiserror::Error;

/// Invalid cache configuration, reported at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid cache configuration: {0}")]
pub struct ConfigError(pub(crate) String);

impl ConfigError {
    /// Returns the reason the configuration was rejected.
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Failure at the persistence-tier boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    /// The key cannot be represented by this backend.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The backend failed to perform the operation.
    #[error("i/o failure: {0}")]
    Io(String),

    /// The operation was cancelled before completion.
    #[error("operation cancelled")]
    Cancelled,
}

/// Failure reported by a coordinator operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The key was rejected by the persistence tier's `validate_key`.
    ///
    /// Nothing was written to either tier.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The persistence write failed after the memory tier was updated.
    ///
    /// The value remains readable from memory in this process.
    #[error("persistence store failed: {0}")]
    Store(#[source] PersistError),

    /// The persistence flush failed; the memory tier was already cleared.
    #[error("persistence flush failed: {0}")]
    Flush(#[source] PersistError),

    /// Closing the persistence tier failed. Resources are released
    /// best-effort; retrying is not required.
    #[error("close persistence failed: {0}")]
    Close(#[source] PersistError),

    /// The operation was cancelled before completion.
    #[error("operation cancelled")]
    Cancelled,
}

impl CacheError {
    /// Maps a validation failure from the persistence boundary into the
    /// caller-facing invalid-key error.
    pub(crate) fn invalid_key(err: PersistError) -> Self {
        match err {
            PersistError::InvalidKey(reason) => CacheError::InvalidKey(reason),
            PersistError::Cancelled => CacheError::Cancelled,
            other => CacheError::InvalidKey(other.to_string()),
        }
    }

    /// Wraps a persistence write failure, passing cancellation through.
    pub(crate) fn store(err: PersistError) -> Self {
        match err {
            PersistError::Cancelled => CacheError::Cancelled,
            other => CacheError::Store(other),
        }
    }

    /// Wraps a persistence flush failure, passing cancellation through.
    pub(crate) fn flush(err: PersistError) -> Self {
        match err {
            PersistError::Cancelled => CacheError::Cancelled,
            other => CacheError::Flush(other),
        }
    }
}
