//! tierkit: a two-tier key/value cache for unreliable execution
//! environments.
//!
//! A bounded, sharded, scan-resistant S3-FIFO memory tier fronts an
//! optional durable [`PersistenceTier`]; the coordinator keeps the memory
//! tier authoritative ("reads never fail, writes may fail") and promotes
//! persistence hits into memory on read. See `DESIGN.md` for internal
//! architecture and the invariants each layer maintains.

pub mod builder;
pub mod cache;
pub mod clock;
pub mod ds;
pub mod error;
pub mod memory;
pub mod persist;
pub mod prelude;

pub use builder::CacheBuilder;
pub use cache::Cache;
pub use error::{CacheError, ConfigError, PersistError};
pub use memory::MemoryTier;
pub use persist::{PersistenceTier, StoredEntry};
