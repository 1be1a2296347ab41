//! Convenience re-exports for typical use.
//!
//! ```
//! use tierkit::prelude::*;
//! ```

pub use crate::builder::CacheBuilder;
pub use crate::cache::Cache;
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::error::{CacheError, ConfigError, PersistError};
pub use crate::memory::MemoryTier;
pub use crate::persist::{PersistenceTier, StoredEntry};
