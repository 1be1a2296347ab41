//! Internal data structures backing the memory tier.

pub mod ghost;
pub mod route;
pub mod slot_arena;

pub use ghost::GhostFilter;
pub use route::{KeyFastPath, ShardRouter};
pub use slot_arena::{SlotArena, SlotId};
