//! One S3-FIFO partition of the memory tier.
//!
//! A shard owns every entry routed to it and is protected by a single mutex
//! held by the [`MemoryTier`](crate::memory::MemoryTier). Internally it is
//! the classic three-structure S3-FIFO layout:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                            Shard<K, V>                                │
//! │                                                                       │
//! │  by_key: FxHashMap<K, SlotId>        arena: SlotArena<Entry<K, V>>    │
//! │  ┌──────────┬────────┐              ┌────────┬──────────────────────┐ │
//! │  │ "job:17" │ id_4   │─────────────►│ id_4   │ value, expiry, freq, │ │
//! │  │ "job:9"  │ id_0   │─────────────►│ id_0   │ queue tag, prev/next │ │
//! │  └──────────┴────────┘              └────────┴──────────────────────┘ │
//! │                                                                       │
//! │  SMALL (admission FIFO)              MAIN (protected FIFO)            │
//! │  head ──► oldest … newest ◄── tail   head ──► oldest … newest ◄── tail│
//! │       evict here        insert            evict here     promote /    │
//! │                                                          second-chance│
//! │                                                                       │
//! │  ghost: GhostFilter<K>   keys recently evicted from SMALL, unread     │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries are reachable through exactly two aliased paths (the key map and
//! one of the two queues), both of which store [`SlotId`] handles into the
//! arena, so there are no reference cycles and no per-entry allocation once
//! the arena is warm.
//!
//! ## Flows
//!
//! ```text
//! set(key, value, expiry):
//!   key present   → update value/expiry in place, bump freq; no queue move
//!   key in ghost  → admit straight into MAIN, freq 0 (ghost entry ages out)
//!   otherwise     → admit into SMALL, freq 0
//!   before append → while len ≥ capacity: one eviction step
//!
//! get(key, now):
//!   miss, or entry expired → None (expired entries are left in place)
//!   hit → bump freq (saturating at MAX_FREQ), return a clone
//!
//! eviction step (exactly one queue pop):
//!   |small| ≥ small_cap (or main empty):
//!     pop oldest small; freq > 0 → reset freq, promote to MAIN tail
//!                      freq = 0 → drop entry, record key in ghost
//!   else:
//!     pop oldest main;  freq > 0 → decrement, requeue at MAIN tail
//!                      freq = 0 → drop entry (no ghost)
//! ```
//!
//! Expiry is lazy: a read observing an expired entry reports a miss and
//! leaves the entry untouched; the slot is reclaimed by a later `set` of the
//! same key, by eviction, by [`cleanup`](Shard::cleanup), or by
//! [`flush`](Shard::flush).

use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::clock::is_expired;
use crate::ds::{GhostFilter, SlotArena, SlotId};

/// Saturation cap for the per-entry frequency counter (2 bits).
pub(crate) const MAX_FREQ: u8 = 3;

/// Which FIFO queue an entry currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueKind {
    Small,
    Main,
}

/// One cached record. The `prev`/`next` links are the intrusive queue.
#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
    /// Absolute expiry in nanoseconds since the epoch; `0` = never expires.
    expiry: u64,
    freq: u8,
    queue: QueueKind,
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

/// Head/tail/length bookkeeping for one intrusive FIFO.
#[derive(Debug, Default, Clone, Copy)]
struct FifoQueue {
    /// Oldest entry; eviction pops here.
    head: Option<SlotId>,
    /// Newest entry; insertion appends here.
    tail: Option<SlotId>,
    len: usize,
}

/// An independent S3-FIFO cache partition.
///
/// Not synchronized; the owning tier wraps each shard in a mutex.
#[derive(Debug)]
pub(crate) struct Shard<K, V> {
    capacity: usize,
    small_cap: usize,
    by_key: FxHashMap<K, SlotId>,
    arena: SlotArena<Entry<K, V>>,
    small: FifoQueue,
    main: FifoQueue,
    ghost: GhostFilter<K>,
}

impl<K, V> Shard<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a shard holding up to `capacity` entries.
    ///
    /// `small_cap` and `ghost_cap` are clamped to at least 1 so the queue
    /// geometry stays meaningful at tiny capacities.
    pub(crate) fn new(capacity: usize, small_cap: usize, ghost_cap: usize) -> Self {
        debug_assert!(capacity > 0, "shard capacity must be nonzero");
        Self {
            capacity,
            small_cap: small_cap.clamp(1, capacity),
            by_key: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            arena: SlotArena::with_capacity(capacity),
            small: FifoQueue::default(),
            main: FifoQueue::default(),
            ghost: GhostFilter::new(ghost_cap.max(1)),
        }
    }

    /// Returns the number of live entries (including not-yet-reclaimed
    /// expired ones).
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Returns the shard's entry capacity.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Looks up `key`, treating entries past their expiry as absent.
    ///
    /// A hit bumps the frequency counter (saturating at [`MAX_FREQ`]); an
    /// expired entry is reported as a miss and left in place.
    pub(crate) fn get(&mut self, key: &K, now: u64) -> Option<V> {
        let id = *self.by_key.get(key)?;
        let entry = self.arena.get_mut(id)?;
        if is_expired(entry.expiry, now) {
            return None;
        }
        if entry.freq < MAX_FREQ {
            entry.freq += 1;
        }
        Some(entry.value.clone())
    }

    /// Inserts or updates `key`.
    ///
    /// New keys remembered by the ghost filter are admitted directly into
    /// the main queue; other new keys enter the small queue. An existing
    /// entry is updated in place without moving between queues.
    pub(crate) fn set(&mut self, key: K, value: V, expiry: u64) {
        if let Some(&id) = self.by_key.get(&key) {
            if let Some(entry) = self.arena.get_mut(id) {
                entry.value = value;
                entry.expiry = expiry;
                if entry.freq < MAX_FREQ {
                    entry.freq += 1;
                }
                return;
            }
        }

        // The ghost entry is intentionally left in; it ages out with its
        // generation.
        let remembered = self.ghost.contains(&key);

        while self.by_key.len() >= self.capacity {
            self.evict_once();
        }

        let queue = if remembered {
            QueueKind::Main
        } else {
            QueueKind::Small
        };
        let id = self.arena.insert(Entry {
            key: key.clone(),
            value,
            expiry,
            freq: 0,
            queue,
            prev: None,
            next: None,
        });
        self.by_key.insert(key, id);
        self.push_tail(queue, id);
    }

    /// Removes `key`, returning `true` if it was present.
    ///
    /// Explicit removal never records the key in the ghost filter.
    pub(crate) fn remove(&mut self, key: &K) -> bool {
        let Some(id) = self.by_key.remove(key) else {
            return false;
        };
        self.unlink(id);
        self.arena.remove(id);
        true
    }

    /// Physically removes every expired entry, returning how many.
    pub(crate) fn cleanup(&mut self, now: u64) -> usize {
        let expired: Vec<K> = self
            .arena
            .iter()
            .filter(|(_, entry)| is_expired(entry.expiry, now))
            .map(|(_, entry)| entry.key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    /// Drops every entry, queue link, and ghost key; returns the number of
    /// entries removed.
    pub(crate) fn flush(&mut self) -> usize {
        let removed = self.by_key.len();
        self.by_key.clear();
        self.arena.clear();
        self.small = FifoQueue::default();
        self.main = FifoQueue::default();
        self.ghost.clear();
        removed
    }

    // ------------------------------------------------------------------
    // Eviction
    // ------------------------------------------------------------------

    /// Runs exactly one eviction step: one queue pop, ending in a
    /// promotion, a second-chance requeue, or a removal.
    fn evict_once(&mut self) {
        if self.small.len >= self.small_cap || self.main.len == 0 {
            self.evict_small_step();
        } else {
            self.evict_main_step();
        }
    }

    fn evict_small_step(&mut self) {
        let Some(id) = self.pop_head(QueueKind::Small) else {
            return;
        };
        let freq = self.arena.get(id).map_or(0, |entry| entry.freq);
        if freq > 0 {
            // Earned at least one read while on probation: promote.
            if let Some(entry) = self.arena.get_mut(id) {
                entry.freq = 0;
            }
            self.push_tail(QueueKind::Main, id);
        } else if let Some(entry) = self.arena.remove(id) {
            self.by_key.remove(&entry.key);
            self.ghost.record(entry.key);
        }
    }

    fn evict_main_step(&mut self) {
        let Some(id) = self.pop_head(QueueKind::Main) else {
            return;
        };
        let freq = self.arena.get(id).map_or(0, |entry| entry.freq);
        if freq > 0 {
            // Second chance: pay one frequency unit and requeue.
            if let Some(entry) = self.arena.get_mut(id) {
                entry.freq -= 1;
            }
            self.push_tail(QueueKind::Main, id);
        } else if let Some(entry) = self.arena.remove(id) {
            // Main evictions had their chance; the ghost only remembers
            // keys evicted from small.
            self.by_key.remove(&entry.key);
        }
    }

    // ------------------------------------------------------------------
    // Intrusive queue plumbing
    // ------------------------------------------------------------------

    #[inline]
    fn queue(&self, kind: QueueKind) -> &FifoQueue {
        match kind {
            QueueKind::Small => &self.small,
            QueueKind::Main => &self.main,
        }
    }

    #[inline]
    fn queue_mut(&mut self, kind: QueueKind) -> &mut FifoQueue {
        match kind {
            QueueKind::Small => &mut self.small,
            QueueKind::Main => &mut self.main,
        }
    }

    /// Appends `id` at the tail (newest end) of `kind`.
    fn push_tail(&mut self, kind: QueueKind, id: SlotId) {
        let old_tail = self.queue(kind).tail;
        if let Some(entry) = self.arena.get_mut(id) {
            entry.queue = kind;
            entry.prev = old_tail;
            entry.next = None;
        }
        if let Some(tail_id) = old_tail {
            if let Some(tail) = self.arena.get_mut(tail_id) {
                tail.next = Some(id);
            }
        }
        let queue = self.queue_mut(kind);
        if queue.head.is_none() {
            queue.head = Some(id);
        }
        queue.tail = Some(id);
        queue.len += 1;
    }

    /// Detaches the oldest entry of `kind` and returns its handle. The
    /// entry stays in the arena and the key map.
    fn pop_head(&mut self, kind: QueueKind) -> Option<SlotId> {
        let id = self.queue(kind).head?;
        self.unlink(id);
        Some(id)
    }

    /// Detaches `id` from whichever queue its tag names.
    fn unlink(&mut self, id: SlotId) {
        let Some((kind, prev, next)) = self
            .arena
            .get(id)
            .map(|entry| (entry.queue, entry.prev, entry.next))
        else {
            return;
        };

        match prev {
            Some(prev_id) => {
                if let Some(entry) = self.arena.get_mut(prev_id) {
                    entry.next = next;
                }
            },
            None => self.queue_mut(kind).head = next,
        }
        match next {
            Some(next_id) => {
                if let Some(entry) = self.arena.get_mut(next_id) {
                    entry.prev = prev;
                }
            },
            None => self.queue_mut(kind).tail = prev,
        }
        self.queue_mut(kind).len -= 1;

        if let Some(entry) = self.arena.get_mut(id) {
            entry.prev = None;
            entry.next = None;
        }
    }

    // ------------------------------------------------------------------
    // Invariant checking (debug builds)
    // ------------------------------------------------------------------

    /// Validates every structural invariant of the shard.
    ///
    /// Checked: queue length counters against walked lengths, map size
    /// against queue totals, queue tags, link symmetry, map↔arena handle
    /// agreement, frequency bounds, and the capacity bound.
    #[cfg(any(test, debug_assertions))]
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        if self.by_key.len() != self.small.len + self.main.len {
            return Err(format!(
                "map holds {} entries but queues hold {} + {}",
                self.by_key.len(),
                self.small.len,
                self.main.len
            ));
        }
        if self.by_key.len() > self.capacity {
            return Err(format!(
                "{} entries exceed capacity {}",
                self.by_key.len(),
                self.capacity
            ));
        }

        self.check_queue(QueueKind::Small, &self.small)?;
        self.check_queue(QueueKind::Main, &self.main)?;

        for (key, &id) in &self.by_key {
            match self.arena.get(id) {
                Some(entry) if entry.key == *key => {},
                Some(_) => return Err("map handle points at a different key".into()),
                None => return Err("map handle points at a dead slot".into()),
            }
        }
        self.arena.check_invariants();
        Ok(())
    }

    #[cfg(any(test, debug_assertions))]
    fn check_queue(&self, kind: QueueKind, queue: &FifoQueue) -> Result<(), String> {
        if queue.head.is_none() != queue.tail.is_none() {
            return Err(format!("{kind:?} queue head/tail disagree about emptiness"));
        }

        let mut walked = 0;
        let mut prev: Option<SlotId> = None;
        let mut cursor = queue.head;
        while let Some(id) = cursor {
            let entry = self
                .arena
                .get(id)
                .ok_or_else(|| format!("{kind:?} queue links a dead slot"))?;
            if entry.queue != kind {
                return Err(format!(
                    "entry tagged {:?} found in {kind:?} queue",
                    entry.queue
                ));
            }
            if entry.prev != prev {
                return Err(format!("{kind:?} queue back-link broken"));
            }
            if entry.freq > MAX_FREQ {
                return Err(format!("frequency {} above cap {}", entry.freq, MAX_FREQ));
            }
            if !self.by_key.contains_key(&entry.key) {
                return Err(format!("{kind:?} queue entry missing from map"));
            }
            if entry.next.is_none() && queue.tail != Some(id) {
                return Err(format!("{kind:?} queue tail pointer stale"));
            }
            walked += 1;
            if walked > queue.len {
                return Err(format!("{kind:?} queue walk exceeded recorded length"));
            }
            prev = Some(id);
            cursor = entry.next;
        }
        if walked != queue.len {
            return Err(format!(
                "{kind:?} queue walked {walked} entries, counter says {}",
                queue.len
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Test-only introspection
    // ------------------------------------------------------------------

    #[cfg(test)]
    fn small_len(&self) -> usize {
        self.small.len
    }

    #[cfg(test)]
    fn main_len(&self) -> usize {
        self.main.len
    }

    #[cfg(test)]
    fn in_main(&self, key: &K) -> bool {
        self.by_key
            .get(key)
            .and_then(|&id| self.arena.get(id))
            .is_some_and(|entry| entry.queue == QueueKind::Main)
    }
}
