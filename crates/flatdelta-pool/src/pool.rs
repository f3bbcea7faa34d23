//! Generational free-list arena.
//!
//! [`Pool`] owns its entries in a `Vec` of slots and hands out [`Handle`]s.
//! Released slots are scrubbed and pushed on a free list; the next
//! [`acquire`](Pool::acquire) reuses the most recently freed slot. Each slot
//! carries a generation that is bumped on release, so a handle to a released
//! entry never resolves again, even after its slot is reused.

use std::fmt;

use tracing::debug;

/// Reset an entry to its neutral state before it returns to the free list.
pub trait Recycle {
    fn scrub(&mut self);
}

impl Recycle for () {
    fn scrub(&mut self) {}
}

/// Generation-tagged reference to a pool entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

struct Slot<T> {
    value: T,
    generation: u32,
    live: bool,
}

/// Occupancy counters for a [`Pool`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Entries currently handed out.
    pub live: usize,
    /// Scrubbed entries waiting for reuse.
    pub free: usize,
    /// Acquisitions served from the free list.
    pub reused: u64,
    /// Acquisitions that had to grow the pool.
    pub grown: u64,
}

/// Free-list arena of recyclable entries.
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    /// Generation given to newly created slots; stays above every generation
    /// ever handed out so that trimmed slots cannot be resurrected.
    next_epoch: u32,
    stats: PoolStats,
}

impl<T: Recycle + Default> Pool<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Reserve room for `capacity` entries. Slots are still created lazily.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            next_epoch: 0,
            stats: PoolStats::default(),
        }
    }

    /// Take a scrubbed entry, reusing a freed slot when one is available.
    pub fn acquire(&mut self) -> Handle {
        self.stats.live += 1;
        if let Some(index) = self.free.pop() {
            self.stats.free -= 1;
            self.stats.reused += 1;
            let slot = &mut self.slots[index as usize];
            slot.live = true;
            return Handle {
                index,
                generation: slot.generation,
            };
        }

        self.stats.grown += 1;
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            value: T::default(),
            generation: self.next_epoch,
            live: true,
        });
        Handle {
            index,
            generation: self.next_epoch,
        }
    }

    /// Take an entry and initialise it with `value`.
    pub fn insert(&mut self, value: T) -> Handle {
        let handle = self.acquire();
        self.slots[handle.index as usize].value = value;
        handle
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.slot(handle).is_some()
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slot(handle).map(|s| &s.value)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.live && slot.generation == handle.generation {
            Some(&mut slot.value)
        } else {
            None
        }
    }

    /// Scrub the entry and return its slot to the free list.
    ///
    /// Returns `false` for a stale or foreign handle.
    pub fn release(&mut self, handle: Handle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if !slot.live || slot.generation != handle.generation {
            return false;
        }
        slot.value.scrub();
        slot.live = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.next_epoch = self.next_epoch.max(slot.generation);
        self.free.push(handle.index);
        self.stats.live -= 1;
        self.stats.free += 1;
        true
    }

    /// Drop free slots beyond `retain` once nothing is live.
    ///
    /// With live entries outstanding the pool is left untouched, because
    /// slots cannot move without invalidating their handles.
    pub fn trim(&mut self, retain: usize) {
        if self.stats.live != 0 || self.slots.len() <= retain {
            return;
        }
        let dropped = self.slots.len() - retain;
        self.slots.truncate(retain);
        self.free.retain(|&i| (i as usize) < retain);
        self.stats.free = self.free.len();
        debug!(dropped, retained = retain, "trimmed pool");
    }

    pub fn live(&self) -> usize {
        self.stats.live
    }

    /// Number of slots ever created and still owned by the pool.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    fn slot(&self, handle: Handle) -> Option<&Slot<T>> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.live && s.generation == handle.generation)
    }
}

impl<T: Recycle + Default> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("slots", &self.slots.len())
            .field("stats", &self.stats)
            .finish()
    }
}
