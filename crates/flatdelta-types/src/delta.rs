//! Delta shapes exchanged between peers.
//!
//! These are the wire forms of the engine's output: the sparse per-slot
//! [`RecordDelta`] of a record, the [`ListDeltaEntry`] sequence of a list, and
//! the [`UnionChange`] of a union. Field order within each struct is part of
//! the byte format.

use serde::{Deserialize, Serialize};

use crate::op::DeltaOperation;
use crate::schema::BYTE_INDEX_SLOTS;
use crate::value::Value;

/// Ordered set of dirty slot indices, split by index width.
///
/// Indices below 256 travel as bytes. `shorts` is `Some` exactly when the
/// record exposes more than 256 slots, even if no short index is dirty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirtyIndexSet {
    pub bytes: Vec<u8>,
    pub shorts: Option<Vec<u16>>,
}

impl DirtyIndexSet {
    /// Clear all indices and set the short list presence for a layout.
    pub fn reset(&mut self, wide: bool) {
        self.bytes.clear();
        match (&mut self.shorts, wide) {
            (Some(shorts), true) => shorts.clear(),
            (slot, true) => *slot = Some(Vec::new()),
            (slot, false) => *slot = None,
        }
    }

    /// Append a slot index. Indices must be pushed in ascending order.
    pub fn push(&mut self, slot: u16) {
        if usize::from(slot) < BYTE_INDEX_SLOTS {
            self.bytes.push(slot as u8);
        } else {
            self.shorts.get_or_insert_with(Vec::new).push(slot);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty() && self.shorts.as_ref().map_or(true, Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.bytes.len() + self.shorts.as_ref().map_or(0, Vec::len)
    }

    /// All indices, bytes first.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.bytes
            .iter()
            .map(|&b| u16::from(b))
            .chain(self.shorts.iter().flatten().copied())
    }

    pub fn contains(&self, slot: u16) -> bool {
        if usize::from(slot) < BYTE_INDEX_SLOTS {
            self.bytes.contains(&(slot as u8))
        } else {
            self.shorts.as_ref().is_some_and(|s| s.contains(&slot))
        }
    }
}

/// Sparse field-level patch for one record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordDelta {
    pub indices: DirtyIndexSet,
    /// One optional value per slot, in layout order.
    pub values: Vec<Option<SlotValue>>,
}

impl RecordDelta {
    pub fn new(slot_count: usize, wide: bool) -> Self {
        let mut delta = Self::default();
        delta.reset(slot_count, wide);
        delta
    }

    /// Scrub every index and value so the buffer can be refilled.
    pub fn reset(&mut self, slot_count: usize, wide: bool) {
        self.indices.reset(wide);
        self.values.clear();
        self.values.resize_with(slot_count, || None);
    }

    /// Mark a slot dirty and store its transmitted value.
    pub fn mark(&mut self, slot: u16, value: Option<SlotValue>) {
        self.indices.push(slot);
        let i = usize::from(slot);
        if i >= self.values.len() {
            self.values.resize_with(i + 1, || None);
        }
        self.values[i] = value;
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn is_dirty(&self, slot: u16) -> bool {
        self.indices.contains(slot)
    }

    pub fn value(&self, slot: u16) -> Option<&SlotValue> {
        self.values.get(usize::from(slot)).and_then(Option::as_ref)
    }
}

/// Payload of one dirty slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SlotValue {
    /// Full replacement value.
    Value(Value),
    /// Nested record delta for a same-instance table.
    Record(RecordDelta),
    /// Payload delta for a union whose discriminator did not change.
    Union(UnionDelta),
    /// Structural delta for a same-instance list.
    List(Vec<ListDeltaEntry<Value, ElementDelta>>),
}

/// Nested delta for the active variant of a union.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnionDelta {
    pub discriminator: u8,
    pub delta: RecordDelta,
}

/// Change produced by a union since its last reconciliation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum UnionChange {
    /// Discriminator or value payload changed: full replacement.
    Replaced(Value),
    /// Same discriminator, table payload patched in place.
    Patched(UnionDelta),
}

/// Content delta of a reference element inside a list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ElementDelta {
    Record(RecordDelta),
    Union(UnionChange),
}

/// Uninhabited content delta for value elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoDelta {}

/// One structural operation of a list delta.
///
/// Unused index operands are `-1`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListDeltaEntry<V, D> {
    pub operation: DeltaOperation,
    pub current_index: i32,
    pub new_index: i32,
    pub base_value: Option<V>,
    pub delta_value: Option<D>,
}

impl<V, D> ListDeltaEntry<V, D> {
    /// Rewrite the payload types, keeping operation and indices.
    pub fn map<V2, D2>(
        self,
        value: impl FnOnce(V) -> V2,
        delta: impl FnOnce(D) -> Option<D2>,
    ) -> ListDeltaEntry<V2, D2> {
        ListDeltaEntry {
            operation: self.operation,
            current_index: self.current_index,
            new_index: self.new_index,
            base_value: self.base_value.map(value),
            delta_value: self.delta_value.and_then(delta),
        }
    }
}

/// A complete list delta.
pub type ListDelta<V, D> = Vec<ListDeltaEntry<V, D>>;
