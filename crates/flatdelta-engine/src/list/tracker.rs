//! The tracked list and its pending log.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, trace};

use flatdelta_pool::{Handle, Identity, IdentityAllocator, Pool};
use flatdelta_types::{DeltaOperation, InstanceId, ListDelta, ListDeltaEntry};

use crate::config::TrackerConfig;
use crate::element::ListElement;
use crate::error::{EngineError, EngineResult};
use crate::list::compact::{compact, PendingOp};
use crate::list::record::DeltaRecord;

struct ListItem<T> {
    value: T,
    identity: Identity,
    /// Most recent pending record concerning this item.
    last_delta: Option<Handle>,
}

/// A list that journals every structural mutation and emits a compacted
/// delta of them.
///
/// Each mutation updates the backing sequence immediately and appends one
/// record to the pending log. [`get_delta`](Self::get_delta) compacts the log
/// in place; [`update_reference_state`](Self::update_reference_state)
/// discards it.
pub struct ListDeltaTracker<T: ListElement> {
    ctx: T::Context,
    instance: InstanceId,
    items: Vec<ListItem<T>>,
    log: Vec<Handle>,
    records: Pool<DeltaRecord<T::Delta>>,
    identities: IdentityAllocator,
    config: TrackerConfig,
}

impl<T: ListElement> ListDeltaTracker<T> {
    /// Create an empty, reconciled list.
    pub fn new(ctx: T::Context) -> Self {
        Self::with_config(ctx, TrackerConfig::default())
    }

    pub fn with_config(ctx: T::Context, config: TrackerConfig) -> Self {
        Self {
            ctx,
            instance: InstanceId::next(),
            items: Vec::new(),
            log: Vec::new(),
            records: Pool::with_capacity(config.record_capacity),
            identities: IdentityAllocator::with_capacity(config.identity_capacity),
            config,
        }
    }

    /// Build a reconciled list holding `elements`; nothing is pending.
    pub fn from_elements(ctx: T::Context, elements: impl IntoIterator<Item = T>) -> Self {
        let mut list = Self::new(ctx);
        for value in elements {
            let identity = list.identities.allocate();
            list.items.push(ListItem {
                value,
                identity,
                last_delta: None,
            });
        }
        list
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn context(&self) -> &T::Context {
        &self.ctx
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index).map(|item| &item.value)
    }

    /// Mutable access to a reference element.
    ///
    /// Edits made through it are picked up by the element's own delta. Value
    /// elements must go through [`set`](Self::set) instead.
    pub fn get_mut(&mut self, index: usize) -> EngineResult<&mut T> {
        if !T::REFERENCE {
            return Err(EngineError::ValueElementMutation);
        }
        let len = self.items.len();
        self.items
            .get_mut(index)
            .map(|item| &mut item.value)
            .ok_or(EngineError::IndexOutOfRange { index, len })
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter().map(|item| &item.value)
    }

    /// Full wire form of every element, in order.
    pub fn to_wire_vec(&self) -> Vec<T::Wire> {
        self.iter().map(ListElement::to_wire).collect()
    }

    /// Number of records in the pending log.
    pub fn pending_len(&self) -> usize {
        self.log.len()
    }

    /// Whether a pending record still concerns the item at `index`.
    pub fn has_pending_changes(&self, index: usize) -> bool {
        self.items
            .get(index)
            .and_then(|item| item.last_delta)
            .is_some_and(|h| self.records.contains(h))
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    pub fn push(&mut self, value: T) {
        let index = self.items.len();
        self.insert_unchecked(index, value);
    }

    /// Insert `value` so that it ends up at `index`.
    pub fn insert(&mut self, index: usize, value: T) -> EngineResult<()> {
        self.check(index, self.items.len() + 1)?;
        self.insert_unchecked(index, value);
        Ok(())
    }

    /// Replace the element at `index`. Nothing is recorded if `value` is the
    /// same element.
    pub fn set(&mut self, index: usize, value: T) -> EngineResult<()> {
        self.check(index, self.items.len())?;
        self.replace_unchecked(index, value);
        Ok(())
    }

    /// Move the element at `current` to before the element now at `new`;
    /// `new == len` moves it to the end.
    pub fn move_item(&mut self, current: usize, new: usize) -> EngineResult<()> {
        self.check(current, self.items.len())?;
        self.check(new, self.items.len() + 1)?;
        self.move_unchecked(current, new);
        Ok(())
    }

    pub fn remove_at(&mut self, index: usize) -> EngineResult<T> {
        self.check(index, self.items.len())?;
        Ok(self.remove_unchecked(index))
    }

    /// Drop every element and the whole pending log; the delta becomes a
    /// single `Clear` followed by whatever is recorded afterwards.
    pub fn clear(&mut self) {
        for h in self.log.drain(..) {
            self.records.release(h);
        }
        for item in self.items.drain(..) {
            self.identities.release(item.identity);
        }
        let h = self.records.insert(DeltaRecord::default());
        self.log.push(h);
    }

    fn check(&self, index: usize, bound: usize) -> EngineResult<()> {
        if index < bound {
            Ok(())
        } else {
            Err(EngineError::IndexOutOfRange {
                index,
                len: self.items.len(),
            })
        }
    }

    fn insert_unchecked(&mut self, index: usize, value: T) {
        let identity = self.identities.allocate();
        let h = self.record(DeltaOperation::Insert, identity, 0, index);
        self.items.insert(
            index,
            ListItem {
                value,
                identity,
                last_delta: Some(h),
            },
        );
    }

    fn replace_unchecked(&mut self, index: usize, value: T) {
        if self.items[index].value.same_element(&value) {
            return;
        }
        let identity = self.items[index].identity;
        let h = self.record(DeltaOperation::Replace, identity, index, 0);
        let item = &mut self.items[index];
        item.value = value;
        item.last_delta = Some(h);
    }

    fn move_unchecked(&mut self, current: usize, new: usize) {
        let identity = self.items[current].identity;
        let h = self.record(DeltaOperation::Move, identity, current, new);
        let mut item = self.items.remove(current);
        item.last_delta = Some(h);
        let target = if new > current { new - 1 } else { new };
        self.items.insert(target, item);
    }

    fn remove_unchecked(&mut self, index: usize) -> T {
        let identity = self.items[index].identity;
        self.record(DeltaOperation::Remove, identity, index, 0);
        let item = self.items.remove(index);
        self.identities.release(item.identity);
        item.value
    }

    fn record(
        &mut self,
        op: DeltaOperation,
        identity: Identity,
        current_index: usize,
        new_index: usize,
    ) -> Handle {
        let h = self.records.insert(DeltaRecord {
            op,
            item: Some(identity),
            current_index,
            new_index,
            delta: None,
        });
        self.log.push(h);
        h
    }

    // ---------------------------------------------------------------
    // Delta
    // ---------------------------------------------------------------

    /// Compact the pending log and return it, or `None` if nothing changed.
    ///
    /// The live log keeps its compacted form, so calling this again without
    /// intervening mutation returns an equal delta.
    pub fn get_delta(&mut self) -> Option<ListDelta<T::Wire, T::Delta>> {
        let raw = self.log.len();
        if T::REFERENCE {
            self.release_modifications();
        }
        self.compact_log();
        if T::REFERENCE {
            self.append_modifications();
        }
        self.relink();

        debug!(
            instance = %self.instance,
            raw,
            compacted = self.log.len(),
            "computed list delta"
        );

        if self.log.is_empty() {
            return None;
        }
        Some(self.emit())
    }

    fn compact_log(&mut self) {
        let mut ops: Vec<PendingOp<Handle, Identity>> = self
            .log
            .iter()
            .filter_map(|&h| {
                self.records.get(h).map(|r| PendingOp {
                    key: h,
                    op: r.op,
                    item: r.item,
                    current_index: r.current_index,
                    new_index: r.new_index,
                })
            })
            .collect();

        for h in compact(&mut ops) {
            self.records.release(h);
        }

        self.log.clear();
        for op in ops {
            if let Some(rec) = self.records.get_mut(op.key) {
                rec.op = op.op;
                rec.current_index = op.current_index;
                rec.new_index = op.new_index;
            }
            self.log.push(op.key);
        }
    }

    /// Drop the `Modify` records of an earlier call; they are regenerated
    /// from the elements after compaction.
    fn release_modifications(&mut self) {
        let log = std::mem::take(&mut self.log);
        for h in log {
            match self.records.get(h) {
                Some(rec) if rec.op == DeltaOperation::Modify => {
                    self.records.release(h);
                }
                Some(_) => self.log.push(h),
                None => {}
            }
        }
    }

    /// Append one `Modify` per item whose content changed.
    ///
    /// Items with an `Insert` or `Replace` record are skipped: those carry
    /// the element's current value already.
    fn append_modifications(&mut self) {
        let carried: HashSet<Identity> = self
            .log
            .iter()
            .filter_map(|&h| self.records.get(h))
            .filter(|r| matches!(r.op, DeltaOperation::Insert | DeltaOperation::Replace))
            .filter_map(|r| r.item)
            .collect();

        for (index, item) in self.items.iter_mut().enumerate() {
            if carried.contains(&item.identity) {
                continue;
            }
            if let Some(delta) = item.value.content_delta() {
                let h = self.records.insert(DeltaRecord {
                    op: DeltaOperation::Modify,
                    item: Some(item.identity),
                    current_index: index,
                    new_index: 0,
                    delta: Some(delta),
                });
                self.log.push(h);
            }
        }
    }

    fn relink(&mut self) {
        let positions = self.positions();
        for item in &mut self.items {
            item.last_delta = None;
        }
        for &h in &self.log {
            let pos = self
                .records
                .get(h)
                .and_then(|r| r.item)
                .and_then(|id| positions.get(&id));
            if let Some(&pos) = pos {
                self.items[pos].last_delta = Some(h);
            }
        }
    }

    fn positions(&self) -> HashMap<Identity, usize> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.identity, i))
            .collect()
    }

    fn emit(&self) -> ListDelta<T::Wire, T::Delta> {
        let positions = self.positions();
        self.log
            .iter()
            .filter_map(|&h| self.records.get(h))
            .map(|rec| {
                let (current_index, new_index) = match rec.op {
                    DeltaOperation::Insert => (-1, wire_index(rec.new_index)),
                    DeltaOperation::Move => {
                        (wire_index(rec.current_index), wire_index(rec.new_index))
                    }
                    DeltaOperation::Replace | DeltaOperation::Remove | DeltaOperation::Modify => {
                        (wire_index(rec.current_index), -1)
                    }
                    DeltaOperation::Clear => (-1, -1),
                };
                let base_value = match rec.op {
                    DeltaOperation::Insert | DeltaOperation::Replace => rec
                        .item
                        .and_then(|id| positions.get(&id))
                        .map(|&pos| self.items[pos].value.to_wire()),
                    _ => None,
                };
                ListDeltaEntry {
                    operation: rec.op,
                    current_index,
                    new_index,
                    base_value,
                    delta_value: rec.delta.clone(),
                }
            })
            .collect()
    }

    /// Replay a delta through the tracked mutation paths.
    ///
    /// Entries with out-of-range indices or a missing base value are skipped,
    /// as is a `Modify` without a delta.
    pub fn apply_delta(&mut self, delta: Option<&[ListDeltaEntry<T::Wire, T::Delta>]>) {
        let Some(entries) = delta else {
            return;
        };
        for entry in entries {
            self.apply_entry(entry);
        }
    }

    fn apply_entry(&mut self, entry: &ListDeltaEntry<T::Wire, T::Delta>) {
        let len = self.items.len();
        let current = usize::try_from(entry.current_index).ok();
        let new = usize::try_from(entry.new_index).ok();

        match entry.operation {
            DeltaOperation::Insert => match (new, &entry.base_value) {
                (Some(i), Some(wire)) if i <= len => {
                    let value = T::from_wire(&self.ctx, wire);
                    self.insert_unchecked(i, value);
                }
                _ => skipped(entry, len),
            },
            DeltaOperation::Replace => match (current, &entry.base_value) {
                (Some(i), Some(wire)) if i < len => {
                    let value = T::from_wire(&self.ctx, wire);
                    self.replace_unchecked(i, value);
                }
                _ => skipped(entry, len),
            },
            DeltaOperation::Move => match (current, new) {
                (Some(c), Some(n)) if c < len && n <= len => self.move_unchecked(c, n),
                _ => skipped(entry, len),
            },
            DeltaOperation::Remove => match current {
                Some(i) if i < len => {
                    self.remove_unchecked(i);
                }
                _ => skipped(entry, len),
            },
            DeltaOperation::Modify => match (current, &entry.delta_value) {
                (Some(i), Some(delta)) if i < len => {
                    self.items[i].value.apply_content_delta(delta);
                }
                _ => skipped(entry, len),
            },
            DeltaOperation::Clear => self.clear(),
        }
    }

    /// Reconcile: nested elements take their own snapshots and every pending
    /// record goes back to the pool.
    pub fn update_reference_state(&mut self) {
        for item in &mut self.items {
            item.value.update_reference_state();
            item.last_delta = None;
        }
        let released = self.log.len();
        for h in self.log.drain(..) {
            self.records.release(h);
        }
        self.records.trim(self.config.retained_records);
        debug!(instance = %self.instance, released, "reconciled list");
    }
}

fn wire_index(index: usize) -> i32 {
    i32::try_from(index).unwrap_or(i32::MAX)
}

fn skipped<V: fmt::Debug, D: fmt::Debug>(entry: &ListDeltaEntry<V, D>, len: usize) {
    trace!(
        operation = %entry.operation,
        current = entry.current_index,
        new = entry.new_index,
        len,
        "skipped list delta entry"
    );
}

impl<T: ListElement<Context = ()>> Default for ListDeltaTracker<T> {
    fn default() -> Self {
        Self::new(())
    }
}

/// A clone is a separate, reconciled list: it gets a fresh instance and
/// carries no pending records.
impl<T: ListElement + Clone> Clone for ListDeltaTracker<T> {
    fn clone(&self) -> Self {
        let mut list = Self::from_elements(self.ctx.clone(), self.iter().cloned());
        list.config = self.config.clone();
        list
    }
}

impl<T: ListElement + fmt::Debug> fmt::Debug for ListDeltaTracker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListDeltaTracker")
            .field("instance", &self.instance)
            .field("items", &self.items.iter().map(|i| &i.value).collect::<Vec<_>>())
            .field("pending", &self.log.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatdelta_types::NoDelta;
    use proptest::prelude::*;

    use DeltaOperation::{Clear, Insert, Modify, Move, Remove, Replace};

    fn list(values: &[i64]) -> ListDeltaTracker<i64> {
        ListDeltaTracker::from_elements((), values.iter().copied())
    }

    fn values(list: &ListDeltaTracker<i64>) -> Vec<i64> {
        list.iter().copied().collect()
    }

    fn ops<V, D>(delta: &[ListDeltaEntry<V, D>]) -> Vec<DeltaOperation> {
        delta.iter().map(|e| e.operation).collect()
    }

    /// Reference element with a single counter as content.
    #[derive(Clone, Debug)]
    struct Counter {
        instance: InstanceId,
        value: i64,
        snapshot: i64,
    }

    impl Counter {
        fn new(value: i64) -> Self {
            Self {
                instance: InstanceId::next(),
                value,
                snapshot: value,
            }
        }
    }

    impl ListElement for Counter {
        const REFERENCE: bool = true;
        type Context = ();
        type Wire = i64;
        type Delta = i64;

        fn same_element(&self, other: &Self) -> bool {
            self.instance == other.instance
        }

        fn to_wire(&self) -> i64 {
            self.value
        }

        fn from_wire(_ctx: &(), wire: &i64) -> Self {
            Counter::new(*wire)
        }

        fn content_delta(&mut self) -> Option<i64> {
            (self.value != self.snapshot).then_some(self.value)
        }

        fn apply_content_delta(&mut self, delta: &i64) {
            self.value = *delta;
        }

        fn update_reference_state(&mut self) {
            self.snapshot = self.value;
        }
    }

    fn counters(values: &[i64]) -> ListDeltaTracker<Counter> {
        ListDeltaTracker::from_elements((), values.iter().map(|&v| Counter::new(v)))
    }

    fn counter_values(list: &ListDeltaTracker<Counter>) -> Vec<i64> {
        list.iter().map(|c| c.value).collect()
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    #[test]
    fn mutations_update_backing_sequence() {
        let mut l = list(&[1, 2, 3]);
        l.push(4);
        l.insert(0, 0).unwrap();
        assert_eq!(values(&l), vec![0, 1, 2, 3, 4]);

        l.move_item(0, 5).unwrap();
        assert_eq!(values(&l), vec![1, 2, 3, 4, 0]);
        l.move_item(4, 1).unwrap();
        assert_eq!(values(&l), vec![1, 0, 2, 3, 4]);

        assert_eq!(l.remove_at(1).unwrap(), 0);
        l.set(0, 10).unwrap();
        assert_eq!(values(&l), vec![10, 2, 3, 4]);
        assert_eq!(l.pending_len(), 6);
    }

    #[test]
    fn out_of_range_is_misuse() {
        let mut l = list(&[1, 2]);
        assert_eq!(
            l.insert(3, 9),
            Err(EngineError::IndexOutOfRange { index: 3, len: 2 })
        );
        assert!(l.set(2, 9).is_err());
        assert!(l.remove_at(2).is_err());
        assert!(l.move_item(2, 0).is_err());
        assert!(l.move_item(0, 3).is_err());
        assert_eq!(l.pending_len(), 0);
    }

    #[test]
    fn value_elements_refuse_get_mut() {
        let mut l = list(&[1]);
        assert_eq!(l.get_mut(0), Err(EngineError::ValueElementMutation));

        let mut c = counters(&[1]);
        c.get_mut(0).unwrap().value = 5;
        assert!(matches!(
            c.get_mut(1),
            Err(EngineError::IndexOutOfRange { index: 1, len: 1 })
        ));
    }

    #[test]
    fn setting_same_element_records_nothing() {
        let mut l = list(&[1, 2]);
        l.set(1, 2).unwrap();
        assert_eq!(l.pending_len(), 0);
        assert!(l.get_delta().is_none());
    }

    #[test]
    fn pending_changes_follow_the_item() {
        let mut l = list(&[1, 2, 3]);
        l.set(2, 30).unwrap();
        l.move_item(2, 0).unwrap();
        assert!(l.has_pending_changes(0));
        assert!(!l.has_pending_changes(1));
        l.update_reference_state();
        assert!(!l.has_pending_changes(0));
    }

    // ---------------------------------------------------------------
    // Compaction
    // ---------------------------------------------------------------

    #[test]
    fn no_changes_no_delta() {
        let mut l = list(&[1, 2, 3]);
        assert!(l.get_delta().is_none());
    }

    #[test]
    fn insert_then_remove_cancels() {
        let mut l = list(&[1, 2]);
        l.insert(1, 7).unwrap();
        l.remove_at(1).unwrap();
        assert!(l.get_delta().is_none());
        assert_eq!(l.pending_len(), 0);
    }

    #[test]
    fn insert_then_move_is_one_insert() {
        let mut l = list(&[1, 2, 3]);
        l.push(4);
        l.move_item(3, 0).unwrap();
        let delta = l.get_delta().unwrap();
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].operation, Insert);
        assert_eq!(delta[0].current_index, -1);
        assert_eq!(delta[0].new_index, 0);
        assert_eq!(delta[0].base_value, Some(4));
    }

    #[test]
    fn move_then_move_is_one_move() {
        let mut l = list(&[1, 2, 3]);
        l.move_item(2, 0).unwrap();
        l.move_item(0, 2).unwrap();
        let delta = l.get_delta().unwrap();
        assert_eq!(ops(&delta), vec![Move]);

        let mut r = list(&[1, 2, 3]);
        r.apply_delta(Some(delta.as_slice()));
        assert_eq!(values(&r), values(&l));
    }

    #[test]
    fn replace_carries_latest_value() {
        let mut l = list(&[1, 2]);
        l.set(0, 10).unwrap();
        l.set(0, 11).unwrap();
        let delta = l.get_delta().unwrap();
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].operation, Replace);
        assert_eq!((delta[0].current_index, delta[0].new_index), (0, -1));
        assert_eq!(delta[0].base_value, Some(11));
    }

    #[test]
    fn clear_supersedes_history() {
        let mut l = list(&[1, 2, 3]);
        l.set(0, 5).unwrap();
        l.remove_at(1).unwrap();
        l.clear();
        l.push(9);
        let delta = l.get_delta().unwrap();
        assert_eq!(ops(&delta), vec![Clear, Insert]);
        assert_eq!((delta[0].current_index, delta[0].new_index), (-1, -1));

        let mut r = list(&[1, 2, 3]);
        r.apply_delta(Some(delta.as_slice()));
        assert_eq!(values(&r), vec![9]);
    }

    #[test]
    fn repeated_get_delta_is_stable() {
        let mut l = list(&[1, 2, 3, 4]);
        l.remove_at(0).unwrap();
        l.move_item(2, 0).unwrap();
        l.push(5);
        let first = l.get_delta();
        let pending = l.pending_len();
        assert_eq!(l.get_delta(), first);
        assert_eq!(l.pending_len(), pending);
    }

    #[test]
    fn reconciliation_recycles_records() {
        let mut l = list(&[1, 2, 3]);
        for i in 0..10 {
            l.push(i);
        }
        l.update_reference_state();
        assert_eq!(l.pending_len(), 0);
        assert!(l.get_delta().is_none());
        l.push(100);
        assert_eq!(l.get_delta().unwrap().len(), 1);
    }

    // ---------------------------------------------------------------
    // Apply
    // ---------------------------------------------------------------

    #[test]
    fn apply_none_is_noop() {
        let mut l = list(&[1]);
        l.apply_delta(None);
        assert_eq!(values(&l), vec![1]);
        assert_eq!(l.pending_len(), 0);
    }

    #[test]
    fn apply_skips_out_of_range_entries() {
        let mut l = list(&[1, 2]);
        let delta: ListDelta<i64, NoDelta> = vec![
            ListDeltaEntry {
                operation: Remove,
                current_index: 5,
                new_index: -1,
                base_value: None,
                delta_value: None,
            },
            ListDeltaEntry {
                operation: Insert,
                current_index: -1,
                new_index: 1,
                base_value: None,
                delta_value: None,
            },
            ListDeltaEntry {
                operation: Move,
                current_index: 0,
                new_index: 3,
                base_value: None,
                delta_value: None,
            },
            ListDeltaEntry {
                operation: Insert,
                current_index: -1,
                new_index: 2,
                base_value: Some(3),
                delta_value: None,
            },
        ];
        l.apply_delta(Some(delta.as_slice()));
        assert_eq!(values(&l), vec![1, 2, 3]);
    }

    #[test]
    fn relay_forwards_what_it_received() {
        let mut a = list(&[1, 2, 3]);
        let mut b = list(&[1, 2, 3]);
        let mut c = list(&[1, 2, 3]);

        a.remove_at(1).unwrap();
        a.insert(0, 7).unwrap();
        a.move_item(2, 0).unwrap();

        b.apply_delta(a.get_delta().as_deref());
        c.apply_delta(b.get_delta().as_deref());
        assert_eq!(values(&c), values(&a));
    }

    // ---------------------------------------------------------------
    // Reference elements
    // ---------------------------------------------------------------

    #[test]
    fn content_edits_surface_as_modify() {
        let mut l = counters(&[1, 2, 3]);
        l.get_mut(1).unwrap().value = 20;
        let delta = l.get_delta().unwrap();
        assert_eq!(ops(&delta), vec![Modify]);
        assert_eq!(delta[0].current_index, 1);
        assert_eq!(delta[0].delta_value, Some(20));

        let mut r = counters(&[1, 2, 3]);
        r.apply_delta(Some(delta.as_slice()));
        assert_eq!(counter_values(&r), vec![1, 20, 3]);
    }

    #[test]
    fn modify_follows_a_moved_item() {
        let mut l = counters(&[1, 2, 3]);
        l.get_mut(0).unwrap().value = 10;
        l.move_item(0, 3).unwrap();
        let delta = l.get_delta().unwrap();
        assert_eq!(ops(&delta), vec![Move, Modify]);
        assert_eq!(delta[1].current_index, 2);

        let mut r = counters(&[1, 2, 3]);
        r.apply_delta(Some(delta.as_slice()));
        assert_eq!(counter_values(&r), vec![2, 3, 10]);
    }

    #[test]
    fn inserted_items_carry_their_content() {
        let mut l = counters(&[1]);
        l.push(Counter::new(2));
        l.get_mut(1).unwrap().value = 5;
        let delta = l.get_delta().unwrap();
        assert_eq!(ops(&delta), vec![Insert]);
        assert_eq!(delta[0].base_value, Some(5));
    }

    #[test]
    fn modify_is_refreshed_not_duplicated() {
        let mut l = counters(&[1, 2]);
        l.get_mut(0).unwrap().value = 3;
        let first = l.get_delta();
        l.get_mut(0).unwrap().value = 4;
        let second = l.get_delta().unwrap();
        assert_ne!(first.as_deref(), Some(second.as_slice()));
        assert_eq!(ops(&second), vec![Modify]);
        assert_eq!(second[0].delta_value, Some(4));
    }

    #[test]
    fn reconciliation_recurses_into_elements() {
        let mut l = counters(&[1]);
        l.get_mut(0).unwrap().value = 3;
        l.update_reference_state();
        assert!(l.get_delta().is_none());
        assert_eq!(l.get(0).unwrap().snapshot, 3);
    }

    #[test]
    fn modify_on_missing_element_is_skipped() {
        let mut l = counters(&[1]);
        let delta: ListDelta<i64, i64> = vec![ListDeltaEntry {
            operation: Modify,
            current_index: 4,
            new_index: -1,
            base_value: None,
            delta_value: Some(9),
        }];
        l.apply_delta(Some(delta.as_slice()));
        assert_eq!(counter_values(&l), vec![1]);
    }

    #[test]
    fn clone_is_a_fresh_reconciled_list() {
        let mut l = list(&[1, 2]);
        l.push(3);
        let c = l.clone();
        assert_ne!(c.instance(), l.instance());
        assert_eq!(values(&c), vec![1, 2, 3]);
        assert_eq!(c.pending_len(), 0);
    }

    // ---------------------------------------------------------------
    // Differential
    // ---------------------------------------------------------------

    #[derive(Clone, Debug)]
    enum Step {
        Push(i64),
        Insert(usize, i64),
        Set(usize, i64),
        Move(usize, usize),
        Remove(usize),
        Edit(usize, i64),
        Clear,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            3 => any::<i8>().prop_map(|v| Step::Push(v.into())),
            3 => (any::<usize>(), any::<i8>()).prop_map(|(i, v)| Step::Insert(i, v.into())),
            2 => (any::<usize>(), any::<i8>()).prop_map(|(i, v)| Step::Set(i, v.into())),
            4 => (any::<usize>(), any::<usize>()).prop_map(|(c, n)| Step::Move(c, n)),
            3 => any::<usize>().prop_map(Step::Remove),
            3 => (any::<usize>(), any::<i8>()).prop_map(|(i, v)| Step::Edit(i, v.into())),
            1 => Just(Step::Clear),
        ]
    }

    /// Run `steps` on the tracked list and on a plain `Vec` model. Returns
    /// the number of records the raw operations appended.
    fn drive<T: ListElement + Clone>(
        list: &mut ListDeltaTracker<T>,
        model: &mut Vec<i64>,
        steps: &[Step],
        make: impl Fn(i64) -> T,
        mut edit: impl FnMut(&mut ListDeltaTracker<T>, usize, i64) -> bool,
    ) -> usize {
        let mut raw = 0;
        for s in steps {
            let len = model.len();
            match *s {
                Step::Push(v) => {
                    list.push(make(v));
                    model.push(v);
                    raw += 1;
                }
                Step::Insert(i, v) => {
                    let i = i % (len + 1);
                    list.insert(i, make(v)).unwrap();
                    model.insert(i, v);
                    raw += 1;
                }
                Step::Set(i, v) if len > 0 => {
                    let i = i % len;
                    list.set(i, make(v)).unwrap();
                    if T::REFERENCE || model[i] != v {
                        raw += 1;
                    }
                    model[i] = v;
                }
                Step::Move(c, n) if len > 0 => {
                    let c = c % len;
                    let n = n % (len + 1);
                    list.move_item(c, n).unwrap();
                    let item = model.remove(c);
                    model.insert(if n > c { n - 1 } else { n }, item);
                    raw += 1;
                }
                Step::Remove(i) if len > 0 => {
                    let i = i % len;
                    list.remove_at(i).unwrap();
                    model.remove(i);
                    raw += 1;
                }
                Step::Edit(i, v) if len > 0 => {
                    let i = i % len;
                    if edit(list, i, v) {
                        model[i] = v;
                        // Content edits surface as at most one Modify.
                        raw += 1;
                    }
                }
                Step::Clear => {
                    list.clear();
                    model.clear();
                    raw += 1;
                }
                _ => {}
            }
        }
        raw
    }

    proptest! {
        #[test]
        fn value_list_replica_converges(
            base in proptest::collection::vec(any::<i8>(), 0..8),
            rounds in proptest::collection::vec(proptest::collection::vec(step(), 0..20), 1..4),
        ) {
            let base: Vec<i64> = base.into_iter().map(i64::from).collect();
            let mut sender = list(&base);
            let mut receiver = list(&base);
            let mut model = base.clone();

            for steps in &rounds {
                let raw = drive(&mut sender, &mut model, steps, |v| v, |_, _, _| false);
                let delta = sender.get_delta();
                prop_assert!(delta.as_ref().map_or(0, Vec::len) <= raw);
                receiver.apply_delta(delta.as_deref());

                prop_assert_eq!(values(&sender), model.clone());
                prop_assert_eq!(values(&receiver), model.clone());

                sender.update_reference_state();
                receiver.update_reference_state();
            }
        }

        #[test]
        fn reference_list_replica_converges(
            base in proptest::collection::vec(any::<i8>(), 0..8),
            rounds in proptest::collection::vec(proptest::collection::vec(step(), 0..20), 1..4),
        ) {
            let base: Vec<i64> = base.into_iter().map(i64::from).collect();
            let mut sender = counters(&base);
            let mut receiver = counters(&base);
            let mut model = base.clone();

            for steps in &rounds {
                let raw = drive(&mut sender, &mut model, steps, Counter::new, |l, i, v| {
                    l.get_mut(i).unwrap().value = v;
                    true
                });
                let delta = sender.get_delta();
                prop_assert!(delta.as_ref().map_or(0, Vec::len) <= raw);
                receiver.apply_delta(delta.as_deref());

                prop_assert_eq!(counter_values(&sender), model.clone());
                prop_assert_eq!(counter_values(&receiver), model.clone());

                sender.update_reference_state();
                receiver.update_reference_state();
            }
        }
    }
}
