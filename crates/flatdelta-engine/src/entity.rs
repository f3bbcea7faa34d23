//! Dirty-field tracking for records.
//!
//! An [`Entity`] is one record instance: its current field values plus a
//! snapshot of them taken at the last reconciliation. [`Entity::get_delta`]
//! compares the two field by field and produces a sparse [`RecordDelta`];
//! [`Entity::apply_delta`] patches a replica with one.
//!
//! # Comparison rules
//!
//! - Scalars, strings and structs compare by value.
//! - Tables, unions and lists compare by instance. A new instance transmits
//!   its full value in the field's value slot; the same instance transmits
//!   its own nested delta, if any, in the companion delta slot.
//! - A union whose discriminator or value payload changed transmits its full
//!   value even when the instance is unchanged.
//!
//! Deprecated fields keep their slots but are never compared or applied.

use std::fmt;

use tracing::{debug, trace};

use flatdelta_types::{
    ElementKind, FieldDescriptor, FieldKind, InstanceId, RecordDelta, RecordType, SlotValue,
    UnionChange, Value,
};

use crate::element::ListElement;
use crate::error::{EngineError, EngineResult};
use crate::list::ListField;
use crate::union::UnionValue;

/// Current value of one field.
#[derive(Clone, Debug, Default)]
pub enum FieldValue {
    #[default]
    Absent,
    /// Scalar, string or struct.
    Value(Value),
    Table(Box<Entity>),
    Union(UnionValue),
    List(Box<ListField>),
    /// Fixed-length array, one entry per element.
    Array(Vec<FieldValue>),
}

impl FieldValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Reference identity of a table, union or list.
    pub fn instance(&self) -> Option<InstanceId> {
        match self {
            Self::Table(t) => Some(t.instance()),
            Self::Union(u) => Some(u.instance()),
            Self::List(l) => Some(l.instance()),
            Self::Absent | Self::Value(_) | Self::Array(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Absent => Value::Null,
            Self::Value(v) => v.clone(),
            Self::Table(t) => t.to_value(),
            Self::Union(u) => u.to_value(),
            Self::List(l) => l.to_value(),
            Self::Array(items) => Value::List(items.iter().map(Self::to_value).collect()),
        }
    }

    fn update_reference_state(&mut self) {
        match self {
            Self::Table(t) => t.update_reference_state(),
            Self::Union(u) => u.update_reference_state(),
            Self::List(l) => l.update_reference_state(),
            Self::Array(items) => items.iter_mut().for_each(Self::update_reference_state),
            Self::Absent | Self::Value(_) => {}
        }
    }
}

/// Retained copy of one field.
#[derive(Clone, Debug)]
enum Snapshot {
    Absent,
    Value(Value),
    Instance(InstanceId),
    Array(Vec<Snapshot>),
}

impl Snapshot {
    fn of(field: &FieldValue) -> Self {
        match field {
            FieldValue::Absent => Self::Absent,
            FieldValue::Value(v) => Self::Value(v.clone()),
            FieldValue::Array(items) => Self::Array(items.iter().map(Self::of).collect()),
            other => other.instance().map_or(Self::Absent, Self::Instance),
        }
    }

    fn value(&self) -> &Value {
        match self {
            Self::Value(v) => v,
            _ => &NULL,
        }
    }

    fn instance(&self) -> Option<InstanceId> {
        match self {
            Self::Instance(id) => Some(*id),
            _ => None,
        }
    }
}

static NULL: Value = Value::Null;

/// One tracked record instance.
pub struct Entity {
    ty: RecordType,
    instance: InstanceId,
    fields: Vec<FieldValue>,
    snapshot: Vec<Snapshot>,
}

impl Entity {
    /// A record with every field absent. Its snapshot is all-absent too, so
    /// the first delta carries exactly the fields set afterwards.
    pub fn new(ty: RecordType) -> Self {
        let fields = ty.descriptor().fields().iter().map(empty_field).collect();
        Self::with_fields(ty, fields)
    }

    /// Build a reconciled record from its full value.
    ///
    /// Missing trailing fields are absent, extra values are ignored, and a
    /// value that does not fit its field's kind leaves the field absent.
    pub fn from_value(ty: RecordType, value: &Value) -> Self {
        let items = match value {
            Value::Table(items) | Value::Struct(items) => items.as_slice(),
            _ => &[],
        };
        let fields = ty
            .descriptor()
            .fields()
            .iter()
            .enumerate()
            .map(|(i, fd)| match items.get(i) {
                Some(v) => build_field(&ty, fd, v),
                None => empty_field(fd),
            })
            .collect();
        let mut entity = Self::with_fields(ty, fields);
        entity.snapshot = entity.take_snapshot();
        entity
    }

    fn with_fields(ty: RecordType, fields: Vec<FieldValue>) -> Self {
        let snapshot = ty
            .descriptor()
            .fields()
            .iter()
            .map(|fd| Snapshot::of(&empty_field(fd)))
            .collect();
        Self {
            ty,
            instance: InstanceId::next(),
            fields,
            snapshot,
        }
    }

    pub fn record_type(&self) -> &RecordType {
        &self.ty
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn to_value(&self) -> Value {
        Value::Table(self.fields.iter().map(FieldValue::to_value).collect())
    }

    // ---------------------------------------------------------------
    // Field access
    // ---------------------------------------------------------------

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        let index = self.ty.descriptor().field_index(name)?;
        self.fields.get(index)
    }

    /// Scalar, string or struct value of a field.
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.field(name)? {
            FieldValue::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn table(&self, name: &str) -> Option<&Entity> {
        match self.field(name)? {
            FieldValue::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut Entity> {
        match self.field_mut(name)? {
            FieldValue::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn union(&self, name: &str) -> Option<&UnionValue> {
        match self.field(name)? {
            FieldValue::Union(u) => Some(u),
            _ => None,
        }
    }

    pub fn union_mut(&mut self, name: &str) -> Option<&mut UnionValue> {
        match self.field_mut(name)? {
            FieldValue::Union(u) => Some(u),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> Option<&ListField> {
        match self.field(name)? {
            FieldValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn list_mut(&mut self, name: &str) -> Option<&mut ListField> {
        match self.field_mut(name)? {
            FieldValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Table element of a fixed-length array.
    pub fn array_table_mut(&mut self, name: &str, index: usize) -> Option<&mut Entity> {
        match self.field_mut(name)? {
            FieldValue::Array(items) => match items.get_mut(index)? {
                FieldValue::Table(t) => Some(t),
                _ => None,
            },
            _ => None,
        }
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut FieldValue> {
        let index = self.ty.descriptor().field_index(name)?;
        self.fields.get_mut(index)
    }

    /// Assign a field after checking the value against its declared kind.
    pub fn set(&mut self, name: &str, value: FieldValue) -> EngineResult<()> {
        let index = self.locate(name)?;
        let fd = &self.ty.descriptor().fields()[index];
        let value = match (fd.kind, fd.fixed_length, value) {
            (FieldKind::Vector(element), Some(len), FieldValue::Array(items))
                if items.len() == usize::from(len)
                    && items.iter().all(|item| fits_element(&self.ty, element, item)) =>
            {
                FieldValue::Array(items)
            }
            (_, Some(_), _) => return Err(mismatch(fd)),
            (_, None, FieldValue::Value(Value::Null)) => FieldValue::Absent,
            (kind, None, value) if fits_field(&self.ty, kind, &value) => value,
            _ => return Err(mismatch(fd)),
        };
        self.fields[index] = value;
        Ok(())
    }

    /// Assign a scalar, string or struct field. `Value::Null` clears it.
    pub fn set_value(&mut self, name: &str, value: impl Into<Value>) -> EngineResult<()> {
        self.set(name, FieldValue::Value(value.into()))
    }

    /// Assign one element of a fixed-length array.
    pub fn set_array_element(
        &mut self,
        name: &str,
        index: usize,
        value: FieldValue,
    ) -> EngineResult<()> {
        let field = self.locate(name)?;
        let fd = &self.ty.descriptor().fields()[field];
        let (FieldKind::Vector(element), Some(len)) = (fd.kind, fd.fixed_length) else {
            return Err(mismatch(fd));
        };
        if index >= usize::from(len) {
            return Err(EngineError::IndexOutOfRange {
                index,
                len: usize::from(len),
            });
        }
        let value = match value {
            FieldValue::Value(Value::Null) => FieldValue::Absent,
            v if fits_element(&self.ty, element, &v) => v,
            _ => return Err(mismatch(fd)),
        };
        if let FieldValue::Array(items) = &mut self.fields[field] {
            items[index] = value;
        }
        Ok(())
    }

    /// Make an absent table field an empty table and return it.
    pub fn init_table(&mut self, name: &str) -> EngineResult<&mut Entity> {
        let index = self.locate(name)?;
        let fd = &self.ty.descriptor().fields()[index];
        let FieldKind::Table(r) = fd.kind else {
            return Err(mismatch(fd));
        };
        let field = &mut self.fields[index];
        if !matches!(field, FieldValue::Table(_)) {
            *field = FieldValue::Table(Box::new(Entity::new(self.ty.sibling(r))));
        }
        match field {
            FieldValue::Table(t) => Ok(t),
            _ => unreachable!("table field was just initialised"),
        }
    }

    /// Make an absent union field an empty union and return it.
    pub fn init_union(&mut self, name: &str) -> EngineResult<&mut UnionValue> {
        let index = self.locate(name)?;
        let fd = &self.ty.descriptor().fields()[index];
        let FieldKind::Union(u) = fd.kind else {
            return Err(mismatch(fd));
        };
        let field = &mut self.fields[index];
        if !matches!(field, FieldValue::Union(_)) {
            *field = FieldValue::Union(UnionValue::new(self.ty.union_type(u)));
        }
        match field {
            FieldValue::Union(v) => Ok(v),
            _ => unreachable!("union field was just initialised"),
        }
    }

    /// Make an absent list field an empty list and return it.
    pub fn init_list(&mut self, name: &str) -> EngineResult<&mut ListField> {
        let index = self.locate(name)?;
        let fd = &self.ty.descriptor().fields()[index];
        let (FieldKind::Vector(element), None) = (fd.kind, fd.fixed_length) else {
            return Err(mismatch(fd));
        };
        let field = &mut self.fields[index];
        if !matches!(field, FieldValue::List(_)) {
            *field = FieldValue::List(Box::new(ListField::for_element(&self.ty, element)));
        }
        match field {
            FieldValue::List(l) => Ok(l),
            _ => unreachable!("list field was just initialised"),
        }
    }

    fn locate(&self, name: &str) -> EngineResult<usize> {
        self.ty
            .descriptor()
            .field_index(name)
            .ok_or_else(|| EngineError::UnknownField {
                record: self.ty.descriptor().name().to_string(),
                field: name.to_string(),
            })
    }

    // ---------------------------------------------------------------
    // Delta
    // ---------------------------------------------------------------

    /// Sparse patch of every field changed since the last reconciliation.
    pub fn get_delta(&mut self) -> Option<RecordDelta> {
        let mut delta = RecordDelta::default();
        self.fill_delta(&mut delta).then_some(delta)
    }

    /// Like [`get_delta`](Self::get_delta) but reuses `out`. Every slot of
    /// `out` is rewritten; returns whether any slot is dirty.
    pub fn fill_delta(&mut self, out: &mut RecordDelta) -> bool {
        let desc = self.ty.descriptor();
        out.reset(desc.slot_count(), desc.uses_short_indices());

        for (index, fd) in desc.fields().iter().enumerate() {
            if fd.deprecated {
                continue;
            }
            let slot = desc.slot_of(index);
            let field = &mut self.fields[index];
            let snapshot = &self.snapshot[index];
            match (fd.kind, fd.fixed_length) {
                (FieldKind::Vector(element), Some(_)) => {
                    let (FieldValue::Array(items), Snapshot::Array(taken)) = (field, snapshot)
                    else {
                        continue;
                    };
                    let width = if element.is_reference() { 2 } else { 1 };
                    for (k, (item, taken)) in items.iter_mut().zip(taken).enumerate() {
                        let at = slot + (k * width) as u16;
                        if element.is_reference() {
                            diff_reference(item, taken, at, out);
                        } else {
                            diff_value(item, taken, at, out);
                        }
                    }
                }
                (FieldKind::Scalar(_) | FieldKind::Struct, _) => {
                    diff_value(field, snapshot, slot, out);
                }
                (FieldKind::Table(_) | FieldKind::Union(_) | FieldKind::Vector(_), None) => {
                    diff_reference(field, snapshot, slot, out);
                }
                (_, Some(_)) => {}
            }
        }

        !out.is_empty()
    }

    /// Patch this record with a delta produced by a peer.
    ///
    /// Slots beyond this record's layout are ignored, so peers with older or
    /// newer versions of the record interoperate on the shared fields.
    pub fn apply_delta(&mut self, delta: Option<&RecordDelta>) {
        let Some(delta) = delta else {
            return;
        };
        let desc = self.ty.descriptor();
        for (index, fd) in desc.fields().iter().enumerate() {
            if fd.deprecated {
                continue;
            }
            let slot = desc.slot_of(index);
            let field = &mut self.fields[index];
            match (fd.kind, fd.fixed_length) {
                (FieldKind::Vector(element), Some(_)) => {
                    let FieldValue::Array(items) = field else {
                        continue;
                    };
                    let width = if element.is_reference() { 2 } else { 1 };
                    for (k, item) in items.iter_mut().enumerate() {
                        let at = slot + (k * width) as u16;
                        if element.is_reference() {
                            apply_reference(&self.ty, element_field_kind(element), item, at, delta);
                        } else {
                            apply_value(item, at, delta);
                        }
                    }
                }
                (FieldKind::Scalar(_) | FieldKind::Struct, _) => apply_value(field, slot, delta),
                (kind, None) => apply_reference(&self.ty, kind, field, slot, delta),
                (_, Some(_)) => {}
            }
        }
    }

    /// Take a new snapshot of every field, recursing into nested composites.
    pub fn update_reference_state(&mut self) {
        for field in &mut self.fields {
            field.update_reference_state();
        }
        self.snapshot = self.take_snapshot();
        debug!(record = self.ty.descriptor().name(), instance = %self.instance, "reconciled record");
    }

    fn take_snapshot(&self) -> Vec<Snapshot> {
        self.fields.iter().map(Snapshot::of).collect()
    }
}

fn diff_value(field: &FieldValue, taken: &Snapshot, slot: u16, out: &mut RecordDelta) {
    let current = match field {
        FieldValue::Value(v) => v,
        _ => &NULL,
    };
    if current != taken.value() {
        out.mark(slot, Some(SlotValue::Value(current.clone())));
    }
}

fn diff_reference(field: &mut FieldValue, taken: &Snapshot, slot: u16, out: &mut RecordDelta) {
    if field.instance() != taken.instance() {
        let value = (!field.is_absent()).then(|| SlotValue::Value(field.to_value()));
        out.mark(slot, value);
        return;
    }
    match field {
        FieldValue::Table(t) => {
            if let Some(delta) = t.get_delta() {
                out.mark(slot + 1, Some(SlotValue::Record(delta)));
            }
        }
        FieldValue::Union(u) => match u.get_delta() {
            Some(UnionChange::Replaced(value)) => out.mark(slot, Some(SlotValue::Value(value))),
            Some(UnionChange::Patched(patch)) => out.mark(slot + 1, Some(SlotValue::Union(patch))),
            None => {}
        },
        FieldValue::List(l) => {
            if let Some(entries) = l.get_delta() {
                out.mark(slot + 1, Some(SlotValue::List(entries)));
            }
        }
        FieldValue::Absent | FieldValue::Value(_) | FieldValue::Array(_) => {}
    }
}

fn apply_value(field: &mut FieldValue, slot: u16, delta: &RecordDelta) {
    if !delta.is_dirty(slot) {
        return;
    }
    if let Some(SlotValue::Value(v)) = delta.value(slot) {
        *field = if v.is_null() {
            FieldValue::Absent
        } else {
            FieldValue::Value(v.clone())
        };
    }
}

fn apply_reference(
    ty: &RecordType,
    kind: FieldKind,
    field: &mut FieldValue,
    slot: u16,
    delta: &RecordDelta,
) {
    let value_dirty = delta.is_dirty(slot);
    let delta_dirty = delta.is_dirty(slot + 1);

    if value_dirty {
        match delta.value(slot) {
            Some(SlotValue::Value(v)) => {
                *field = build(ty, kind, v);
                return;
            }
            None if !delta_dirty => {
                *field = FieldValue::Absent;
                return;
            }
            _ => {}
        }
    }
    if !delta_dirty {
        return;
    }
    match (field, delta.value(slot + 1)) {
        (FieldValue::Table(t), Some(SlotValue::Record(d))) => t.apply_delta(Some(d)),
        (FieldValue::Union(u), Some(SlotValue::Union(patch))) => u.apply_patch(patch),
        (FieldValue::List(l), Some(SlotValue::List(entries))) => {
            l.apply_delta(Some(entries.as_slice()));
        }
        _ => trace!(slot, "skipped nested delta for absent field"),
    }
}

fn empty_field(fd: &FieldDescriptor) -> FieldValue {
    match fd.fixed_length {
        Some(len) => FieldValue::Array(vec![FieldValue::Absent; usize::from(len)]),
        None => FieldValue::Absent,
    }
}

fn element_field_kind(element: ElementKind) -> FieldKind {
    match element {
        ElementKind::Scalar(kind) => FieldKind::Scalar(kind),
        ElementKind::Struct => FieldKind::Struct,
        ElementKind::Table(r) => FieldKind::Table(r),
        ElementKind::Union(u) => FieldKind::Union(u),
    }
}

fn build_field(ty: &RecordType, fd: &FieldDescriptor, value: &Value) -> FieldValue {
    match (fd.kind, fd.fixed_length) {
        (FieldKind::Vector(element), Some(len)) => {
            let items = value.as_items().unwrap_or(&[]);
            let kind = element_field_kind(element);
            FieldValue::Array(
                (0..usize::from(len))
                    .map(|k| items.get(k).map_or(FieldValue::Absent, |v| build(ty, kind, v)))
                    .collect(),
            )
        }
        (kind, _) => build(ty, kind, value),
    }
}

/// Lenient construction of a field from its full value.
fn build(ty: &RecordType, kind: FieldKind, value: &Value) -> FieldValue {
    match (kind, value) {
        (_, Value::Null) => FieldValue::Absent,
        (FieldKind::Scalar(k), v) if v.fits_scalar(k) => FieldValue::Value(v.clone()),
        (FieldKind::Struct, v @ Value::Struct(_)) => FieldValue::Value(v.clone()),
        (FieldKind::Table(r), v @ Value::Table(_)) => {
            FieldValue::Table(Box::new(Entity::from_value(ty.sibling(r), v)))
        }
        (FieldKind::Union(u), v @ Value::Union { .. }) => {
            FieldValue::Union(UnionValue::from_value(ty.union_type(u), v))
        }
        (FieldKind::Vector(element), Value::List(items)) => {
            FieldValue::List(Box::new(ListField::from_value(ty, element, items)))
        }
        _ => FieldValue::Absent,
    }
}

fn fits_field(ty: &RecordType, kind: FieldKind, value: &FieldValue) -> bool {
    match (kind, value) {
        (_, FieldValue::Absent) => true,
        (FieldKind::Scalar(k), FieldValue::Value(v)) => v.fits_scalar(k),
        (FieldKind::Struct, FieldValue::Value(v)) => matches!(v, Value::Struct(_)),
        (FieldKind::Table(r), FieldValue::Table(t)) => *t.record_type() == ty.sibling(r),
        (FieldKind::Union(u), FieldValue::Union(v)) => *v.union_type() == ty.union_type(u),
        (FieldKind::Vector(element), FieldValue::List(l)) => l.holds(ty, element),
        _ => false,
    }
}

fn fits_element(ty: &RecordType, element: ElementKind, value: &FieldValue) -> bool {
    fits_field(ty, element_field_kind(element), value)
}

fn mismatch(fd: &FieldDescriptor) -> EngineError {
    let expected = match fd.fixed_length {
        Some(len) => format!("{:?} x {len}", fd.kind),
        None => format!("{:?}", fd.kind),
    };
    EngineError::KindMismatch {
        field: fd.name.clone(),
        expected,
    }
}

/// A clone is a separate, reconciled record with a fresh instance; nested
/// composites are cloned the same way.
impl Clone for Entity {
    fn clone(&self) -> Self {
        let mut entity = Self::with_fields(self.ty.clone(), self.fields.clone());
        entity.snapshot = entity.take_snapshot();
        entity
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.ty.descriptor().name());
        for (fd, value) in self.ty.descriptor().fields().iter().zip(&self.fields) {
            s.field(&fd.name, value);
        }
        s.finish()
    }
}

impl ListElement for Entity {
    const REFERENCE: bool = true;
    type Context = RecordType;
    type Wire = Value;
    type Delta = RecordDelta;

    fn same_element(&self, other: &Self) -> bool {
        self.instance == other.instance
    }

    fn to_wire(&self) -> Value {
        self.to_value()
    }

    fn from_wire(ctx: &RecordType, wire: &Value) -> Self {
        Self::from_value(ctx.clone(), wire)
    }

    fn content_delta(&mut self) -> Option<RecordDelta> {
        self.get_delta()
    }

    fn apply_content_delta(&mut self, delta: &RecordDelta) {
        self.apply_delta(Some(delta));
    }

    fn update_reference_state(&mut self) {
        Entity::update_reference_state(self);
    }
}
