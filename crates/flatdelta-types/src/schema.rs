//! Schema description consumed by the delta engine.
//!
//! A [`Schema`] is the per-field metadata an external schema source hands to
//! the engine: for every record, its fields with `{kind, element-kind,
//! fixed-length?, deprecated?}`, and for every union, its payload variants.
//! Building a schema assigns each field its delta slots.
//!
//! # Slot layout
//!
//! Fields are laid out in ascending id order. Scalars, strings, and structs
//! take one slot. Tables, unions, and vectors take two consecutive slots
//! (value, delta). A fixed-length array takes one slot per element, or two
//! per element when the elements are tables or unions. Deprecated fields keep
//! their slots so that later fields never shift.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{TypeError, TypeResult};

/// Largest number of delta slots a record may expose (short indices are u16).
pub const MAX_SLOTS: usize = u16::MAX as usize + 1;

/// Number of slots addressable with a byte index.
pub const BYTE_INDEX_SLOTS: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int,
    UInt,
    Float,
    String,
}

/// Reference to a record declared in a [`Schema`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RecordRef(pub usize);

/// Reference to a union declared in a [`Schema`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UnionRef(pub usize);

/// Kind of a list or array element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Scalar(ScalarKind),
    Struct,
    Table(RecordRef),
    Union(UnionRef),
}

impl ElementKind {
    /// Reference elements carry their own nested delta.
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Table(_) | Self::Union(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Scalar(ScalarKind),
    /// Value-typed nested record.
    Struct,
    /// Reference-typed nested record.
    Table(RecordRef),
    Union(UnionRef),
    Vector(ElementKind),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub id: u16,
    pub kind: FieldKind,
    /// Set for fixed-length arrays; only valid on vectors.
    pub fixed_length: Option<u16>,
    pub deprecated: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, id: u16, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            id,
            kind,
            fixed_length: None,
            deprecated: false,
        }
    }

    pub fn scalar(name: impl Into<String>, id: u16, kind: ScalarKind) -> Self {
        Self::new(name, id, FieldKind::Scalar(kind))
    }

    /// Make this vector a fixed-length array.
    pub fn fixed(mut self, len: u16) -> Self {
        self.fixed_length = Some(len);
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// Number of delta slots the field occupies.
    pub fn slot_width(&self) -> usize {
        match (self.kind, self.fixed_length) {
            (FieldKind::Vector(element), Some(len)) => {
                let per = if element.is_reference() { 2 } else { 1 };
                per * usize::from(len)
            }
            (FieldKind::Scalar(_) | FieldKind::Struct, _) => 1,
            (FieldKind::Table(_) | FieldKind::Union(_) | FieldKind::Vector(_), _) => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VariantKind {
    Scalar(ScalarKind),
    Struct,
    Table(RecordRef),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariantDescriptor {
    pub name: String,
    pub kind: VariantKind,
}

impl VariantDescriptor {
    pub fn new(name: impl Into<String>, kind: VariantKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A record with its computed slot layout.
#[derive(Clone, Debug)]
pub struct RecordSchema {
    name: String,
    fields: Vec<FieldDescriptor>,
    slot_base: Vec<u16>,
    slot_count: usize,
}

impl RecordSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in layout (ascending id) order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&FieldDescriptor> {
        self.fields.get(index)
    }

    /// Position of the named field in layout order.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// First delta slot of the field at `index`.
    pub fn slot_of(&self, index: usize) -> u16 {
        self.slot_base[index]
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Whether deltas for this record need the short-index list.
    pub fn uses_short_indices(&self) -> bool {
        self.slot_count > BYTE_INDEX_SLOTS
    }
}

#[derive(Clone, Debug)]
pub struct UnionSchema {
    name: String,
    variants: Vec<VariantDescriptor>,
}

impl UnionSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variants(&self) -> &[VariantDescriptor] {
        &self.variants
    }

    /// Variant for a discriminator; tag 0 (empty) has none.
    pub fn variant(&self, tag: u8) -> Option<&VariantDescriptor> {
        if tag == 0 {
            return None;
        }
        self.variants.get(usize::from(tag) - 1)
    }
}

/// A validated set of records and unions.
#[derive(Clone, Debug)]
pub struct Schema {
    records: Vec<RecordSchema>,
    unions: Vec<UnionSchema>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Panics on a reference that did not come from this schema's builder.
    pub fn record(&self, r: RecordRef) -> &RecordSchema {
        &self.records[r.0]
    }

    /// Panics on a reference that did not come from this schema's builder.
    pub fn union(&self, u: UnionRef) -> &UnionSchema {
        &self.unions[u.0]
    }

    pub fn record_by_name(&self, name: &str) -> Option<RecordRef> {
        self.records.iter().position(|r| r.name == name).map(RecordRef)
    }

    pub fn union_by_name(&self, name: &str) -> Option<UnionRef> {
        self.unions.iter().position(|u| u.name == name).map(UnionRef)
    }

    /// Bind a record reference to this schema.
    pub fn record_type(self: &Arc<Self>, r: RecordRef) -> RecordType {
        RecordType {
            schema: Arc::clone(self),
            record: r,
        }
    }

    /// Bind a union reference to this schema.
    pub fn union_type(self: &Arc<Self>, u: UnionRef) -> UnionType {
        UnionType {
            schema: Arc::clone(self),
            union: u,
        }
    }
}

/// Incremental schema construction. Records and unions may be declared
/// before they are defined so that they can reference each other.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    records: Vec<(String, Option<Vec<FieldDescriptor>>)>,
    unions: Vec<(String, Vec<VariantDescriptor>)>,
}

impl SchemaBuilder {
    pub fn declare_record(&mut self, name: impl Into<String>) -> RecordRef {
        self.records.push((name.into(), None));
        RecordRef(self.records.len() - 1)
    }

    pub fn define_record(&mut self, r: RecordRef, fields: Vec<FieldDescriptor>) -> &mut Self {
        if let Some(entry) = self.records.get_mut(r.0) {
            entry.1 = Some(fields);
        }
        self
    }

    /// Declare and define a record in one step.
    pub fn record(&mut self, name: impl Into<String>, fields: Vec<FieldDescriptor>) -> RecordRef {
        let r = self.declare_record(name);
        self.define_record(r, fields);
        r
    }

    pub fn declare_union(&mut self, name: impl Into<String>) -> UnionRef {
        self.unions.push((name.into(), Vec::new()));
        UnionRef(self.unions.len() - 1)
    }

    pub fn define_union(&mut self, u: UnionRef, variants: Vec<VariantDescriptor>) -> &mut Self {
        if let Some(entry) = self.unions.get_mut(u.0) {
            entry.1 = variants;
        }
        self
    }

    pub fn union(&mut self, name: impl Into<String>, variants: Vec<VariantDescriptor>) -> UnionRef {
        let u = self.declare_union(name);
        self.define_union(u, variants);
        u
    }

    /// Validate every declaration and compute slot layouts.
    pub fn build(self) -> TypeResult<Arc<Schema>> {
        let record_count = self.records.len();
        let union_count = self.unions.len();

        let mut unions = Vec::with_capacity(union_count);
        for (name, variants) in self.unions {
            if variants.len() > usize::from(u8::MAX) {
                return Err(TypeError::TooManyVariants {
                    union: name,
                    count: variants.len(),
                });
            }
            for v in &variants {
                if let VariantKind::Table(r) = v.kind {
                    check_record(r, record_count)?;
                }
            }
            unions.push(UnionSchema { name, variants });
        }

        let mut records = Vec::with_capacity(record_count);
        for (name, fields) in self.records {
            let Some(mut fields) = fields else {
                return Err(TypeError::UndefinedRecord(name));
            };
            fields.sort_by_key(|f| f.id);
            records.push(layout_record(name, fields, record_count, union_count)?);
        }

        Ok(Arc::new(Schema { records, unions }))
    }
}

fn check_record(r: RecordRef, count: usize) -> TypeResult<()> {
    if r.0 >= count {
        return Err(TypeError::UnknownRecord(r.0));
    }
    Ok(())
}

fn check_union(u: UnionRef, count: usize) -> TypeResult<()> {
    if u.0 >= count {
        return Err(TypeError::UnknownUnion(u.0));
    }
    Ok(())
}

fn check_element(kind: ElementKind, records: usize, unions: usize) -> TypeResult<()> {
    match kind {
        ElementKind::Table(r) => check_record(r, records),
        ElementKind::Union(u) => check_union(u, unions),
        ElementKind::Scalar(_) | ElementKind::Struct => Ok(()),
    }
}

fn layout_record(
    name: String,
    fields: Vec<FieldDescriptor>,
    records: usize,
    unions: usize,
) -> TypeResult<RecordSchema> {
    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    let mut slot_base = Vec::with_capacity(fields.len());
    let mut next_slot = 0usize;

    for field in &fields {
        if !ids.insert(field.id) {
            return Err(TypeError::DuplicateFieldId {
                record: name,
                id: field.id,
            });
        }
        if !names.insert(field.name.as_str()) {
            return Err(TypeError::DuplicateFieldName {
                record: name.clone(),
                name: field.name.clone(),
            });
        }
        match (field.kind, field.fixed_length) {
            (FieldKind::Vector(_), Some(0)) => {
                return Err(TypeError::ZeroFixedLength {
                    record: name.clone(),
                    field: field.name.clone(),
                });
            }
            (FieldKind::Vector(_), _) | (_, None) => {}
            (_, Some(_)) => {
                return Err(TypeError::FixedLengthNotVector {
                    record: name.clone(),
                    field: field.name.clone(),
                });
            }
        }
        match field.kind {
            FieldKind::Table(r) => check_record(r, records)?,
            FieldKind::Union(u) => check_union(u, unions)?,
            FieldKind::Vector(element) => check_element(element, records, unions)?,
            FieldKind::Scalar(_) | FieldKind::Struct => {}
        }

        // A slot base must itself be addressable even if the record is full.
        if next_slot >= MAX_SLOTS {
            return Err(TypeError::TooManySlots {
                record: name.clone(),
                slots: next_slot + field.slot_width(),
                max: MAX_SLOTS,
            });
        }
        slot_base.push(next_slot as u16);
        next_slot += field.slot_width();
    }

    if next_slot > MAX_SLOTS {
        return Err(TypeError::TooManySlots {
            record: name,
            slots: next_slot,
            max: MAX_SLOTS,
        });
    }

    Ok(RecordSchema {
        name,
        fields,
        slot_base,
        slot_count: next_slot,
    })
}

/// A record bound to the schema that describes it.
#[derive(Clone)]
pub struct RecordType {
    schema: Arc<Schema>,
    record: RecordRef,
}

impl RecordType {
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn record_ref(&self) -> RecordRef {
        self.record
    }

    pub fn descriptor(&self) -> &RecordSchema {
        self.schema.record(self.record)
    }

    /// Another record of the same schema.
    pub fn sibling(&self, r: RecordRef) -> RecordType {
        self.schema.record_type(r)
    }

    pub fn union_type(&self, u: UnionRef) -> UnionType {
        self.schema.union_type(u)
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.schema, &other.schema) && self.record == other.record
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordType({})", self.descriptor().name())
    }
}

/// A union bound to the schema that describes it.
#[derive(Clone)]
pub struct UnionType {
    schema: Arc<Schema>,
    union: UnionRef,
}

impl UnionType {
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn union_ref(&self) -> UnionRef {
        self.union
    }

    pub fn descriptor(&self) -> &UnionSchema {
        self.schema.union(self.union)
    }

    pub fn record_type(&self, r: RecordRef) -> RecordType {
        self.schema.record_type(r)
    }
}

impl PartialEq for UnionType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.schema, &other.schema) && self.union == other.union
    }
}

impl fmt::Debug for UnionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnionType({})", self.descriptor().name())
    }
}
