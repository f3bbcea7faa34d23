//! Discriminated-union fields.
//!
//! A [`UnionValue`] holds one of its union's variants, or nothing (tag 0).
//! It keeps its own snapshot: a changed discriminator or value payload is
//! reported as a full replacement, while a table payload that stayed the
//! same instance reports its nested record delta.

use std::fmt;

use tracing::trace;

use flatdelta_types::{InstanceId, UnionChange, UnionDelta, UnionType, Value, VariantKind};

use crate::element::ListElement;
use crate::entity::Entity;
use crate::error::{EngineError, EngineResult};

#[derive(Clone, Debug)]
enum Payload {
    None,
    Value { tag: u8, value: Value },
    Table { tag: u8, table: Box<Entity> },
}

#[derive(Debug)]
enum Taken {
    None,
    Value { tag: u8, value: Value },
    Table { tag: u8, instance: InstanceId },
}

pub struct UnionValue {
    ty: UnionType,
    instance: InstanceId,
    payload: Payload,
    snapshot: Taken,
}

impl UnionValue {
    /// An empty union whose snapshot is empty as well.
    pub fn new(ty: UnionType) -> Self {
        Self {
            ty,
            instance: InstanceId::next(),
            payload: Payload::None,
            snapshot: Taken::None,
        }
    }

    /// Build a reconciled union from its full value.
    ///
    /// Unknown discriminators and payloads that do not fit the variant
    /// produce the empty union.
    pub fn from_value(ty: UnionType, value: &Value) -> Self {
        let payload = payload_from_value(&ty, value);
        let mut union = Self::new(ty);
        union.payload = payload;
        union.snapshot = union.take_snapshot();
        union
    }

    pub fn union_type(&self) -> &UnionType {
        &self.ty
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Active variant tag; 0 when empty.
    pub fn discriminator(&self) -> u8 {
        match &self.payload {
            Payload::None => 0,
            Payload::Value { tag, .. } | Payload::Table { tag, .. } => *tag,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self.payload, Payload::None)
    }

    pub fn set_none(&mut self) {
        self.payload = Payload::None;
    }

    /// Select a scalar or struct variant.
    pub fn set_value(&mut self, tag: u8, value: impl Into<Value>) -> EngineResult<()> {
        let value = value.into();
        let fits = match self.variant(tag)? {
            VariantKind::Scalar(kind) => !value.is_null() && value.fits_scalar(kind),
            VariantKind::Struct => matches!(value, Value::Struct(_)),
            VariantKind::Table(_) => false,
        };
        if !fits {
            return Err(self.mismatch(tag));
        }
        self.payload = Payload::Value { tag, value };
        Ok(())
    }

    /// Select a table variant.
    pub fn set_table(&mut self, tag: u8, table: Entity) -> EngineResult<()> {
        match self.variant(tag)? {
            VariantKind::Table(r) if *table.record_type() == self.ty.record_type(r) => {
                self.payload = Payload::Table {
                    tag,
                    table: Box::new(table),
                };
                Ok(())
            }
            _ => Err(self.mismatch(tag)),
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Value { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn table(&self) -> Option<&Entity> {
        match &self.payload {
            Payload::Table { table, .. } => Some(table),
            _ => None,
        }
    }

    pub fn table_mut(&mut self) -> Option<&mut Entity> {
        match &mut self.payload {
            Payload::Table { table, .. } => Some(table),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match &self.payload {
            Payload::None => Value::none_union(),
            Payload::Value { tag, value } => Value::Union {
                tag: *tag,
                value: Box::new(value.clone()),
            },
            Payload::Table { tag, table } => Value::Union {
                tag: *tag,
                value: Box::new(table.to_value()),
            },
        }
    }

    /// Change since the last reconciliation.
    pub fn get_delta(&mut self) -> Option<UnionChange> {
        match (&self.payload, &self.snapshot) {
            (Payload::None, Taken::None) => return None,
            (Payload::Value { tag, value }, Taken::Value { tag: t, value: v })
                if tag == t && value == v =>
            {
                return None
            }
            (Payload::Table { tag, table }, Taken::Table { tag: t, instance })
                if tag == t && table.instance() == *instance => {}
            _ => return Some(UnionChange::Replaced(self.to_value())),
        }

        let Payload::Table { tag, table } = &mut self.payload else {
            return None;
        };
        let discriminator = *tag;
        table.get_delta().map(|delta| {
            UnionChange::Patched(UnionDelta {
                discriminator,
                delta,
            })
        })
    }

    pub fn apply_delta(&mut self, delta: Option<&UnionChange>) {
        match delta {
            None => {}
            Some(UnionChange::Replaced(value)) => {
                self.payload = payload_from_value(&self.ty, value);
            }
            Some(UnionChange::Patched(patch)) => self.apply_patch(patch),
        }
    }

    /// Patch the active table payload; skipped unless the discriminator
    /// matches.
    pub fn apply_patch(&mut self, patch: &UnionDelta) {
        match &mut self.payload {
            Payload::Table { tag, table } if *tag == patch.discriminator => {
                table.apply_delta(Some(&patch.delta));
            }
            _ => trace!(
                union = self.ty.descriptor().name(),
                tag = patch.discriminator,
                "skipped union patch for inactive variant"
            ),
        }
    }

    pub fn update_reference_state(&mut self) {
        if let Payload::Table { table, .. } = &mut self.payload {
            table.update_reference_state();
        }
        self.snapshot = self.take_snapshot();
    }

    fn take_snapshot(&self) -> Taken {
        match &self.payload {
            Payload::None => Taken::None,
            Payload::Value { tag, value } => Taken::Value {
                tag: *tag,
                value: value.clone(),
            },
            Payload::Table { tag, table } => Taken::Table {
                tag: *tag,
                instance: table.instance(),
            },
        }
    }

    fn variant(&self, tag: u8) -> EngineResult<VariantKind> {
        self.ty
            .descriptor()
            .variant(tag)
            .map(|v| v.kind)
            .ok_or_else(|| EngineError::InvalidDiscriminator {
                union: self.ty.descriptor().name().to_string(),
                tag,
            })
    }

    fn mismatch(&self, tag: u8) -> EngineError {
        let desc = self.ty.descriptor();
        EngineError::KindMismatch {
            field: format!("{}#{tag}", desc.name()),
            expected: desc
                .variant(tag)
                .map(|v| format!("{:?}", v.kind))
                .unwrap_or_default(),
        }
    }
}

fn payload_from_value(ty: &UnionType, value: &Value) -> Payload {
    let Value::Union { tag, value } = value else {
        return Payload::None;
    };
    let Some(variant) = ty.descriptor().variant(*tag) else {
        return Payload::None;
    };
    match (variant.kind, value.as_ref()) {
        (VariantKind::Scalar(kind), v) if !v.is_null() && v.fits_scalar(kind) => Payload::Value {
            tag: *tag,
            value: v.clone(),
        },
        (VariantKind::Struct, v @ Value::Struct(_)) => Payload::Value {
            tag: *tag,
            value: v.clone(),
        },
        (VariantKind::Table(r), v @ Value::Table(_)) => Payload::Table {
            tag: *tag,
            table: Box::new(Entity::from_value(ty.record_type(r), v)),
        },
        _ => Payload::None,
    }
}

/// A clone is a separate, reconciled union with a fresh instance.
impl Clone for UnionValue {
    fn clone(&self) -> Self {
        let mut union = Self::new(self.ty.clone());
        union.payload = self.payload.clone();
        union.snapshot = union.take_snapshot();
        union
    }
}

impl fmt::Debug for UnionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnionValue")
            .field("union", &self.ty)
            .field("instance", &self.instance)
            .field("payload", &self.payload)
            .finish()
    }
}

impl ListElement for UnionValue {
    const REFERENCE: bool = true;
    type Context = UnionType;
    type Wire = Value;
    type Delta = UnionChange;

    fn same_element(&self, other: &Self) -> bool {
        self.instance == other.instance
    }

    fn to_wire(&self) -> Value {
        self.to_value()
    }

    fn from_wire(ctx: &UnionType, wire: &Value) -> Self {
        Self::from_value(ctx.clone(), wire)
    }

    fn content_delta(&mut self) -> Option<UnionChange> {
        self.get_delta()
    }

    fn apply_content_delta(&mut self, delta: &UnionChange) {
        self.apply_delta(Some(delta));
    }

    fn update_reference_state(&mut self) {
        UnionValue::update_reference_state(self);
    }
}
