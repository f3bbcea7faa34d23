//! Schema-driven list fields.

use flatdelta_types::{
    ElementDelta, ElementKind, InstanceId, ListDeltaEntry, RecordDelta, RecordType, UnionChange,
    Value,
};

use crate::entity::Entity;
use crate::list::ListDeltaTracker;
use crate::union::UnionValue;

/// Wire form of a list field's delta.
pub type ListFieldDelta = Vec<ListDeltaEntry<Value, ElementDelta>>;

/// A vector field of a record, tracked by the list engine for its element
/// category.
#[derive(Clone, Debug)]
pub enum ListField {
    /// Scalars, strings and structs.
    Values(ListDeltaTracker<Value>),
    Tables(ListDeltaTracker<Entity>),
    Unions(ListDeltaTracker<UnionValue>),
}

impl ListField {
    /// An empty list for elements of `element`, resolved against the schema
    /// of `owner`.
    pub fn for_element(owner: &RecordType, element: ElementKind) -> Self {
        match element {
            ElementKind::Scalar(_) | ElementKind::Struct => Self::Values(ListDeltaTracker::new(())),
            ElementKind::Table(r) => Self::Tables(ListDeltaTracker::new(owner.sibling(r))),
            ElementKind::Union(u) => Self::Unions(ListDeltaTracker::new(owner.union_type(u))),
        }
    }

    /// A reconciled list built from full element values.
    pub fn from_value(owner: &RecordType, element: ElementKind, items: &[Value]) -> Self {
        match element {
            ElementKind::Scalar(_) | ElementKind::Struct => {
                Self::Values(ListDeltaTracker::from_elements((), items.iter().cloned()))
            }
            ElementKind::Table(r) => {
                let ty = owner.sibling(r);
                let tables = items.iter().map(|v| Entity::from_value(ty.clone(), v));
                Self::Tables(ListDeltaTracker::from_elements(ty.clone(), tables))
            }
            ElementKind::Union(u) => {
                let ty = owner.union_type(u);
                let unions = items.iter().map(|v| UnionValue::from_value(ty.clone(), v));
                Self::Unions(ListDeltaTracker::from_elements(ty.clone(), unions))
            }
        }
    }

    /// Whether this list stores elements of `element` from `owner`'s schema.
    pub fn holds(&self, owner: &RecordType, element: ElementKind) -> bool {
        match (self, element) {
            (Self::Values(_), ElementKind::Scalar(_) | ElementKind::Struct) => true,
            (Self::Tables(l), ElementKind::Table(r)) => *l.context() == owner.sibling(r),
            (Self::Unions(l), ElementKind::Union(u)) => *l.context() == owner.union_type(u),
            _ => false,
        }
    }

    pub fn instance(&self) -> InstanceId {
        match self {
            Self::Values(l) => l.instance(),
            Self::Tables(l) => l.instance(),
            Self::Unions(l) => l.instance(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Values(l) => l.len(),
            Self::Tables(l) => l.len(),
            Self::Unions(l) => l.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Values(l) => Value::List(l.to_wire_vec()),
            Self::Tables(l) => Value::List(l.to_wire_vec()),
            Self::Unions(l) => Value::List(l.to_wire_vec()),
        }
    }

    pub fn as_values(&self) -> Option<&ListDeltaTracker<Value>> {
        match self {
            Self::Values(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_values_mut(&mut self) -> Option<&mut ListDeltaTracker<Value>> {
        match self {
            Self::Values(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_tables(&self) -> Option<&ListDeltaTracker<Entity>> {
        match self {
            Self::Tables(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_tables_mut(&mut self) -> Option<&mut ListDeltaTracker<Entity>> {
        match self {
            Self::Tables(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_unions(&self) -> Option<&ListDeltaTracker<UnionValue>> {
        match self {
            Self::Unions(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_unions_mut(&mut self) -> Option<&mut ListDeltaTracker<UnionValue>> {
        match self {
            Self::Unions(l) => Some(l),
            _ => None,
        }
    }

    pub fn get_delta(&mut self) -> Option<ListFieldDelta> {
        match self {
            Self::Values(l) => l.get_delta().map(|d| {
                d.into_iter()
                    .map(|e| e.map(|v| v, |never| -> Option<ElementDelta> { match never {} }))
                    .collect()
            }),
            Self::Tables(l) => l.get_delta().map(|d| {
                d.into_iter()
                    .map(|e| e.map(|v| v, |r| Some(ElementDelta::Record(r))))
                    .collect()
            }),
            Self::Unions(l) => l.get_delta().map(|d| {
                d.into_iter()
                    .map(|e| e.map(|v| v, |c| Some(ElementDelta::Union(c))))
                    .collect()
            }),
        }
    }

    /// Apply a list delta. A `Modify` whose content delta does not match
    /// the element category carries no delta and is skipped.
    pub fn apply_delta(&mut self, delta: Option<&[ListDeltaEntry<Value, ElementDelta>]>) {
        let Some(entries) = delta else {
            return;
        };
        match self {
            Self::Values(l) => {
                let entries: Vec<_> = entries
                    .iter()
                    .cloned()
                    .map(|e| e.map(|v| v, |_| None))
                    .collect();
                l.apply_delta(Some(entries.as_slice()));
            }
            Self::Tables(l) => {
                let entries: Vec<_> = entries
                    .iter()
                    .cloned()
                    .map(|e| e.map(|v| v, as_record))
                    .collect();
                l.apply_delta(Some(entries.as_slice()));
            }
            Self::Unions(l) => {
                let entries: Vec<_> = entries
                    .iter()
                    .cloned()
                    .map(|e| e.map(|v| v, as_union))
                    .collect();
                l.apply_delta(Some(entries.as_slice()));
            }
        }
    }

    pub fn update_reference_state(&mut self) {
        match self {
            Self::Values(l) => l.update_reference_state(),
            Self::Tables(l) => l.update_reference_state(),
            Self::Unions(l) => l.update_reference_state(),
        }
    }
}

fn as_record(delta: ElementDelta) -> Option<RecordDelta> {
    match delta {
        ElementDelta::Record(r) => Some(r),
        ElementDelta::Union(_) => None,
    }
}

fn as_union(delta: ElementDelta) -> Option<UnionChange> {
    match delta {
        ElementDelta::Union(c) => Some(c),
        ElementDelta::Record(_) => None,
    }
}
