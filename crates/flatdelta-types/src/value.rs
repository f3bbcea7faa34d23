//! Full (non-delta) field values as they travel on the wire.
//!
//! `Value` is the snapshot form of every field kind: scalars and strings,
//! value-typed structs, reference-typed tables, unions, and lists. Tables
//! carry one value per declared field in layout order.

use serde::{Deserialize, Serialize};

use crate::schema::ScalarKind;

/// A complete value of any field kind.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub enum Value {
    /// No value (absent optional field, empty union payload).
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    /// Value-typed nested record, compared structurally.
    Struct(Vec<Value>),
    /// Reference-typed nested record: one value per declared field.
    Table(Vec<Value>),
    /// Union payload; tag 0 is the empty variant.
    Union { tag: u8, value: Box<Value> },
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The empty union value.
    pub fn none_union() -> Self {
        Self::Union {
            tag: 0,
            value: Box::new(Self::Null),
        }
    }

    /// Whether this value is acceptable for a scalar field of `kind`.
    /// `Null` is accepted for every scalar kind (optional scalars).
    pub fn fits_scalar(&self, kind: ScalarKind) -> bool {
        matches!(
            (self, kind),
            (Self::Null, _)
                | (Self::Bool(_), ScalarKind::Bool)
                | (Self::Int(_), ScalarKind::Int)
                | (Self::UInt(_), ScalarKind::UInt)
                | (Self::Float(_), ScalarKind::Float)
                | (Self::String(_), ScalarKind::String)
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Members of a struct, table, or list value.
    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Self::Struct(items) | Self::Table(items) | Self::List(items) => Some(items),
            _ => None,
        }
    }
}

// Floats compare by bit pattern; NaN equals itself.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::UInt(a), Self::UInt(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Struct(a), Self::Struct(b)) => a == b,
            (Self::Table(a), Self::Table(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (
                Self::Union { tag: ta, value: va },
                Self::Union { tag: tb, value: vb },
            ) => ta == tb && va == vb,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

macro_rules! from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::Int(i64::from(v))
            }
        })*
    };
}

macro_rules! from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::UInt(u64::from(v))
            }
        })*
    };
}

from_signed!(i8, i16, i32, i64);
from_unsigned!(u8, u16, u32, u64);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
