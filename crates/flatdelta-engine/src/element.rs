//! Element capability required by [`ListDeltaTracker`](crate::ListDeltaTracker).
//!
//! One generic list engine serves every element category. Value elements
//! (scalars, strings, structs) are compared by equality and only ever
//! replaced. Reference elements (tables, unions) are compared by instance and
//! additionally report their own content delta, which the list surfaces as
//! `Modify` entries.

use std::fmt;

use flatdelta_types::{NoDelta, Value};

pub trait ListElement: Sized {
    /// Whether elements carry a nested content delta.
    const REFERENCE: bool;

    /// What is needed to build an element from its wire form (e.g. the
    /// record type for tables).
    type Context: Clone + fmt::Debug;
    /// Full value form used for `Insert` / `Replace` base values.
    type Wire: Clone + fmt::Debug;
    /// Content delta carried by `Modify` entries.
    type Delta: Clone + fmt::Debug;

    /// Element equality used by `set`: value equality for value elements,
    /// instance identity for reference elements.
    fn same_element(&self, other: &Self) -> bool;

    fn to_wire(&self) -> Self::Wire;

    fn from_wire(ctx: &Self::Context, wire: &Self::Wire) -> Self;

    /// Changes to this element's own content since its last reconciliation.
    fn content_delta(&mut self) -> Option<Self::Delta> {
        None
    }

    fn apply_content_delta(&mut self, _delta: &Self::Delta) {}

    fn update_reference_state(&mut self) {}
}

macro_rules! value_element {
    ($($t:ty),*) => {
        $(impl ListElement for $t {
            const REFERENCE: bool = false;
            type Context = ();
            type Wire = $t;
            type Delta = NoDelta;

            fn same_element(&self, other: &Self) -> bool {
                self == other
            }

            fn to_wire(&self) -> Self::Wire {
                self.clone()
            }

            fn from_wire(_ctx: &(), wire: &Self::Wire) -> Self {
                wire.clone()
            }
        })*
    };
}

value_element!(bool, i8, i16, i32, i64, u8, u16, u32, u64, String, Value);

macro_rules! float_element {
    ($($t:ty),*) => {
        $(impl ListElement for $t {
            const REFERENCE: bool = false;
            type Context = ();
            type Wire = $t;
            type Delta = NoDelta;

            fn same_element(&self, other: &Self) -> bool {
                self.to_bits() == other.to_bits()
            }

            fn to_wire(&self) -> Self::Wire {
                *self
            }

            fn from_wire(_ctx: &(), wire: &Self::Wire) -> Self {
                *wire
            }
        })*
    };
}

float_element!(f32, f64);
