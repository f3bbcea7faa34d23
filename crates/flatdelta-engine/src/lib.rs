//! Delta engine for flatdelta.
//!
//! Tracks changes to schema-described records and produces minimal deltas
//! that a peer applies to converge on the same state. Records are diffed
//! field by field against a snapshot; lists journal their structural
//! mutations and compact the journal into an equivalent shorter one.
//!
//! # Key Types
//!
//! - [`Entity`] / [`FieldValue`] -- Record instance with dirty-field tracking
//! - [`UnionValue`] -- Discriminated union with replace-or-patch deltas
//! - [`ListDeltaTracker`] -- Generic tracked list with log compaction
//! - [`ListField`] -- Record vector field backed by a `ListDeltaTracker`
//! - [`ListElement`] -- Capability an element type needs to live in a list
//! - [`TrackerConfig`] -- Pool sizing for lists
//!
//! # Reconciliation
//!
//! `get_delta` reports everything changed since the last call to
//! `update_reference_state`; it does not reset anything. Both peers call
//! `update_reference_state` once a delta has been exchanged.

pub mod config;
pub mod element;
pub mod entity;
pub mod error;
pub mod list;
pub mod union;

pub use config::TrackerConfig;
pub use element::ListElement;
pub use entity::{Entity, FieldValue};
pub use error::{EngineError, EngineResult};
pub use list::{ListDeltaTracker, ListField, ListFieldDelta};
pub use union::UnionValue;
