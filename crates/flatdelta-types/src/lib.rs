//! Foundation types for flatdelta.
//!
//! This crate provides the shapes shared by the delta engine and the wire
//! codec. Every other flatdelta crate depends on `flatdelta-types`.
//!
//! # Key Types
//!
//! - [`DeltaOperation`] -- Structural operation codes of a list delta
//! - [`Value`] -- Full value of any field kind
//! - [`Schema`] / [`RecordSchema`] -- Field-kind metadata and slot layout
//! - [`RecordDelta`] / [`DirtyIndexSet`] -- Sparse per-slot record patch
//! - [`ListDeltaEntry`] -- One entry of a compacted list delta
//! - [`UnionChange`] -- Replacement or payload delta of a union
//! - [`InstanceId`] -- Reference identity of tracked composites

pub mod delta;
pub mod error;
pub mod instance;
pub mod op;
pub mod schema;
pub mod value;

pub use delta::{
    DirtyIndexSet, ElementDelta, ListDelta, ListDeltaEntry, NoDelta, RecordDelta, SlotValue,
    UnionChange, UnionDelta,
};
pub use error::{TypeError, TypeResult};
pub use instance::InstanceId;
pub use op::DeltaOperation;
pub use schema::{
    ElementKind, FieldDescriptor, FieldKind, RecordRef, RecordSchema, RecordType, ScalarKind,
    Schema, SchemaBuilder, UnionRef, UnionSchema, UnionType, VariantDescriptor, VariantKind,
    BYTE_INDEX_SLOTS, MAX_SLOTS,
};
pub use value::Value;
