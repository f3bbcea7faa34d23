//! Error types for the engine crate.
//!
//! These cover misuse of the collection and field-access API only. Applying
//! a delta never fails: malformed or out-of-range operations are skipped.

/// Errors raised by the tracked collection and record API.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    /// A structural operation addressed a position outside the list.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// The record has no field with this name.
    #[error("unknown field {field:?} on record {record}")]
    UnknownField { record: String, field: String },

    /// The supplied value does not fit the field's declared kind.
    #[error("field {field:?} expects {expected}")]
    KindMismatch { field: String, expected: String },

    /// The union has no variant with this discriminator.
    #[error("union {union} has no variant {tag}")]
    InvalidDiscriminator { union: String, tag: u8 },

    /// In-place mutation of a value element would bypass change tracking.
    #[error("value elements cannot be mutated in place; use set")]
    ValueElementMutation,
}

/// Convenience alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;
