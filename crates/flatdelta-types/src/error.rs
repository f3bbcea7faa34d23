use thiserror::Error;

/// Errors produced while building or validating a schema description.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("record {record}: duplicate field id {id}")]
    DuplicateFieldId { record: String, id: u16 },

    #[error("record {record}: duplicate field name {name:?}")]
    DuplicateFieldName { record: String, name: String },

    #[error("record {record}: field {field:?} is fixed-length but not a vector")]
    FixedLengthNotVector { record: String, field: String },

    #[error("record {record}: field {field:?} has a zero fixed length")]
    ZeroFixedLength { record: String, field: String },

    #[error("unknown record reference: {0}")]
    UnknownRecord(usize),

    #[error("unknown union reference: {0}")]
    UnknownUnion(usize),

    #[error("union {union} has {count} variants (max 255)")]
    TooManyVariants { union: String, count: usize },

    #[error("record {record} needs {slots} delta slots (max {max})")]
    TooManySlots {
        record: String,
        slots: usize,
        max: usize,
    },

    #[error("record {0} was declared but never defined")]
    UndefinedRecord(String),
}

/// Convenience alias for schema results.
pub type TypeResult<T> = Result<T, TypeError>;
