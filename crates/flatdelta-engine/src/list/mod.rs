//! Tracked lists.
//!
//! [`ListDeltaTracker`] journals structural mutations (insert, move,
//! replace, remove, clear) in a pooled pending log and compacts that log
//! into a minimal equivalent delta on demand. [`ListField`] wraps the
//! tracker for schema-driven record fields.

mod compact;
mod field;
mod record;
mod tracker;

pub use field::{ListField, ListFieldDelta};
pub use tracker::ListDeltaTracker;
