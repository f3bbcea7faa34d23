//! Object pools for flatdelta.
//!
//! The list engine allocates a pending record for every structural mutation
//! and an identity token for every item. Both come from the pools in this
//! crate so that steady-state mutation does not allocate.
//!
//! # Key Types
//!
//! - [`Pool`] / [`Handle`] -- Generational free-list arena over [`Recycle`] entries
//! - [`IdentityAllocator`] / [`Identity`] -- Per-item identity tokens

pub mod identity;
pub mod pool;

pub use identity::{Identity, IdentityAllocator};
pub use pool::{Handle, Pool, PoolStats, Recycle};
