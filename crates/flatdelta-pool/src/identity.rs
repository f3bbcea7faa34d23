use std::fmt;

use crate::pool::{Handle, Pool};

/// Opaque identity token of one logical list item.
///
/// Stays with the item across moves and replacements. Once the item is
/// removed its token is released; the slot may be handed to a new item, but
/// with a new generation, so the old token never compares equal to it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(Handle);

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({}v{})", self.0.index(), self.0.generation())
    }
}

/// Hands out and recycles item identity tokens.
#[derive(Debug, Default)]
pub struct IdentityAllocator {
    pool: Pool<()>,
}

impl IdentityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pool: Pool::with_capacity(capacity),
        }
    }

    pub fn allocate(&mut self) -> Identity {
        Identity(self.pool.acquire())
    }

    /// Return a token to the pool. `false` if it was already released.
    pub fn release(&mut self, identity: Identity) -> bool {
        self.pool.release(identity.0)
    }

    pub fn is_live(&self, identity: Identity) -> bool {
        self.pool.contains(identity.0)
    }

    /// Tokens currently held by items.
    pub fn live(&self) -> usize {
        self.pool.live()
    }

    /// Drop surplus free slots once every token has been released.
    pub fn trim(&mut self, retain: usize) {
        self.pool.trim(retain);
    }
}
