use serde::{Deserialize, Serialize};

/// Pool sizing for a [`ListDeltaTracker`](crate::ListDeltaTracker).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Pending-record slots reserved up front.
    pub record_capacity: usize,
    /// Identity-token slots reserved up front.
    pub identity_capacity: usize,
    /// Free pending records kept after reconciliation; surplus slots are
    /// dropped so a burst of mutations does not pin memory forever.
    pub retained_records: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            record_capacity: 0,
            identity_capacity: 0,
            retained_records: 64,
        }
    }
}

impl TrackerConfig {
    /// Reserve pools for a list expected to hold about `items` elements.
    pub fn sized_for(items: usize) -> Self {
        Self {
            record_capacity: items,
            identity_capacity: items,
            retained_records: items.max(Self::default().retained_records),
        }
    }
}
