use flatdelta_pool::{Identity, Recycle};
use flatdelta_types::DeltaOperation;

/// One pending structural operation in a list's log.
///
/// Records live in the list's [`Pool`](flatdelta_pool::Pool); the log holds
/// their handles. Base values are not stored: `Insert` and `Replace` read the
/// item's current value when the delta is emitted.
#[derive(Debug)]
pub(crate) struct DeltaRecord<D> {
    pub op: DeltaOperation,
    /// Item the record concerns; `None` only for `Clear`.
    pub item: Option<Identity>,
    pub current_index: usize,
    pub new_index: usize,
    /// Content delta, `Modify` only.
    pub delta: Option<D>,
}

impl<D> Default for DeltaRecord<D> {
    fn default() -> Self {
        Self {
            op: DeltaOperation::Clear,
            item: None,
            current_index: 0,
            new_index: 0,
            delta: None,
        }
    }
}

impl<D> Recycle for DeltaRecord<D> {
    fn scrub(&mut self) {
        self.op = DeltaOperation::Clear;
        self.item = None;
        self.current_index = 0;
        self.new_index = 0;
        self.delta = None;
    }
}
