use serde::{Deserialize, Serialize};

use flatdelta_types::{ElementDelta, ListDeltaEntry, RecordDelta, Value};

use crate::error::{ProtocolError, ProtocolResult};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Everything that travels between peers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DeltaMessage {
    /// Field-level patch of one record.
    Record { delta: RecordDelta },
    /// Compacted structural delta of one list.
    List {
        entries: Vec<ListDeltaEntry<Value, ElementDelta>>,
    },
    Error { code: u32, message: String },
}

impl DeltaMessage {
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::Record { .. } => 1,
            Self::List { .. } => 2,
            Self::Error { .. } => 255,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Record { .. } => "Record",
            Self::List { .. } => "List",
            Self::Error { .. } => "Error",
        }
    }

    /// Turn an `Error` message into [`ProtocolError::RemoteError`].
    pub fn into_result(self) -> ProtocolResult<Self> {
        match self {
            Self::Error { code, message } => Err(ProtocolError::RemoteError { code, message }),
            other => Ok(other),
        }
    }
}

impl From<RecordDelta> for DeltaMessage {
    fn from(delta: RecordDelta) -> Self {
        Self::Record { delta }
    }
}

impl From<Vec<ListDeltaEntry<Value, ElementDelta>>> for DeltaMessage {
    fn from(entries: Vec<ListDeltaEntry<Value, ElementDelta>>) -> Self {
        Self::List { entries }
    }
}
