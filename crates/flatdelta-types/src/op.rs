use std::fmt;

use serde::{Deserialize, Serialize};

/// Structural operation carried by a list-delta entry.
///
/// The discriminants are part of the wire contract and travel as a single
/// byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum DeltaOperation {
    Insert = 0,
    Modify = 1,
    Move = 2,
    Replace = 3,
    Remove = 4,
    Clear = 5,
}

impl DeltaOperation {
    /// Wire code for this operation.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a wire code.
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Insert),
            1 => Some(Self::Modify),
            2 => Some(Self::Move),
            3 => Some(Self::Replace),
            4 => Some(Self::Remove),
            5 => Some(Self::Clear),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Insert => "Insert",
            Self::Modify => "Modify",
            Self::Move => "Move",
            Self::Replace => "Replace",
            Self::Remove => "Remove",
            Self::Clear => "Clear",
        }
    }

    /// Whether the operation changes positions in the list.
    pub fn is_positional(self) -> bool {
        matches!(self, Self::Insert | Self::Move | Self::Remove | Self::Clear)
    }
}

impl From<DeltaOperation> for u8 {
    fn from(op: DeltaOperation) -> Self {
        op.as_u8()
    }
}

impl TryFrom<u8> for DeltaOperation {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_u8(code).ok_or_else(|| format!("invalid delta operation code: {code}"))
    }
}

impl fmt::Display for DeltaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
