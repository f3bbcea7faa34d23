//! Wire codec for flatdelta.
//!
//! Frames record and list deltas for transport. A frame is
//! `[4 bytes big-endian length][1 byte tag][payload]`, where the length
//! counts the tag and the payload. The payload is the bincode encoding of
//! the delta itself, so its bytes match the delta wire layout exactly.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::DeltaCodec;
pub use error::{ProtocolError, ProtocolResult};
pub use message::{DeltaMessage, MAX_MESSAGE_SIZE, PROTOCOL_VERSION};
