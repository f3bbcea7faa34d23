use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{DeltaMessage, MAX_MESSAGE_SIZE};

/// Length prefix plus tag byte.
const HEADER_LEN: usize = 5;

/// Codec for framing delta messages.
pub struct DeltaCodec;

impl DeltaCodec {
    /// Encode a message with framing: [4 bytes len][1 byte tag][payload]
    pub fn encode(msg: &DeltaMessage) -> ProtocolResult<Bytes> {
        let payload = Self::encode_payload(msg)?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
        buf.put_u32((payload.len() + 1) as u32);
        buf.put_u8(msg.type_tag());
        buf.put_slice(&payload);
        trace!(kind = msg.type_name(), len = payload.len(), "encoded frame");
        Ok(buf.freeze())
    }

    /// Decode a framed message. Returns (message, bytes_consumed).
    pub fn decode(data: &[u8]) -> ProtocolResult<(DeltaMessage, usize)> {
        if data.len() < HEADER_LEN {
            return Err(ProtocolError::FramingError("too short".into()));
        }
        let mut header = &data[..HEADER_LEN];
        let len = frame_len(header.get_u32())?;
        let total = 4 + len;
        if data.len() < total {
            return Err(ProtocolError::FramingError(format!(
                "incomplete: have {}, need {}",
                data.len(),
                total
            )));
        }
        let tag = header.get_u8();
        let msg = Self::decode_payload(tag, &data[HEADER_LEN..total])?;
        Ok((msg, total))
    }

    /// Take one complete frame off the front of `buf`.
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched while the frame is
    /// still incomplete.
    pub fn decode_buf(buf: &mut BytesMut) -> ProtocolResult<Option<DeltaMessage>> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let len = frame_len(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]))?;
        if buf.len() < 4 + len {
            return Ok(None);
        }
        let frame = buf.split_to(4 + len);
        let (msg, _) = Self::decode(&frame)?;
        Ok(Some(msg))
    }

    /// Encode payload only (no framing).
    pub fn encode_payload(msg: &DeltaMessage) -> ProtocolResult<Vec<u8>> {
        let encoded = match msg {
            DeltaMessage::Record { delta } => bincode::serialize(delta),
            DeltaMessage::List { entries } => bincode::serialize(entries),
            DeltaMessage::Error { code, message } => bincode::serialize(&(code, message)),
        };
        encoded.map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Decode payload only (no framing); `tag` selects the message kind.
    pub fn decode_payload(tag: u8, data: &[u8]) -> ProtocolResult<DeltaMessage> {
        let de = |e: bincode::Error| ProtocolError::Deserialization(e.to_string());
        match tag {
            1 => Ok(DeltaMessage::Record {
                delta: bincode::deserialize(data).map_err(de)?,
            }),
            2 => Ok(DeltaMessage::List {
                entries: bincode::deserialize(data).map_err(de)?,
            }),
            255 => {
                let (code, message) = bincode::deserialize(data).map_err(de)?;
                Ok(DeltaMessage::Error { code, message })
            }
            other => Err(ProtocolError::InvalidMessageType(other)),
        }
    }
}

/// Validate a length prefix; returns the frame length after the prefix.
fn frame_len(len: u32) -> ProtocolResult<usize> {
    let len = len as usize;
    if len < 1 {
        return Err(ProtocolError::FramingError("zero-length frame".into()));
    }
    if len - 1 > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len - 1,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatdelta_types::{
        DeltaOperation, ElementDelta, ListDeltaEntry, RecordDelta, SlotValue, UnionChange,
        UnionDelta, Value,
    };

    fn record_delta() -> RecordDelta {
        let mut d = RecordDelta::new(4, false);
        d.mark(0, Some(SlotValue::Value(Value::Int(-3))));
        d.mark(2, None);
        d.mark(3, Some(SlotValue::Record(RecordDelta::new(1, false))));
        d
    }

    fn entry(
        operation: DeltaOperation,
        current_index: i32,
        new_index: i32,
        base_value: Option<Value>,
        delta_value: Option<ElementDelta>,
    ) -> ListDeltaEntry<Value, ElementDelta> {
        ListDeltaEntry {
            operation,
            current_index,
            new_index,
            base_value,
            delta_value,
        }
    }

    macro_rules! roundtrip_test {
        ($name:ident, $msg:expr) => {
            #[test]
            fn $name() {
                let msg = $msg;
                let encoded = DeltaCodec::encode(&msg).unwrap();
                let (decoded, consumed) = DeltaCodec::decode(&encoded).unwrap();
                assert_eq!(consumed, encoded.len());
                assert_eq!(encoded[4], msg.type_tag());
                assert_eq!(decoded, msg);
            }
        };
    }

    roundtrip_test!(empty_record_roundtrip, DeltaMessage::Record {
        delta: RecordDelta::new(0, false),
    });

    roundtrip_test!(record_roundtrip, DeltaMessage::Record {
        delta: record_delta(),
    });

    roundtrip_test!(wide_record_roundtrip, DeltaMessage::Record {
        delta: {
            let mut d = RecordDelta::new(300, true);
            d.mark(255, Some(SlotValue::Value(Value::from("edge"))));
            d.mark(256, Some(SlotValue::Value(Value::UInt(7))));
            d
        },
    });

    roundtrip_test!(nested_record_roundtrip, DeltaMessage::Record {
        delta: {
            let mut d = RecordDelta::new(6, false);
            d.mark(1, Some(SlotValue::Union(UnionDelta {
                discriminator: 2,
                delta: record_delta(),
            })));
            d.mark(3, Some(SlotValue::List(vec![entry(
                DeltaOperation::Remove,
                0,
                -1,
                None,
                None,
            )])));
            d.mark(5, Some(SlotValue::Value(Value::Union {
                tag: 1,
                value: Box::new(Value::Struct(vec![Value::Float(0.5), Value::Bool(true)])),
            })));
            d
        },
    });

    roundtrip_test!(list_roundtrip, DeltaMessage::List {
        entries: vec![
            entry(DeltaOperation::Clear, -1, -1, None, None),
            entry(DeltaOperation::Insert, -1, 0, Some(Value::List(vec![Value::Int(1)])), None),
            entry(DeltaOperation::Move, 2, 0, None, None),
            entry(DeltaOperation::Replace, 1, -1, Some(Value::Null), None),
            entry(DeltaOperation::Modify, 0, -1, None, Some(ElementDelta::Record(record_delta()))),
            entry(
                DeltaOperation::Modify,
                1,
                -1,
                None,
                Some(ElementDelta::Union(UnionChange::Replaced(Value::none_union()))),
            ),
        ],
    });

    roundtrip_test!(error_roundtrip, DeltaMessage::Error {
        code: 404,
        message: "not found".into(),
    });

    #[test]
    fn type_tags_unique() {
        let msgs = [
            DeltaMessage::Record {
                delta: RecordDelta::default(),
            },
            DeltaMessage::List { entries: vec![] },
            DeltaMessage::Error {
                code: 0,
                message: String::new(),
            },
        ];
        let mut tags: Vec<u8> = msgs.iter().map(|m| m.type_tag()).collect();
        let len = tags.len();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), len, "type tags should be unique");
    }

    #[test]
    fn type_names_correct() {
        let msg = DeltaMessage::List { entries: vec![] };
        assert_eq!(msg.type_name(), "List");
        let msg = DeltaMessage::Error {
            code: 0,
            message: String::new(),
        };
        assert_eq!(msg.type_name(), "Error");
    }

    #[test]
    fn frame_header_layout() {
        let msg = DeltaMessage::Error {
            code: 1,
            message: "x".into(),
        };
        let encoded = DeltaCodec::encode(&msg).unwrap();
        let payload = DeltaCodec::encode_payload(&msg).unwrap();
        assert_eq!(&encoded[..4], &((payload.len() + 1) as u32).to_be_bytes());
        assert_eq!(encoded[4], 255);
        assert_eq!(&encoded[5..], payload.as_slice());
    }

    #[test]
    fn record_payload_layout() {
        let mut d = RecordDelta::new(2, false);
        d.mark(1, Some(SlotValue::Value(Value::Bool(true))));
        let bytes = DeltaCodec::encode_payload(&DeltaMessage::Record { delta: d }).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&1u64.to_le_bytes());
        expected.push(1); // dirty slot
        expected.push(0); // no short list
        expected.extend_from_slice(&2u64.to_le_bytes());
        expected.push(0); // slot 0: None
        expected.push(1); // slot 1: Some
        expected.extend_from_slice(&0u32.to_le_bytes()); // SlotValue::Value
        expected.extend_from_slice(&1u32.to_le_bytes()); // Value::Bool
        expected.push(1);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn list_payload_layout() {
        let msg = DeltaMessage::List {
            entries: vec![entry(DeltaOperation::Insert, -1, 0, Some(Value::Int(5)), None)],
        };
        let bytes = DeltaCodec::encode_payload(&msg).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&1u64.to_le_bytes());
        expected.push(0); // Insert
        expected.extend_from_slice(&(-1i32).to_le_bytes());
        expected.extend_from_slice(&0i32.to_le_bytes());
        expected.push(1);
        expected.extend_from_slice(&2u32.to_le_bytes()); // Value::Int
        expected.extend_from_slice(&5i64.to_le_bytes());
        expected.push(0);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn decode_truncated() {
        let err = DeltaCodec::decode(&[0, 0, 0]).unwrap_err();
        assert!(matches!(err, ProtocolError::FramingError(_)));
    }

    #[test]
    fn decode_zero_length() {
        let data = [0u8, 0, 0, 0, 0]; // length = 0
        let err = DeltaCodec::decode(&data).unwrap_err();
        assert!(matches!(err, ProtocolError::FramingError(_)));
    }

    #[test]
    fn decode_incomplete() {
        let encoded = DeltaCodec::encode(&DeltaMessage::Record {
            delta: record_delta(),
        })
        .unwrap();
        let err = DeltaCodec::decode(&encoded[..encoded.len() - 1]).unwrap_err();
        assert!(matches!(err, ProtocolError::FramingError(_)));
    }

    #[test]
    fn decode_oversized() {
        let mut data = ((MAX_MESSAGE_SIZE + 2) as u32).to_be_bytes().to_vec();
        data.push(1);
        let err = DeltaCodec::decode(&data).unwrap_err();
        assert!(matches!(err, ProtocolError::MessageTooLarge { .. }));
    }

    #[test]
    fn decode_unknown_tag() {
        let mut data = 1u32.to_be_bytes().to_vec();
        data.push(9);
        let err = DeltaCodec::decode(&data).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessageType(9)));
    }

    #[test]
    fn decode_garbage_payload() {
        let mut data = 3u32.to_be_bytes().to_vec();
        data.extend_from_slice(&[1, 0xFF, 0xFF]);
        let err = DeltaCodec::decode(&data).unwrap_err();
        assert!(matches!(err, ProtocolError::Deserialization(_)));
    }

    #[test]
    fn decode_buf_streams_frames() {
        let first = DeltaMessage::Record {
            delta: record_delta(),
        };
        let second = DeltaMessage::Error {
            code: 7,
            message: "later".into(),
        };
        let a = DeltaCodec::encode(&first).unwrap();
        let b = DeltaCodec::encode(&second).unwrap();

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&a);
        buf.extend_from_slice(&b[..3]);
        assert_eq!(DeltaCodec::decode_buf(&mut buf).unwrap(), Some(first));
        assert_eq!(DeltaCodec::decode_buf(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 3);

        buf.extend_from_slice(&b[3..]);
        assert_eq!(DeltaCodec::decode_buf(&mut buf).unwrap(), Some(second));
        assert!(buf.is_empty());
    }

    #[test]
    fn payload_roundtrip() {
        let msg = DeltaMessage::Record {
            delta: record_delta(),
        };
        let bytes = DeltaCodec::encode_payload(&msg).unwrap();
        let decoded = DeltaCodec::decode_payload(msg.type_tag(), &bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn remote_error_surfaces() {
        let msg = DeltaMessage::Error {
            code: 500,
            message: "boom".into(),
        };
        assert!(matches!(
            msg.into_result(),
            Err(ProtocolError::RemoteError { code: 500, .. })
        ));
        let msg = DeltaMessage::from(record_delta());
        assert!(msg.into_result().is_ok());
    }

    // ---------------------------------------------------------------
    // End to end
    // ---------------------------------------------------------------

    mod engine {
        use super::*;
        use flatdelta_engine::{Entity, FieldValue};
        use flatdelta_types::{ElementKind, FieldDescriptor, FieldKind, ScalarKind, Schema};

        #[test]
        fn entity_delta_crosses_the_wire() {
            let mut b = Schema::builder();
            let item = b.record(
                "Item",
                vec![FieldDescriptor::scalar("qty", 0, ScalarKind::UInt)],
            );
            let order = b.record(
                "Order",
                vec![
                    FieldDescriptor::scalar("id", 0, ScalarKind::UInt),
                    FieldDescriptor::new("lines", 1, FieldKind::Vector(ElementKind::Table(item))),
                ],
            );
            let schema = b.build().unwrap();
            let ty = schema.record_type(order);

            let mut sender = Entity::new(ty.clone());
            let mut receiver = Entity::new(ty.clone());
            sender.set_value("id", 1u64).unwrap();
            let lines = sender.init_list("lines").unwrap().as_tables_mut().unwrap();
            let mut line = Entity::new(schema.record_type(item));
            line.set_value("qty", 2u64).unwrap();
            lines.push(line);

            for _ in 0..2 {
                let delta = sender.get_delta().unwrap();
                let frame = DeltaCodec::encode(&delta.into()).unwrap();
                let (msg, _) = DeltaCodec::decode(&frame).unwrap();
                let DeltaMessage::Record { delta } = msg else {
                    panic!("expected a record message");
                };
                receiver.apply_delta(Some(&delta));
                assert_eq!(receiver.to_value(), sender.to_value());

                sender.update_reference_state();
                receiver.update_reference_state();
                sender
                    .list_mut("lines")
                    .unwrap()
                    .as_tables_mut()
                    .unwrap()
                    .get_mut(0)
                    .unwrap()
                    .set_value("qty", 5u64)
                    .unwrap();
            }
            assert!(matches!(receiver.field("lines"), Some(FieldValue::List(_))));
        }

        #[test]
        fn list_delta_crosses_the_wire() {
            let mut b = Schema::builder();
            let holder = b.record(
                "Holder",
                vec![FieldDescriptor::new(
                    "names",
                    0,
                    FieldKind::Vector(ElementKind::Scalar(ScalarKind::String)),
                )],
            );
            let schema = b.build().unwrap();
            let ty = schema.record_type(holder);

            let mut sender = Entity::new(ty.clone());
            let names = sender.init_list("names").unwrap();
            let base = names.to_value();
            names.update_reference_state();
            let tracker = names.as_values_mut().unwrap();
            tracker.push("a".into());
            tracker.push("b".into());
            tracker.move_item(1, 0).unwrap();
            let entries = names_delta(&mut sender);

            let frame = DeltaCodec::encode(&entries.into()).unwrap();
            let (msg, _) = DeltaCodec::decode(&frame).unwrap();
            let DeltaMessage::List { entries } = msg else {
                panic!("expected a list message");
            };

            let mut receiver = Entity::from_value(ty, &Value::Table(vec![base]));
            receiver
                .list_mut("names")
                .unwrap()
                .apply_delta(Some(entries.as_slice()));
            assert_eq!(receiver.to_value(), sender.to_value());
        }

        fn names_delta(e: &mut Entity) -> Vec<ListDeltaEntry<Value, ElementDelta>> {
            e.list_mut("names").unwrap().get_delta().unwrap()
        }
    }
}
