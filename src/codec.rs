//! Pure serializer/deserializer for `Message` <-> wire bytes.
//!
//! The wire format is a structured record with exactly three top-level
//! fields (`message_name`, `meta_data`, `piggyback_data`). JSON is used as
//! the concrete encoding; any encoding that preserves this three-field
//! shape is conformant, so `WireMessage` is kept separate from `Message`
//! rather than deriving `Serialize`/`Deserialize` directly on the tagged
//! union.

use serde::{Deserialize, Serialize};

use crate::error::SwimError;
use crate::message::{Correlation, Message, MessageKind, PiggybackPayload};

#[derive(Serialize, Deserialize)]
struct WireMessage {
    message_name: String,
    meta_data: Option<Correlation>,
    piggyback_data: Option<PiggybackPayload>,
}

fn kind_from_wire_name(name: &str) -> Option<MessageKind> {
    Some(match name {
        "ping" => MessageKind::Ping,
        "ack" => MessageKind::Ack,
        "ping_req" => MessageKind::PingReq,
        "ping_req_ack" => MessageKind::PingReqAck,
        "test" => MessageKind::Test,
        _ => return None,
    })
}

/// Serializes `message` into a self-describing buffer suitable for sending
/// on the wire.
pub fn encode(message: &Message) -> Vec<u8> {
    let wire = WireMessage {
        message_name: message.kind.to_string(),
        meta_data: message.meta.clone(),
        piggyback_data: message.piggyback.clone(),
    };
    // A WireMessage built from a well-formed Message always serializes;
    // this can't fail short of an allocation failure.
    serde_json::to_vec(&wire).expect("WireMessage serialization is infallible")
}

/// Reconstructs a `Message` from `buffer`, or reports a deserialization
/// fault when the buffer is not well-formed or names an unknown message.
pub fn decode(buffer: &[u8]) -> Result<Message, SwimError> {
    let wire: WireMessage = serde_json::from_slice(buffer)?;
    let kind = kind_from_wire_name(&wire.message_name).ok_or(SwimError::UnknownMessageName {
        name: wire.message_name,
    })?;
    Ok(Message {
        kind,
        meta: wire.meta_data,
        piggyback: wire.piggyback_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ack, ping, ping_req, ping_req_ack, test as test_msg, MemberId};

    fn round_trip(m: Message) {
        let buf = encode(&m);
        let decoded = decode(&buf).expect("well-formed message decodes");
        assert!(m.eq_strict(&decoded), "{} != {}", m, decoded);
    }

    #[test]
    fn round_trips_every_message_kind() {
        round_trip(ping());
        round_trip(ack(None));
        round_trip(ping_req(MemberId::new("A"), MemberId::new("B")));
        round_trip(ping_req_ack(MemberId::new("A"), MemberId::new("B")));
        round_trip(test_msg());
    }

    #[test]
    fn round_trips_with_piggyback() {
        let m = ping().with_piggyback(PiggybackPayload {
            alive: vec![(MemberId::new("A"), 3)],
            dead: vec![(MemberId::new("B"), 7)],
        });
        round_trip(m);
    }

    #[test]
    fn malformed_buffer_is_a_deserialization_error() {
        let err = decode(b"not json").unwrap_err();
        assert!(matches!(err, SwimError::Deserialization(_)));
    }

    #[test]
    fn missing_required_field_is_a_deserialization_error() {
        let err = decode(br#"{"meta_data":null,"piggyback_data":null}"#).unwrap_err();
        assert!(matches!(err, SwimError::Deserialization(_)));
    }

    #[test]
    fn unknown_message_name_is_rejected() {
        let err = decode(br#"{"message_name":"shrug","meta_data":null,"piggyback_data":null}"#)
            .unwrap_err();
        assert!(matches!(err, SwimError::UnknownMessageName { .. }));
    }
}
