//! Wire messages exchanged over the broadcast transport.
//!
//! Messages are JSON objects with a `type` discriminator and camelCase
//! fields. `senderId` and `ts` are stamped when the message is sent, never by
//! the code that builds the body.

use crate::error::MessageError;
use crate::tab_id::TabId;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub type WidgetId = String;

/// Aggregate interest map as carried in a heartbeat
pub type SerializedInterests = BTreeMap<TabId, Vec<WidgetId>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessageBody {
    LeaderHeartbeat {
        #[serde(default)]
        interests: SerializedInterests,
        #[serde(rename = "peerCount", default)]
        peer_count: usize,
    },
    LeaderResign,
    InterestAnnounce {
        widgets: Vec<WidgetId>,
    },
    /// Opaque spot payload, `None` to deselect
    SpotSelected {
        #[serde(default)]
        spot: Option<Value>,
    },
    TabClosing,
    #[serde(other)]
    Unknown,
}

impl MessageBody {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageBody::LeaderHeartbeat { .. } => "leader-heartbeat",
            MessageBody::LeaderResign => "leader-resign",
            MessageBody::InterestAnnounce { .. } => "interest-announce",
            MessageBody::SpotSelected { .. } => "spot-selected",
            MessageBody::TabClosing => "tab-closing",
            MessageBody::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub body: MessageBody,
    #[serde(rename = "senderId")]
    pub sender_id: TabId,
    #[serde(default, deserialize_with = "millis_from_number")]
    pub ts: u64,
}

fn millis_from_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    Ok(if value.is_finite() && value > 0.0 {
        value as u64
    } else {
        0
    })
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(Envelope),
    /// Well-formed envelope with a `type` this version doesn't know
    Unknown { sender_id: TabId, kind: String },
}

impl Inbound {
    pub fn sender_id(&self) -> &TabId {
        match self {
            Inbound::Message(envelope) => &envelope.sender_id,
            Inbound::Unknown { sender_id, .. } => sender_id,
        }
    }
}

pub fn encode(body: &MessageBody, sender_id: &TabId, ts: u64) -> Result<String, MessageError> {
    let envelope = Envelope {
        body: body.clone(),
        sender_id: sender_id.clone(),
        ts,
    };
    Ok(serde_json::to_string(&envelope)?)
}

pub fn decode(raw: &str) -> Result<Inbound, MessageError> {
    let value: Value = serde_json::from_str(raw)?;
    let object = value.as_object().ok_or(MessageError::NotAnObject)?;
    let sender_id = object
        .get("senderId")
        .and_then(Value::as_str)
        .map(TabId::from)
        .ok_or(MessageError::MissingSender)?;
    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let envelope: Envelope = serde_json::from_value(value)?;
    if envelope.body == MessageBody::Unknown {
        return Ok(Inbound::Unknown { sender_id, kind });
    }
    Ok(Inbound::Message(envelope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sender() -> TabId {
        TabId::from("aaaabbbbccccdddd")
    }

    #[test]
    fn test_heartbeat_wire_shape() {
        let mut interests = SerializedInterests::new();
        interests.insert(TabId::from("t1"), vec!["widget-map".to_string()]);
        let raw = encode(
            &MessageBody::LeaderHeartbeat {
                interests,
                peer_count: 1,
            },
            &sender(),
            1_000,
        )
        .unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "leader-heartbeat",
                "interests": {"t1": ["widget-map"]},
                "peerCount": 1,
                "senderId": "aaaabbbbccccdddd",
                "ts": 1000
            })
        );
    }

    #[test]
    fn test_unit_messages_carry_only_type_and_stamp() {
        let raw = encode(&MessageBody::LeaderResign, &sender(), 5).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            json!({"type": "leader-resign", "senderId": "aaaabbbbccccdddd", "ts": 5})
        );
    }

    #[test]
    fn test_every_message_is_a_plain_object_for_javascript_tabs() {
        let bodies = [
            MessageBody::LeaderHeartbeat {
                interests: SerializedInterests::new(),
                peer_count: 0,
            },
            MessageBody::LeaderResign,
            MessageBody::InterestAnnounce { widgets: vec![] },
            MessageBody::SpotSelected { spot: None },
            MessageBody::TabClosing,
        ];
        for body in bodies {
            let raw = encode(&body, &sender(), 9).unwrap();
            let value: Value = serde_json::from_str(&raw).unwrap();
            let object = value.as_object().expect("posted as an object");
            assert_eq!(object["type"], body.kind());
            assert_eq!(object["senderId"], sender().as_str());
        }
    }

    #[test]
    fn test_decode_message_from_javascript_tab() {
        let raw = r#"{"type":"spot-selected","spot":{"callsign":"W1AW","frequency":"14.074"},"senderId":"1b4e28ba-2fa1-11d2-883f-0016d3cca427","ts":1700000000000}"#;
        let inbound = decode(raw).unwrap();
        let Inbound::Message(envelope) = inbound else {
            panic!("expected known message");
        };
        assert_eq!(
            envelope.sender_id.as_str(),
            "1b4e28ba-2fa1-11d2-883f-0016d3cca427"
        );
        assert_eq!(
            envelope.body,
            MessageBody::SpotSelected {
                spot: Some(json!({"callsign": "W1AW", "frequency": "14.074"}))
            }
        );
        assert_eq!(envelope.ts, 1_700_000_000_000);
    }

    #[test]
    fn test_null_spot_is_deselect() {
        let raw = r#"{"type":"spot-selected","spot":null,"senderId":"x","ts":1}"#;
        let Inbound::Message(envelope) = decode(raw).unwrap() else {
            panic!("expected known message");
        };
        assert_eq!(envelope.body, MessageBody::SpotSelected { spot: None });
    }

    #[test]
    fn test_heartbeat_defaults_when_fields_missing() {
        let raw = r#"{"type":"leader-heartbeat","senderId":"x"}"#;
        let Inbound::Message(envelope) = decode(raw).unwrap() else {
            panic!("expected known message");
        };
        assert_eq!(
            envelope.body,
            MessageBody::LeaderHeartbeat {
                interests: SerializedInterests::new(),
                peer_count: 0
            }
        );
        assert_eq!(envelope.ts, 0);
    }

    #[test]
    fn test_unknown_type_is_reported_not_rejected() {
        let raw = r#"{"type":"fetch-delegate","payload":[1,2],"senderId":"x","ts":1}"#;
        assert_eq!(
            decode(raw).unwrap(),
            Inbound::Unknown {
                sender_id: TabId::from("x"),
                kind: "fetch-delegate".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_non_objects_and_missing_sender() {
        assert!(matches!(decode("[1,2]"), Err(MessageError::NotAnObject)));
        assert!(matches!(decode("\"hi\""), Err(MessageError::NotAnObject)));
        assert!(matches!(
            decode(r#"{"type":"leader-resign"}"#),
            Err(MessageError::MissingSender)
        ));
        assert!(matches!(decode("{oops"), Err(MessageError::Malformed(_))));
    }

    #[test]
    fn test_malformed_announce_is_an_error() {
        let raw = r#"{"type":"interest-announce","widgets":"widget-map","senderId":"x"}"#;
        assert!(matches!(decode(raw), Err(MessageError::Malformed(_))));
    }
}
