//! Classification and decoding of transport messages into control events.
//!
//! Control payloads are small JSON objects keyed by the message kind. Kinds this
//! module does not know are reported as "not a control event" so that newer
//! peers can extend the log without breaking older replicas.

use nostr::PublicKey;
use serde::{Deserialize, Serialize};

use crate::utils::parse_address;
use crate::{
    Error, Result, TransportMessage, GROUP_GENESIS_KIND, GROUP_MEMBER_ADDED_KIND,
    GROUP_TITLE_CHANGED_KIND,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ControlAction {
    Genesis { members: Vec<PublicKey> },
    MemberAdded { member: PublicKey },
    TitleChanged { title: String },
}

impl ControlAction {
    pub fn kind(&self) -> u32 {
        match self {
            ControlAction::Genesis { .. } => GROUP_GENESIS_KIND,
            ControlAction::MemberAdded { .. } => GROUP_MEMBER_ADDED_KIND,
            ControlAction::TitleChanged { .. } => GROUP_TITLE_CHANGED_KIND,
        }
    }

    /// Serialize the payload for the transport. The kind travels separately.
    pub fn encode_payload(&self) -> Result<Vec<u8>> {
        let bytes = match self {
            ControlAction::Genesis { members } => serde_json::to_vec(&GenesisPayload {
                members: members.iter().map(|pk| pk.to_hex()).collect(),
            })?,
            ControlAction::MemberAdded { member } => serde_json::to_vec(&MemberAddedPayload {
                member: member.to_hex(),
            })?,
            ControlAction::TitleChanged { title } => {
                serde_json::to_vec(&TitleChangedPayload {
                    title: title.clone(),
                })?
            }
        };
        Ok(bytes)
    }
}

/// A decoded control message together with its log envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlEvent {
    pub message_id: String,
    pub sender: PublicKey,
    pub sent_at_ns: u64,
    pub action: ControlAction,
}

impl ControlEvent {
    pub fn is_genesis(&self) -> bool {
        matches!(self.action, ControlAction::Genesis { .. })
    }

    /// Total replay order: timestamp first, message id as tie-break.
    pub fn order_key(&self) -> (u64, &str) {
        (self.sent_at_ns, self.message_id.as_str())
    }
}

#[derive(Serialize, Deserialize)]
struct GenesisPayload {
    members: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct MemberAddedPayload {
    member: String,
}

#[derive(Serialize, Deserialize)]
struct TitleChangedPayload {
    title: String,
}

/// Decode one transport message.
///
/// Returns `Ok(None)` for chat and unknown kinds, `Err(Error::Decode)` when a
/// known control kind carries a payload that cannot be understood.
pub fn decode_message(message: &TransportMessage) -> Result<Option<ControlEvent>> {
    let malformed = |reason: String| Error::Decode {
        kind: message.kind,
        message_id: message.id.clone(),
        reason,
    };

    let action = match message.kind {
        GROUP_GENESIS_KIND => {
            let payload: GenesisPayload =
                serde_json::from_slice(&message.payload).map_err(|e| malformed(e.to_string()))?;
            let members = payload
                .members
                .iter()
                .map(|m| parse_address(m).map_err(|e| malformed(e.to_string())))
                .collect::<Result<Vec<_>>>()?;
            ControlAction::Genesis { members }
        }
        GROUP_MEMBER_ADDED_KIND => {
            let payload: MemberAddedPayload =
                serde_json::from_slice(&message.payload).map_err(|e| malformed(e.to_string()))?;
            let member = parse_address(&payload.member).map_err(|e| malformed(e.to_string()))?;
            ControlAction::MemberAdded { member }
        }
        GROUP_TITLE_CHANGED_KIND => {
            let payload: TitleChangedPayload =
                serde_json::from_slice(&message.payload).map_err(|e| malformed(e.to_string()))?;
            ControlAction::TitleChanged {
                title: payload.title,
            }
        }
        _ => return Ok(None),
    };

    Ok(Some(ControlEvent {
        message_id: message.id.clone(),
        sender: message.sender,
        sent_at_ns: message.sent_at_ns,
        action,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CHAT_MESSAGE_KIND;
    use nostr::Keys;

    fn message(kind: u32, payload: &[u8]) -> TransportMessage {
        TransportMessage {
            id: "m1".to_string(),
            sender: Keys::generate().public_key(),
            sent_at_ns: 1_700_000_000_000_000_000,
            kind,
            payload: payload.to_vec(),
        }
    }

    fn encoded(action: &ControlAction) -> TransportMessage {
        message(action.kind(), &action.encode_payload().unwrap())
    }

    #[test]
    fn decodes_genesis_preserving_member_order() {
        let a = Keys::generate().public_key();
        let b = Keys::generate().public_key();
        let c = Keys::generate().public_key();
        let msg = encoded(&ControlAction::Genesis {
            members: vec![c, a, b],
        });

        let event = decode_message(&msg).unwrap().unwrap();
        assert_eq!(event.action, ControlAction::Genesis { members: vec![c, a, b] });
        assert_eq!(event.message_id, "m1");
        assert_eq!(event.sender, msg.sender);
        assert_eq!(event.sent_at_ns, msg.sent_at_ns);
        assert!(event.is_genesis());
    }

    #[test]
    fn decodes_member_added_and_title() {
        let d = Keys::generate().public_key();
        let added = decode_message(&encoded(&ControlAction::MemberAdded { member: d }))
            .unwrap()
            .unwrap();
        assert_eq!(added.action, ControlAction::MemberAdded { member: d });

        let titled = decode_message(&encoded(&ControlAction::TitleChanged {
            title: "the fun group".to_string(),
        }))
        .unwrap()
        .unwrap();
        assert_eq!(
            titled.action,
            ControlAction::TitleChanged {
                title: "the fun group".to_string()
            }
        );
    }

    #[test]
    fn payload_is_json_with_hex_addresses() {
        let d = Keys::generate().public_key();
        let bytes = ControlAction::MemberAdded { member: d }
            .encode_payload()
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["member"], d.to_hex());
    }

    #[test]
    fn chat_and_unknown_kinds_are_not_control() {
        assert!(decode_message(&message(CHAT_MESSAGE_KIND, b"hi everyone"))
            .unwrap()
            .is_none());
        assert!(decode_message(&message(10499, b"\x00\x01garbage"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn ignores_unknown_fields_in_known_kinds() {
        let msg = message(
            GROUP_TITLE_CHANGED_KIND,
            br#"{"title":"t","emoji":"party","v":2}"#,
        );
        let event = decode_message(&msg).unwrap().unwrap();
        assert_eq!(
            event.action,
            ControlAction::TitleChanged {
                title: "t".to_string()
            }
        );
    }

    #[test]
    fn malformed_known_kind_is_recoverable_decode_error() {
        let err = decode_message(&message(GROUP_MEMBER_ADDED_KIND, b"not json")).unwrap_err();
        assert!(err.is_recoverable());
        match err {
            Error::Decode {
                kind, message_id, ..
            } => {
                assert_eq!(kind, GROUP_MEMBER_ADDED_KIND);
                assert_eq!(message_id, "m1");
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_address_in_payload_is_malformed() {
        let msg = message(GROUP_GENESIS_KIND, br#"{"members":["zz"]}"#);
        assert!(matches!(decode_message(&msg), Err(Error::Decode { .. })));

        let msg = message(GROUP_MEMBER_ADDED_KIND, br#"{"member":42}"#);
        assert!(matches!(decode_message(&msg), Err(Error::Decode { .. })));
    }
}
