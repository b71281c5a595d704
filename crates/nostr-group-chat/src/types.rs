use nostr::PublicKey;
use serde::{Deserialize, Serialize};

/// Ordinary chat text. Shares the conversation log with control messages.
pub const CHAT_MESSAGE_KIND: u32 = 14;
/// Founding event carrying the initial member list. Exactly one per group.
pub const GROUP_GENESIS_KIND: u32 = 10450;
pub const GROUP_MEMBER_ADDED_KIND: u32 = 10451;
pub const GROUP_TITLE_CHANGED_KIND: u32 = 10452;

/// Returns true for kinds the replay engine folds into group state.
pub fn is_control_kind(kind: u32) -> bool {
    matches!(
        kind,
        GROUP_GENESIS_KIND | GROUP_MEMBER_ADDED_KIND | GROUP_TITLE_CHANGED_KIND
    )
}

/// A message as stored and delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportMessage {
    pub id: String,
    pub sender: PublicKey,
    /// Network-assigned timestamp in nanoseconds.
    pub sent_at_ns: u64,
    pub kind: u32,
    pub payload: Vec<u8>,
}

/// What the transport hands back after appending a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub id: String,
    pub sent_at_ns: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildOptions {
    /// Inclusive lower bound in nanoseconds. Genesis is replayed regardless.
    pub since: Option<u64>,
}

impl RebuildOptions {
    pub fn since(since_ns: u64) -> Self {
        Self {
            since: Some(since_ns),
        }
    }
}

/// Local notification emitted after a fold changed the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupChange {
    Activated,
    MemberAdded(PublicKey),
    TitleChanged(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_kinds_are_distinct_from_chat() {
        assert!(is_control_kind(GROUP_GENESIS_KIND));
        assert!(is_control_kind(GROUP_MEMBER_ADDED_KIND));
        assert!(is_control_kind(GROUP_TITLE_CHANGED_KIND));
        assert!(!is_control_kind(CHAT_MESSAGE_KIND));
        assert!(!is_control_kind(10453));
    }

    #[test]
    fn rebuild_options_default_is_unwindowed() {
        assert_eq!(RebuildOptions::default().since, None);
        assert_eq!(RebuildOptions::since(42).since, Some(42));
    }
}
