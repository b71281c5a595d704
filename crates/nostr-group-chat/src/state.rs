//! Materialized group state and the deterministic fold that produces it.
//!
//! `merge` is the only place group state changes. It assumes its input is in
//! replay order (see `event_log::order_events`) and is idempotent: folding the
//! same events twice leaves the state where folding them once put it.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nostr::PublicKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::codec::{ControlAction, ControlEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationType {
    Group,
}

/// Fixed at Genesis and never touched again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMetadata {
    pub conversation_type: ConversationType,
    pub creator_inbox_id: PublicKey,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupState {
    members: Vec<PublicKey>,
    title: String,
    is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at_ns: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    added_by: Option<PublicKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<GroupMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    genesis_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_event_at_ns: Option<u64>,
}

impl GroupState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Members in first-seen order. Genesis members form the prefix.
    pub fn members(&self) -> &[PublicKey] {
        &self.members
    }

    pub fn is_member(&self, pubkey: &PublicKey) -> bool {
        self.members.contains(pubkey)
    }

    /// Empty string means the title was never set.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at_ns(&self) -> Option<u64> {
        self.created_at_ns
    }

    pub fn created_at(&self) -> Option<SystemTime> {
        self.created_at_ns.map(|ns| UNIX_EPOCH + Duration::from_nanos(ns))
    }

    /// Identity that founded the group (the Genesis sender).
    pub fn added_by(&self) -> Option<&PublicKey> {
        self.added_by.as_ref()
    }

    pub fn metadata(&self) -> Option<&GroupMetadata> {
        self.metadata.as_ref()
    }

    /// Timestamp of the newest event folded so far.
    pub fn last_event_at_ns(&self) -> Option<u64> {
        self.last_event_at_ns
    }

    /// Fold a single event. Returns whether the visible state changed.
    pub fn apply(&mut self, event: &ControlEvent) -> bool {
        self.last_event_at_ns = Some(
            self.last_event_at_ns
                .map_or(event.sent_at_ns, |at| at.max(event.sent_at_ns)),
        );

        match &event.action {
            ControlAction::Genesis { members } => {
                if self.is_active {
                    if self.genesis_id.as_deref() != Some(event.message_id.as_str()) {
                        tracing::warn!(
                            message_id = %event.message_id,
                            sender = %event.sender,
                            "ignoring additional genesis event"
                        );
                    }
                    return false;
                }
                let mut founding: Vec<PublicKey> = Vec::with_capacity(members.len());
                for member in members {
                    if !founding.contains(member) {
                        founding.push(*member);
                    }
                }
                // Windowed replays on a fresh state may have seen adds before
                // Genesis was folded in; keep those after the founding prefix.
                for member in self.members.drain(..) {
                    if !founding.contains(&member) {
                        founding.push(member);
                    }
                }
                self.members = founding;
                self.is_active = true;
                self.created_at_ns = Some(event.sent_at_ns);
                self.added_by = Some(event.sender);
                self.genesis_id = Some(event.message_id.clone());
                self.metadata = Some(GroupMetadata {
                    conversation_type: ConversationType::Group,
                    creator_inbox_id: event.sender,
                });
                true
            }
            ControlAction::MemberAdded { member } => {
                if self.members.contains(member) {
                    return false;
                }
                self.members.push(*member);
                true
            }
            ControlAction::TitleChanged { title } => {
                if self.title == *title {
                    return false;
                }
                self.title = title.clone();
                true
            }
        }
    }

    /// Deterministic digest of the visible state, for comparing replicas.
    ///
    /// Members are hashed as a set: replicas that folded local adds before
    /// remote ones hold the same members in a different first-seen order.
    pub fn state_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();

        hasher.update(b"C");
        if let Some(creator) = &self.added_by {
            hasher.update(creator.to_bytes());
        }
        hasher.update(self.created_at_ns.unwrap_or_default().to_le_bytes());
        hasher.update([self.is_active as u8]);

        hasher.update(b"M");
        let mut members: Vec<[u8; 32]> = self.members.iter().map(|pk| pk.to_bytes()).collect();
        members.sort_unstable();
        hasher.update((members.len() as u64).to_le_bytes());
        for member in &members {
            hasher.update(member);
        }

        hasher.update(b"T");
        hasher.update((self.title.len() as u64).to_le_bytes());
        hasher.update(self.title.as_bytes());

        hasher.finalize().into()
    }

    pub fn state_hash_hex(&self) -> String {
        hex::encode(self.state_hash())
    }
}

/// Fold `events`, already in replay order, on top of `state`.
pub fn merge(mut state: GroupState, events: &[ControlEvent]) -> GroupState {
    for event in events {
        state.apply(event);
    }
    state
}
