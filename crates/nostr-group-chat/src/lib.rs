//! Group chat state derived from an append-only conversation log.
//!
//! Group membership and title are never stored as mutable records. Members
//! append control events (genesis, member added, title changed) to the same
//! log that carries chat, and every replica folds those events in one
//! deterministic order to reach the same view.

pub mod client;
pub mod codec;
pub mod error;
pub mod event_log;
pub mod group_chat;
pub mod state;
pub mod storage;
pub mod transport;
pub mod types;
pub mod utils;

pub use client::{Client, Conversation, DecodedMessage};
pub use codec::{decode_message, ControlAction, ControlEvent};
pub use error::{Error, Result};
pub use event_log::{events, order_events};
pub use group_chat::{GroupChat, GroupChatOptions};
pub use state::{merge, ConversationType, GroupMetadata, GroupState};
pub use storage::{GroupSnapshot, InMemorySnapshotStore, SnapshotStore};
pub use transport::{ConversationTransport, InMemoryTransport};
pub use types::*;
pub use utils::parse_address;
