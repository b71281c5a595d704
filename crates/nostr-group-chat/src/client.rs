use std::sync::Arc;

use nostr::PublicKey;

use crate::codec::ControlAction;
use crate::event_log::order_events;
use crate::{
    merge, ConversationTransport, GroupState, Result, SendReceipt, TransportMessage,
    CHAT_MESSAGE_KIND,
};

/// An identity bound to a transport.
#[derive(Clone)]
pub struct Client {
    address: PublicKey,
    transport: Arc<dyn ConversationTransport>,
}

impl Client {
    pub fn new(address: PublicKey, transport: Arc<dyn ConversationTransport>) -> Self {
        Self { address, transport }
    }

    pub fn address(&self) -> PublicKey {
        self.address
    }

    /// Bind a handle to an existing topic. No I/O.
    pub fn conversation(&self, topic: impl Into<String>) -> Conversation {
        Conversation {
            topic: topic.into(),
            client: self.clone(),
        }
    }

    /// Group conversations this identity belongs to, by topic order.
    ///
    /// A topic counts once its replayed membership includes us, whether we
    /// were named at Genesis or added later. Topics without a Genesis are
    /// skipped.
    pub fn conversations(&self) -> Result<Vec<Conversation>> {
        let mut conversations = Vec::new();
        for topic in self.transport.list_topics()? {
            let messages = self.transport.list_messages(&topic)?;
            let state = merge(GroupState::new(), &order_events(&messages, None));
            if state.is_active() && state.is_member(&self.address) {
                conversations.push(self.conversation(topic));
            }
        }
        tracing::trace!(
            address = %self.address,
            count = conversations.len(),
            "listed conversations"
        );
        Ok(conversations)
    }

    /// Found a group on a fresh topic by appending its Genesis event.
    ///
    /// The creator is always the first member; duplicates are dropped.
    pub fn new_group_conversation(&self, members: &[PublicKey]) -> Result<Conversation> {
        let mut all_members = vec![self.address];
        for pk in members {
            if !all_members.contains(pk) {
                all_members.push(*pk);
            }
        }

        let conversation = self.conversation(uuid::Uuid::new_v4().to_string());
        conversation.send_control(&ControlAction::Genesis {
            members: all_members,
        })?;
        tracing::debug!(topic = %conversation.topic, creator = %self.address, "created group conversation");
        Ok(conversation)
    }
}

/// An ordinary chat message from the shared conversation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub id: String,
    pub sender_address: PublicKey,
    pub sent_at_ns: u64,
    pub content: String,
}

/// Handle on one conversation topic, as seen by one client.
#[derive(Clone)]
pub struct Conversation {
    topic: String,
    client: Client,
}

impl Conversation {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Our own identity in this conversation.
    pub fn address(&self) -> PublicKey {
        self.client.address
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn send(&self, text: &str) -> Result<SendReceipt> {
        self.client.transport.send_message(
            &self.topic,
            self.client.address,
            CHAT_MESSAGE_KIND,
            text.as_bytes(),
        )
    }

    /// Chat messages in log order. Control events never show up here.
    pub fn messages(&self) -> Result<Vec<DecodedMessage>> {
        let mut messages: Vec<DecodedMessage> = self
            .raw_messages()?
            .into_iter()
            .filter(|m| m.kind == CHAT_MESSAGE_KIND)
            .filter_map(|m| match String::from_utf8(m.payload) {
                Ok(content) => Some(DecodedMessage {
                    id: m.id,
                    sender_address: m.sender,
                    sent_at_ns: m.sent_at_ns,
                    content,
                }),
                Err(e) => {
                    tracing::debug!(message_id = %m.id, error = %e, "skipping non-utf8 chat message");
                    None
                }
            })
            .collect();
        messages.sort_by(|a, b| (a.sent_at_ns, &a.id).cmp(&(b.sent_at_ns, &b.id)));
        messages.dedup_by(|a, b| a.id == b.id);
        Ok(messages)
    }

    pub(crate) fn raw_messages(&self) -> Result<Vec<TransportMessage>> {
        self.client.transport.list_messages(&self.topic)
    }

    pub(crate) fn send_control(&self, action: &ControlAction) -> Result<SendReceipt> {
        let payload = action.encode_payload()?;
        self.client
            .transport
            .send_message(&self.topic, self.client.address, action.kind(), &payload)
    }
}
