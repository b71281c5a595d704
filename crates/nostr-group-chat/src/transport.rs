use crate::{utils::now_ns, Error, Result, SendReceipt, TransportMessage};
use nostr::PublicKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// The conversation log collaborator: stores, timestamps and delivers messages.
///
/// Implementations own retries, encryption and signing. Every call may block on
/// the network; failures surface as `Error::Transport`.
pub trait ConversationTransport: Send + Sync {
    /// Every topic this transport can deliver history for.
    fn list_topics(&self) -> Result<Vec<String>>;

    /// Full materialized history of a topic.
    fn list_messages(&self, topic: &str) -> Result<Vec<TransportMessage>>;

    /// Append a message and return its id and network timestamp.
    fn send_message(
        &self,
        topic: &str,
        sender: PublicKey,
        kind: u32,
        payload: &[u8],
    ) -> Result<SendReceipt>;
}

#[derive(Default)]
struct Network {
    topics: HashMap<String, Vec<TransportMessage>>,
    last_sent_at_ns: u64,
    offline: bool,
}

/// Process-local transport shared by every client holding a clone.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    network: Arc<Mutex<Network>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Network>> {
        self.network
            .lock()
            .map_err(|_| Error::Transport("Network lock poisoned".to_string()))
    }

    /// Make every subsequent call fail until switched back.
    pub fn set_offline(&self, offline: bool) -> Result<()> {
        self.lock()?.offline = offline;
        Ok(())
    }

    /// Append a raw message as-is, bypassing id and timestamp assignment.
    pub fn inject(&self, topic: &str, message: TransportMessage) -> Result<()> {
        let mut network = self.lock()?;
        network.last_sent_at_ns = network.last_sent_at_ns.max(message.sent_at_ns);
        network
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(message);
        Ok(())
    }
}

impl ConversationTransport for InMemoryTransport {
    fn list_topics(&self) -> Result<Vec<String>> {
        let network = self.lock()?;
        if network.offline {
            return Err(Error::Transport("Cannot list topics: offline".to_string()));
        }
        let mut topics: Vec<String> = network.topics.keys().cloned().collect();
        topics.sort();
        Ok(topics)
    }

    fn list_messages(&self, topic: &str) -> Result<Vec<TransportMessage>> {
        let network = self.lock()?;
        if network.offline {
            return Err(Error::Transport(format!("Cannot list {topic}: offline")));
        }
        Ok(network.topics.get(topic).cloned().unwrap_or_default())
    }

    fn send_message(
        &self,
        topic: &str,
        sender: PublicKey,
        kind: u32,
        payload: &[u8],
    ) -> Result<SendReceipt> {
        let mut network = self.lock()?;
        if network.offline {
            return Err(Error::Transport(format!("Cannot send to {topic}: offline")));
        }

        let sent_at_ns = now_ns().max(network.last_sent_at_ns.saturating_add(1));
        network.last_sent_at_ns = sent_at_ns;
        let id = uuid::Uuid::new_v4().to_string();

        network
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(TransportMessage {
                id: id.clone(),
                sender,
                sent_at_ns,
                kind,
                payload: payload.to_vec(),
            });

        Ok(SendReceipt { id, sent_at_ns })
    }
}
