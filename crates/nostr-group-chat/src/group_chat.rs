use std::sync::Arc;
use std::time::SystemTime;

use crossbeam_channel::{Receiver, Sender};
use nostr::PublicKey;

use crate::codec::{ControlAction, ControlEvent};
use crate::event_log;
use crate::storage::{GroupSnapshot, SnapshotStore};
use crate::utils::parse_address;
use crate::{
    merge, Client, Conversation, Error, GroupChange, GroupMetadata, GroupState, RebuildOptions,
    Result,
};

#[derive(Clone, Default)]
pub struct GroupChatOptions {
    pub snapshot_store: Option<Arc<dyn SnapshotStore>>,
}

/// Group view over one conversation, materialized by replaying its control log.
///
/// Every mutating method takes `&mut self`, so a single view is never folded
/// concurrently. Independent views over the same topic share nothing and
/// converge through the replay order alone.
pub struct GroupChat {
    conversation: Conversation,
    state: GroupState,
    // Newest log timestamp covered by a fetch. Local appends never move it.
    synced_through_ns: Option<u64>,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
    subscribers: Vec<Sender<GroupChange>>,
}

impl GroupChat {
    /// Zero-state view. Performs no I/O.
    pub fn new(client: &Client, conversation: &Conversation) -> Self {
        Self::with_options(client, conversation, GroupChatOptions::default())
    }

    pub fn with_options(
        client: &Client,
        conversation: &Conversation,
        opts: GroupChatOptions,
    ) -> Self {
        Self {
            conversation: client.conversation(conversation.topic()),
            state: GroupState::new(),
            synced_through_ns: None,
            snapshot_store: opts.snapshot_store,
            subscribers: Vec::new(),
        }
    }

    /// Construct and run a full rebuild before returning.
    pub fn from_conversation(client: &Client, conversation: &Conversation) -> Result<Self> {
        let mut group = Self::new(client, conversation);
        group.rebuild(RebuildOptions::default())?;
        Ok(group)
    }

    /// Load the stored snapshot, if any, and replay only the tail of the log.
    pub fn restore(
        client: &Client,
        conversation: &Conversation,
        opts: GroupChatOptions,
    ) -> Result<Self> {
        let mut group = Self::with_options(client, conversation, opts);
        let store = group.require_store()?;
        if let Some(snapshot) = store.load(group.conversation.topic())? {
            if snapshot.topic == group.conversation.topic() {
                group.state = snapshot.state;
                group.synced_through_ns = snapshot.synced_through_ns;
            } else {
                tracing::warn!(
                    topic = %group.conversation.topic(),
                    snapshot_topic = %snapshot.topic,
                    "ignoring snapshot stored for another topic"
                );
            }
        }
        group.sync()?;
        Ok(group)
    }

    /// Replay the log into the current state.
    ///
    /// Without `since` the whole log is scanned. With `since`, Genesis plus the
    /// events at or after that instant are folded on top of what is already here.
    /// A failed fetch leaves the state untouched.
    pub fn rebuild(&mut self, options: RebuildOptions) -> Result<()> {
        let messages = self.conversation.raw_messages()?;
        let events = event_log::order_events(&messages, options.since);
        self.fold(&events);

        // A window starting past the watermark leaves a gap behind it.
        let contiguous = match options.since {
            None => true,
            Some(since) => self.synced_through_ns.is_some_and(|at| since <= at),
        };
        if contiguous {
            self.synced_through_ns = self
                .synced_through_ns
                .max(event_log::latest_sent_at(&messages));
        }

        tracing::debug!(
            topic = %self.conversation.topic(),
            since = ?options.since,
            synced_through_ns = ?self.synced_through_ns,
            events = events.len(),
            members = self.state.members().len(),
            "rebuilt group"
        );
        Ok(())
    }

    /// Incremental rebuild from the newest timestamp already fetched.
    ///
    /// Falls back to a full rebuild when nothing has been fetched yet.
    pub fn sync(&mut self) -> Result<()> {
        let since = self.synced_through_ns;
        self.rebuild(RebuildOptions { since })
    }

    pub fn add_member(&mut self, address: &str) -> Result<()> {
        let member = parse_address(address)?;
        self.append(ControlAction::MemberAdded { member })
    }

    pub fn change_title(&mut self, title: &str) -> Result<()> {
        self.append(ControlAction::TitleChanged {
            title: title.to_string(),
        })
    }

    /// Receive local change notifications after each fold.
    pub fn subscribe(&mut self) -> Receiver<GroupChange> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn save_snapshot(&self) -> Result<()> {
        self.require_store()?.save(&GroupSnapshot {
            topic: self.conversation.topic().to_string(),
            state: self.state.clone(),
            synced_through_ns: self.synced_through_ns,
        })
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn topic(&self) -> &str {
        self.conversation.topic()
    }

    pub fn state(&self) -> &GroupState {
        &self.state
    }

    pub fn synced_through_ns(&self) -> Option<u64> {
        self.synced_through_ns
    }

    pub fn members(&self) -> &[PublicKey] {
        self.state.members()
    }

    pub fn title(&self) -> &str {
        self.state.title()
    }

    pub fn metadata(&self) -> Option<&GroupMetadata> {
        self.state.metadata()
    }

    pub fn created_at(&self) -> Option<SystemTime> {
        self.state.created_at()
    }

    pub fn created_at_ns(&self) -> Option<u64> {
        self.state.created_at_ns()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn added_by_inbox_id(&self) -> Option<&PublicKey> {
        self.state.added_by()
    }

    fn append(&mut self, action: ControlAction) -> Result<()> {
        let receipt = self.conversation.send_control(&action)?;
        let event = ControlEvent {
            message_id: receipt.id,
            sender: self.conversation.address(),
            sent_at_ns: receipt.sent_at_ns,
            action,
        };
        self.fold(std::slice::from_ref(&event));
        Ok(())
    }

    fn fold(&mut self, events: &[ControlEvent]) {
        let before = std::mem::take(&mut self.state);
        self.state = merge(before.clone(), events);
        self.notify(&before);
    }

    fn notify(&mut self, before: &GroupState) {
        if self.subscribers.is_empty() {
            return;
        }

        let mut changes = Vec::new();
        if !before.is_active() && self.state.is_active() {
            changes.push(GroupChange::Activated);
        }
        for member in self.state.members() {
            if !before.is_member(member) {
                changes.push(GroupChange::MemberAdded(*member));
            }
        }
        if before.title() != self.state.title() {
            changes.push(GroupChange::TitleChanged(self.state.title().to_string()));
        }

        self.subscribers
            .retain(|tx| changes.iter().all(|change| tx.send(change.clone()).is_ok()));
    }

    fn require_store(&self) -> Result<Arc<dyn SnapshotStore>> {
        self.snapshot_store
            .clone()
            .ok_or_else(|| Error::Storage("No snapshot store configured".to_string()))
    }
}
