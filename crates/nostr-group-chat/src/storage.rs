use crate::{Error, GroupState, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Persisted group view, keyed by conversation topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSnapshot {
    pub topic: String,
    pub state: GroupState,
    /// Newest log timestamp the view had fetched when the snapshot was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_through_ns: Option<u64>,
}

pub trait SnapshotStore: Send + Sync {
    fn load(&self, topic: &str) -> Result<Option<GroupSnapshot>>;
    fn save(&self, snapshot: &GroupSnapshot) -> Result<()>;
    fn delete(&self, topic: &str) -> Result<()>;
}

/// Snapshots kept as JSON strings in process memory.
#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    store: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(topic: &str) -> String {
        format!("group-snapshot/{topic}")
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn load(&self, topic: &str) -> Result<Option<GroupSnapshot>> {
        let raw = self
            .store
            .lock()
            .map_err(|_| Error::Storage("Snapshot store lock poisoned".to_string()))?
            .get(&Self::key(topic))
            .cloned();
        match raw {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| Error::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &GroupSnapshot) -> Result<()> {
        let raw = serde_json::to_string(snapshot)?;
        self.store
            .lock()
            .map_err(|_| Error::Storage("Snapshot store lock poisoned".to_string()))?
            .insert(Self::key(&snapshot.topic), raw);
        Ok(())
    }

    fn delete(&self, topic: &str) -> Result<()> {
        self.store
            .lock()
            .map_err(|_| Error::Storage("Snapshot store lock poisoned".to_string()))?
            .remove(&Self::key(topic));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ControlAction, ControlEvent};
    use nostr::Keys;

    fn snapshot(topic: &str) -> GroupSnapshot {
        let a = Keys::generate().public_key();
        let state = crate::merge(
            GroupState::new(),
            &[ControlEvent {
                message_id: "g".to_string(),
                sender: a,
                sent_at_ns: 5,
                action: ControlAction::Genesis { members: vec![a] },
            }],
        );
        GroupSnapshot {
            topic: topic.to_string(),
            state,
            synced_through_ns: Some(5),
        }
    }

    #[test]
    fn save_then_load() {
        let store = InMemorySnapshotStore::new();
        let snap = snapshot("t");
        store.save(&snap).unwrap();
        assert_eq!(store.load("t").unwrap(), Some(snap));
        assert_eq!(store.load("other").unwrap(), None);
    }

    #[test]
    fn save_overwrites_and_delete_removes() {
        let store = InMemorySnapshotStore::new();
        store.save(&snapshot("t")).unwrap();
        let newer = snapshot("t");
        store.save(&newer).unwrap();
        assert_eq!(store.load("t").unwrap(), Some(newer));

        store.delete("t").unwrap();
        assert_eq!(store.load("t").unwrap(), None);
    }

    #[test]
    fn corrupt_snapshot_is_a_serialization_error() {
        let store = InMemorySnapshotStore::new();
        store
            .store
            .lock()
            .unwrap()
            .insert(InMemorySnapshotStore::key("t"), "{".to_string());
        assert!(matches!(store.load("t"), Err(Error::Serialization(_))));
    }
}
