//! Ordered, filtered view of the control events in a conversation log.

use std::collections::HashSet;

use crate::codec::{decode_message, ControlEvent};
use crate::{is_control_kind, Conversation, Result, TransportMessage};

/// Decode, de-duplicate, window and sort raw messages into replay order.
///
/// Replay order is ascending `sent_at_ns`, ties broken by lexicographic
/// message id, so every replica sees the same sequence whatever the delivery
/// order. With `since`, Genesis is kept regardless of its timestamp and every
/// other event must satisfy `sent_at_ns >= since`.
pub fn order_events(messages: &[TransportMessage], since: Option<u64>) -> Vec<ControlEvent> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut events: Vec<ControlEvent> = Vec::new();

    for message in messages {
        if !seen.insert(message.id.as_str()) {
            continue;
        }
        if !is_control_kind(message.kind) {
            tracing::trace!(message_id = %message.id, kind = message.kind, "not a control event");
            continue;
        }
        match decode_message(message) {
            Ok(Some(event)) => {
                if event.is_genesis() || since.map_or(true, |since| event.sent_at_ns >= since) {
                    events.push(event);
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed control message");
            }
        }
    }

    events.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    events
}

/// Newest timestamp in a fetched log, control or chat.
pub fn latest_sent_at(messages: &[TransportMessage]) -> Option<u64> {
    messages.iter().map(|m| m.sent_at_ns).max()
}

/// Fetch the conversation history and return its control events in replay order.
pub fn events(conversation: &Conversation, since: Option<u64>) -> Result<Vec<ControlEvent>> {
    let messages = conversation.raw_messages()?;
    Ok(order_events(&messages, since))
}
