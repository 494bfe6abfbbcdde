//! Ordered log of the messages received on the active channel.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::channel::Channel;

/// One received payload. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub channel: Channel,
    pub payload: String,
    /// Position within the channel session, starting at 0.
    pub sequence: u64,
    pub received_at: DateTime<Utc>,
}

impl Message {
    pub fn new(channel: Channel, payload: String, sequence: u64) -> Self {
        Self {
            channel,
            payload,
            sequence,
            received_at: Utc::now(),
        }
    }
}

/// Append-only log for exactly one channel session.
///
/// The store only accepts messages for its active channel. That filter is
/// what keeps payloads from a superseded connection out of the log after a
/// channel switch.
#[derive(Debug, Default)]
pub struct MessageStore {
    active: Option<Channel>,
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_channel(&self) -> Option<&Channel> {
        self.active.as_ref()
    }

    /// Start a new channel session: drop the previous log and restart the
    /// sequence at 0.
    pub fn reset(&mut self, channel: Channel) {
        if !self.messages.is_empty() {
            tracing::debug!(
                discarded = self.messages.len(),
                from = ?self.active,
                to = %channel,
                "resetting message store"
            );
        }
        self.messages.clear();
        self.active = Some(channel);
    }

    /// Sequence index the next appended message should carry.
    pub fn next_sequence(&self) -> u64 {
        self.messages.len() as u64
    }

    /// Append in arrival order. Returns false, logging the reason, when the
    /// message belongs to another channel or is out of sequence.
    pub fn append(&mut self, message: Message) -> bool {
        if self.active.as_ref() != Some(&message.channel) {
            tracing::warn!(
                channel = %message.channel,
                active = ?self.active,
                "discarding message for inactive channel"
            );
            return false;
        }
        if message.sequence != self.next_sequence() {
            tracing::warn!(
                channel = %message.channel,
                sequence = message.sequence,
                expected = self.next_sequence(),
                "discarding out-of-sequence message"
            );
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Read-only view of the log, oldest first.
    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(channel: &str, payload: &str, sequence: u64) -> Message {
        Message::new(Channel::new(channel), payload.to_string(), sequence)
    }

    #[test]
    fn appends_in_arrival_order() {
        let mut store = MessageStore::new();
        store.reset(Channel::new("general"));
        for (i, text) in ["a", "b", "c"].iter().enumerate() {
            assert!(store.append(msg("general", text, i as u64)));
        }
        let payloads: Vec<&str> = store.snapshot().iter().map(|m| m.payload.as_str()).collect();
        assert_eq!(payloads, ["a", "b", "c"]);
        assert_eq!(store.next_sequence(), 3);
    }

    #[test]
    fn rejects_other_channels() {
        let mut store = MessageStore::new();
        store.reset(Channel::new("random"));
        assert!(!store.append(msg("general", "late", 0)));
        assert!(store.is_empty());
    }

    #[test]
    fn rejects_everything_before_first_reset() {
        let mut store = MessageStore::new();
        assert!(!store.append(msg("general", "hi", 0)));
        assert!(store.active_channel().is_none());
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut store = MessageStore::new();
        store.reset(Channel::new("general"));
        store.append(msg("general", "one", 0));
        store.append(msg("general", "two", 1));

        store.reset(Channel::new("news"));
        assert!(store.is_empty());
        assert_eq!(store.next_sequence(), 0);
        assert!(store.append(msg("news", "fresh", 0)));
        assert_eq!(store.snapshot()[0].sequence, 0);
    }

    #[test]
    fn rejects_sequence_gaps_and_duplicates() {
        let mut store = MessageStore::new();
        store.reset(Channel::new("general"));
        assert!(store.append(msg("general", "a", 0)));
        assert!(!store.append(msg("general", "dup", 0)));
        assert!(!store.append(msg("general", "gap", 5)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn snapshot_does_not_consume() {
        let mut store = MessageStore::new();
        store.reset(Channel::new("general"));
        store.append(msg("general", "hi", 0));
        assert_eq!(store.snapshot().len(), 1);
        assert_eq!(store.snapshot().len(), 1);
    }
}
