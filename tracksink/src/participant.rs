//! Remote participants known to the session

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Remote participant representation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipant {
    id: String,
    connected_at: DateTime<Utc>,
}

impl RemoteParticipant {
    /// Get participant ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When the participant was first seen
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }
}

/// Collection of participants in a room
#[derive(Debug, Default)]
pub struct Participants {
    remote: BTreeMap<String, RemoteParticipant>,
}

impl Participants {
    /// Empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connected participant; returns whether it was new
    pub fn connect(&mut self, participant_id: &str) -> bool {
        if self.remote.contains_key(participant_id) {
            return false;
        }
        self.remote.insert(
            participant_id.to_string(),
            RemoteParticipant {
                id: participant_id.to_string(),
                connected_at: Utc::now(),
            },
        );
        true
    }

    /// Forget a participant; returns whether it was known
    pub fn disconnect(&mut self, participant_id: &str) -> Option<RemoteParticipant> {
        self.remote.remove(participant_id)
    }

    /// Whether the participant is connected
    pub fn contains(&self, participant_id: &str) -> bool {
        self.remote.contains_key(participant_id)
    }

    /// Connected participant by id
    pub fn get(&self, participant_id: &str) -> Option<&RemoteParticipant> {
        self.remote.get(participant_id)
    }

    /// Connected participants ordered by id
    pub fn iter(&self) -> impl Iterator<Item = &RemoteParticipant> {
        self.remote.values()
    }

    /// Number of connected participants
    pub fn len(&self) -> usize {
        self.remote.len()
    }

    /// Whether nobody is connected
    pub fn is_empty(&self) -> bool {
        self.remote.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_disconnect() {
        let mut participants = Participants::new();
        assert!(participants.connect("alice"));
        assert!(!participants.connect("alice"));
        assert!(participants.contains("alice"));
        assert_eq!(participants.len(), 1);

        let gone = participants.disconnect("alice").unwrap();
        assert_eq!(gone.id(), "alice");
        assert!(participants.disconnect("alice").is_none());
        assert!(participants.is_empty());
    }
}
