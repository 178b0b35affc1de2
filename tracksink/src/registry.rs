//! Track registry
//!
//! [`TrackRegistry`] is owned by the subscription controller, which is its
//! only writer. Everyone else reads through a [`RegistryView`].

use crate::track::TrackDescriptor;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{trace, warn};

type TrackMap = Arc<RwLock<BTreeMap<String, TrackDescriptor>>>;

/// Authoritative map from track id to descriptor
#[derive(Debug, Default)]
pub struct TrackRegistry {
    tracks: TrackMap,
}

impl TrackRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a descriptor
    ///
    /// Returns whether the registry changed.
    pub fn upsert(&self, descriptor: TrackDescriptor) -> bool {
        if !descriptor.is_consistent() {
            warn!(
                track_id = %descriptor.track_id,
                "Inconsistent track state: {} while {}",
                descriptor.playback,
                descriptor.subscription
            );
        }

        let mut tracks = self.tracks.write();
        match tracks.get(&descriptor.track_id) {
            Some(existing) if *existing == descriptor => false,
            _ => {
                trace!(track_id = %descriptor.track_id, "Track descriptor updated");
                tracks.insert(descriptor.track_id.clone(), descriptor);
                true
            }
        }
    }

    /// Remove a track; returns whether it existed
    pub fn remove(&self, track_id: &str) -> bool {
        self.tracks.write().remove(track_id).is_some()
    }

    /// Descriptor for `track_id`
    pub fn get(&self, track_id: &str) -> Option<TrackDescriptor> {
        self.tracks.read().get(track_id).cloned()
    }

    /// Snapshot of every track, ordered by track id
    pub fn list(&self) -> Vec<TrackDescriptor> {
        self.tracks.read().values().cloned().collect()
    }

    /// Number of tracks
    pub fn len(&self) -> usize {
        self.tracks.read().len()
    }

    /// Whether no track is known
    pub fn is_empty(&self) -> bool {
        self.tracks.read().is_empty()
    }

    /// Read-only handle sharing this registry
    pub fn view(&self) -> RegistryView {
        RegistryView {
            tracks: self.tracks.clone(),
        }
    }
}

/// Read-only access to the registry
#[derive(Debug, Clone)]
pub struct RegistryView {
    tracks: TrackMap,
}

impl RegistryView {
    /// Descriptor for `track_id`
    pub fn get(&self, track_id: &str) -> Option<TrackDescriptor> {
        self.tracks.read().get(track_id).cloned()
    }

    /// Snapshot of every track, ordered by track id
    pub fn list(&self) -> Vec<TrackDescriptor> {
        self.tracks.read().values().cloned().collect()
    }

    /// Tracks published by `participant_id`
    pub fn by_participant(&self, participant_id: &str) -> Vec<TrackDescriptor> {
        self.tracks
            .read()
            .values()
            .filter(|t| t.participant_id == participant_id)
            .cloned()
            .collect()
    }

    /// Number of tracks
    pub fn len(&self) -> usize {
        self.tracks.read().len()
    }

    /// Whether no track is known
    pub fn is_empty(&self) -> bool {
        self.tracks.read().is_empty()
    }
}
