use crate::aggregator::RemoteTrack;
use crate::media::MediaKind;

/// Immutable snapshot of every live remote track. Replaced, never mutated.
#[derive(Debug, Clone, Default)]
pub struct CompositeStream {
    generation: u64,
    tracks: Vec<RemoteTrack>,
}

impl CompositeStream {
    pub(crate) fn new(generation: u64, tracks: Vec<RemoteTrack>) -> Self {
        Self { generation, tracks }
    }

    /// Increases with every rebuild of the owning aggregator.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn tracks(&self) -> &[RemoteTrack] {
        &self.tracks
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn tracks_of(&self, kind: MediaKind) -> impl Iterator<Item = &RemoteTrack> {
        self.tracks.iter().filter(move |t| t.kind() == kind)
    }

    #[must_use]
    pub fn contains(&self, track_id: &str) -> bool {
        self.tracks.iter().any(|t| t.id() == track_id)
    }
}
