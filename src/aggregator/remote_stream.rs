use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::aggregator::RemoteTrack;

/// A remote stream object as announced by the link. Its membership can grow
/// after the first track arrives, so clones share the track list.
#[derive(Clone)]
pub struct RemoteStream {
    id: Arc<str>,
    tracks: Arc<Mutex<Vec<RemoteTrack>>>,
}

impl RemoteStream {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            tracks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Adds `track` unless a track with the same id is already present.
    pub fn add_track(&self, track: RemoteTrack) {
        let mut tracks = self.tracks.lock();
        if !tracks.iter().any(|t| t.id() == track.id()) {
            tracks.push(track);
        }
    }

    pub fn remove_track(&self, track_id: &str) -> Option<RemoteTrack> {
        let mut tracks = self.tracks.lock();
        let pos = tracks.iter().position(|t| t.id() == track_id)?;
        Some(tracks.remove(pos))
    }

    #[must_use]
    pub fn tracks(&self) -> Vec<RemoteTrack> {
        self.tracks.lock().clone()
    }

    #[must_use]
    pub fn same_stream(&self, other: &RemoteStream) -> bool {
        Arc::ptr_eq(&self.tracks, &other.tracks)
    }
}

impl fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks.lock().len())
            .finish()
    }
}
