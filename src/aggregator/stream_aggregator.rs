use std::collections::HashSet;
use std::sync::Arc;

use crate::aggregator::{CompositeStream, RemoteStream, RemoteTrack};

/// Keeps one reference per remote stream id and rebuilds the composite on
/// every change.
///
/// The composite holds exactly the live tracks across all retained streams,
/// deduplicated by track id, in arrival order. Tracks that drop out of the
/// composite are stopped.
#[derive(Debug, Default)]
pub struct RemoteStreamAggregator {
    origins: Vec<RemoteStream>,
    current: Arc<CompositeStream>,
    generation: u64,
}

impl RemoteStreamAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> Arc<CompositeStream> {
        Arc::clone(&self.current)
    }

    #[must_use]
    pub fn origin_count(&self) -> usize {
        self.origins.len()
    }

    pub fn on_track(&mut self, track: RemoteTrack, stream: RemoteStream) -> Arc<CompositeStream> {
        match self.origins.iter().find(|s| s.id() == stream.id()) {
            Some(retained) => retained.add_track(track),
            None => {
                stream.add_track(track);
                self.origins.push(stream);
            }
        }
        self.rebuild()
    }

    /// Marks the track ended wherever it is retained, then rebuilds.
    pub fn on_track_ended(&mut self, track_id: &str) -> Arc<CompositeStream> {
        for stream in &self.origins {
            for t in stream.tracks() {
                if t.id() == track_id {
                    t.end();
                }
            }
        }
        self.rebuild()
    }

    pub fn rebuild(&mut self) -> Arc<CompositeStream> {
        let mut seen = HashSet::new();
        let mut live = Vec::new();
        for stream in &self.origins {
            for t in stream.tracks() {
                if t.is_live() && seen.insert(t.id().to_owned()) {
                    live.push(t);
                }
            }
        }

        for old in self.current.tracks() {
            if !seen.contains(old.id()) {
                old.stop();
            }
        }

        self.generation += 1;
        self.current = Arc::new(CompositeStream::new(self.generation, live));
        self.current()
    }

    /// Stops every track in the composite and forgets all streams.
    pub fn clear(&mut self) -> Arc<CompositeStream> {
        for t in self.current.tracks() {
            t.stop();
        }
        self.origins.clear();
        self.generation += 1;
        self.current = Arc::new(CompositeStream::new(self.generation, Vec::new()));
        self.current()
    }
}
