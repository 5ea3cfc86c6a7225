use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::media::MediaKind;

/// A track received from the peer. Clones share state.
#[derive(Clone)]
pub struct RemoteTrack {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    kind: MediaKind,
    ended: AtomicBool,
    stop_calls: AtomicUsize,
}

impl RemoteTrack {
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: id.into(),
                kind,
                ended: AtomicBool::new(false),
                stop_calls: AtomicUsize::new(0),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    /// The remote side stopped sending.
    pub fn end(&self) {
        self.inner.ended.store(true, Ordering::Release);
    }

    /// Stops local rendering of this track.
    pub fn stop(&self) {
        self.inner.stop_calls.fetch_add(1, Ordering::AcqRel);
        self.inner.ended.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.inner.ended.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.inner.stop_calls.load(Ordering::Acquire)
    }
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("live", &self.is_live())
            .finish()
    }
}
