use crate::media::MediaKind;

/// Where a local track came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackRole {
    Microphone,
    Camera,
    ScreenVideo,
    ScreenAudio,
}

impl TrackRole {
    #[must_use]
    pub fn kind(self) -> MediaKind {
        match self {
            TrackRole::Microphone | TrackRole::ScreenAudio => MediaKind::Audio,
            TrackRole::Camera | TrackRole::ScreenVideo => MediaKind::Video,
        }
    }

    /// Role that takes the sender back when this one is removed.
    #[must_use]
    pub fn fallback(self) -> Option<TrackRole> {
        match self {
            TrackRole::ScreenVideo => Some(TrackRole::Camera),
            TrackRole::ScreenAudio => Some(TrackRole::Microphone),
            TrackRole::Microphone | TrackRole::Camera => None,
        }
    }
}
