use async_trait::async_trait;

use crate::aggregator::CompositeStream;
use crate::media::{
    AudioTransform, CaptureConstraints, DeviceError, DisplayConstraints, MediaTrack,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    AudioInput,
    VideoInput,
    AudioOutput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: String,
    pub kind: DeviceKind,
    pub label: String,
}

impl DeviceInfo {
    pub fn new(device_id: impl Into<String>, kind: DeviceKind, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            kind,
            label: label.into(),
        }
    }
}

/// Platform media backend: capture, enumeration and playback routing.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Captures the requested kinds. Returned tracks carry their device id.
    async fn acquire(&self, constraints: &CaptureConstraints)
    -> Result<Vec<MediaTrack>, DeviceError>;

    /// Captures the screen; a second audio track is returned when requested
    /// and available.
    async fn acquire_display(
        &self,
        constraints: &DisplayConstraints,
    ) -> Result<Vec<MediaTrack>, DeviceError>;

    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError>;

    /// Inserts an audio transform between capture and the track's consumers.
    fn install_transform(
        &self,
        track: &MediaTrack,
        transform: Box<dyn AudioTransform>,
    ) -> Result<(), DeviceError> {
        track.set_transform(transform);
        Ok(())
    }

    /// Called when no track holds the device any more.
    fn release_device(&self, device_id: &str);

    /// Routes the remote composite to an output device at `volume`.
    fn attach_output(
        &self,
        stream: &CompositeStream,
        device_id: Option<&str>,
        volume: f32,
    ) -> Result<(), DeviceError>;
}
