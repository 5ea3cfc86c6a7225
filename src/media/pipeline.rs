use std::sync::Arc;

use crate::aggregator::CompositeStream;
use crate::log::LogSink;
use crate::media::{
    AudioConstraints, CaptureConstraints, DeviceError, DevicePool, DeviceSelection,
    DisplayConstraints, GainTarget, MediaDevices, MediaKind, MediaTrack, NoiseGate,
    SharedDeviceSelection, VideoConstraints,
};
use crate::{sink_debug, sink_info, sink_warn};

/// Capture processing options, read from the `[Media]` config section.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSettings {
    pub noise_suppression: bool,
    pub noise_gate: NoiseGate,
    pub video_width: u32,
    pub video_height: u32,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            noise_suppression: true,
            noise_gate: NoiseGate::default(),
            video_width: 1280,
            video_height: 720,
        }
    }
}

/// Tracks captured for a call.
#[derive(Debug, Clone)]
pub struct LocalMedia {
    pub microphone: MediaTrack,
    pub camera: Option<MediaTrack>,
}

impl LocalMedia {
    pub fn tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        std::iter::once(&self.microphone).chain(self.camera.as_ref())
    }
}

#[derive(Debug, Clone)]
pub struct ScreenMedia {
    pub video: MediaTrack,
    pub audio: Option<MediaTrack>,
}

/// Acquires and prepares local tracks.
///
/// Every audio track handed out has passed through the noise gate (when
/// enabled and installable), carries the selected input gain, and holds a
/// lease on its capture device.
pub struct MediaPipeline {
    devices: Arc<dyn MediaDevices>,
    pool: DevicePool,
    selection: SharedDeviceSelection,
    settings: MediaSettings,
    logger: Arc<dyn LogSink>,
}

impl MediaPipeline {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        selection: SharedDeviceSelection,
        settings: MediaSettings,
        logger: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            pool: DevicePool::new(&devices),
            devices,
            selection,
            settings,
            logger,
        }
    }

    #[must_use]
    pub fn devices(&self) -> &Arc<dyn MediaDevices> {
        &self.devices
    }

    #[must_use]
    pub fn selection(&self) -> &SharedDeviceSelection {
        &self.selection
    }

    #[must_use]
    pub fn pool(&self) -> &DevicePool {
        &self.pool
    }

    #[must_use]
    pub fn capture_constraints(&self, kind: MediaKind, sel: &DeviceSelection) -> CaptureConstraints {
        CaptureConstraints {
            audio: Some(AudioConstraints::for_device(sel.input_device.clone())),
            video: kind.includes_video().then(|| self.video_constraints(sel.camera_device.clone())),
        }
    }

    fn video_constraints(&self, device_id: Option<String>) -> VideoConstraints {
        VideoConstraints {
            ideal_width: self.settings.video_width,
            ideal_height: self.settings.video_height,
            device_id,
        }
    }

    /// Captures microphone, plus camera for video calls, using the current selection.
    ///
    /// # Errors
    /// Backend [`DeviceError`]s, or `NotFound` when a requested kind is missing
    /// from the result. Nothing stays captured on error.
    pub async fn acquire(&self, kind: MediaKind) -> Result<LocalMedia, DeviceError> {
        let constraints = self.capture_constraints(kind, &self.selection.snapshot());
        let tracks = self.devices.acquire(&constraints).await?;

        let mut microphone = None;
        let mut camera = None;
        for track in tracks {
            match track.kind() {
                MediaKind::Audio if microphone.is_none() => microphone = Some(track),
                MediaKind::Video if kind.includes_video() && camera.is_none() => {
                    camera = Some(track);
                }
                _ => track.stop(),
            }
        }

        let Some(microphone) = microphone else {
            if let Some(cam) = camera {
                cam.stop();
            }
            return Err(DeviceError::NotFound("audio input".into()));
        };
        if kind.includes_video() && camera.is_none() {
            microphone.stop();
            return Err(DeviceError::NotFound("video input".into()));
        }

        self.prepare(&microphone);
        if let Some(cam) = &camera {
            self.prepare(cam);
        }
        sink_info!(
            self.logger,
            "[media] acquired {} (mic={:?}, camera={:?})",
            kind,
            microphone.device_id(),
            camera.as_ref().and_then(MediaTrack::device_id)
        );
        Ok(LocalMedia { microphone, camera })
    }

    /// Captures a fresh track of `kind` pinned to `device_id`, for an in-place switch.
    ///
    /// # Errors
    /// Backend [`DeviceError`]s, or `NotFound` when the backend returns no
    /// track of that kind.
    pub async fn acquire_replacement(
        &self,
        kind: MediaKind,
        device_id: &str,
    ) -> Result<MediaTrack, DeviceError> {
        let constraints = match kind {
            MediaKind::Audio => CaptureConstraints {
                audio: Some(AudioConstraints::for_device(Some(device_id.to_owned()))),
                video: None,
            },
            MediaKind::Video => CaptureConstraints {
                audio: None,
                video: Some(self.video_constraints(Some(device_id.to_owned()))),
            },
        };
        let mut found = None;
        for track in self.devices.acquire(&constraints).await? {
            if track.kind() == kind && found.is_none() {
                found = Some(track);
            } else {
                track.stop();
            }
        }
        let track = found.ok_or_else(|| DeviceError::NotFound(device_id.to_owned()))?;
        self.prepare(&track);
        Ok(track)
    }

    /// Captures the screen, with system audio when available.
    ///
    /// # Errors
    /// Backend [`DeviceError`]s, or `NotFound` when no video track comes back.
    pub async fn acquire_screen(&self) -> Result<ScreenMedia, DeviceError> {
        let tracks = self
            .devices
            .acquire_display(&DisplayConstraints { audio: true })
            .await?;
        let mut video = None;
        let mut audio = None;
        for track in tracks {
            match track.kind() {
                MediaKind::Video if video.is_none() => video = Some(track),
                MediaKind::Audio if audio.is_none() => audio = Some(track),
                _ => track.stop(),
            }
        }
        let Some(video) = video else {
            if let Some(a) = audio {
                a.stop();
            }
            return Err(DeviceError::NotFound("display".into()));
        };
        // Screen audio is mixed system output: no gate, no capture gain.
        if let Some(a) = &audio {
            self.attach_lease(a);
        }
        self.attach_lease(&video);
        Ok(ScreenMedia { video, audio })
    }

    pub fn set_mute(&self, microphone: &MediaTrack, muted: bool) {
        microphone.set_enabled(!muted);
        sink_debug!(self.logger, "[media] microphone muted={}", muted);
    }

    pub fn set_camera_enabled(&self, camera: &MediaTrack, enabled: bool) {
        camera.set_enabled(enabled);
        sink_debug!(self.logger, "[media] camera enabled={}", enabled);
    }

    /// Records a new gain in the shared selection; returns the clamped value.
    pub fn set_gain(&self, target: GainTarget, level: f32) -> f32 {
        self.selection.set_gain(target, level)
    }

    /// Applies the selected input gain to a microphone track.
    pub fn apply_input_gain(&self, microphone: &MediaTrack) {
        microphone.set_gain(self.selection.snapshot().input_gain);
    }

    /// Plays `stream` on the selected output device at the selected volume.
    ///
    /// # Errors
    /// Whatever the backend reports for the output device.
    pub fn attach_output(&self, stream: &CompositeStream) -> Result<(), DeviceError> {
        let sel = self.selection.snapshot();
        self.devices
            .attach_output(stream, sel.output_device.as_deref(), sel.output_gain)
    }

    fn attach_lease(&self, track: &MediaTrack) {
        if let Some(id) = track.device_id() {
            track.attach_lease(self.pool.lease(id));
        }
    }

    fn prepare(&self, track: &MediaTrack) {
        self.attach_lease(track);
        if track.kind() != MediaKind::Audio {
            return;
        }
        if self.settings.noise_suppression {
            // A failed install keeps the raw track flowing.
            if let Err(e) = self
                .devices
                .install_transform(track, Box::new(self.settings.noise_gate))
            {
                sink_warn!(
                    self.logger,
                    "[media] noise filter unavailable, sending raw audio: {}",
                    e
                );
            }
        }
        self.apply_input_gain(track);
    }
}
