use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::aggregator::CompositeStream;
use crate::media::{
    AudioTransform, CaptureConstraints, DeviceError, DeviceInfo, DeviceKind, DisplayConstraints,
    MediaDevices, MediaKind, MediaTrack,
};

/// One `attach_output` call as seen by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRoute {
    pub generation: u64,
    pub track_count: usize,
    pub device_id: Option<String>,
    pub volume: f32,
}

#[derive(Default)]
struct DeviceState {
    deny: bool,
    fail_transforms: bool,
    fail_display: bool,
    no_screen_audio: bool,
    last_constraints: Option<CaptureConstraints>,
    acquired: Vec<MediaTrack>,
    released: Vec<String>,
    outputs: Vec<OutputRoute>,
}

/// In-memory device backend with a fixed catalog.
///
/// Acquisitions can be held open with [`hold_acquisitions`](Self::hold_acquisitions)
/// to exercise hangups that race device permission prompts.
pub struct SimMediaDevices {
    catalog: Vec<DeviceInfo>,
    state: Mutex<DeviceState>,
    gate: watch::Sender<bool>,
    waiting: AtomicUsize,
}

impl SimMediaDevices {
    #[must_use]
    pub fn new(catalog: Vec<DeviceInfo>) -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            catalog,
            state: Mutex::new(DeviceState::default()),
            gate,
            waiting: AtomicUsize::new(0),
        }
    }

    /// Two microphones, two cameras and two speakers.
    #[must_use]
    pub fn with_default_catalog() -> Self {
        Self::new(vec![
            DeviceInfo::new("mic-1", DeviceKind::AudioInput, "Built-in Microphone"),
            DeviceInfo::new("mic-2", DeviceKind::AudioInput, "USB Headset"),
            DeviceInfo::new("cam-1", DeviceKind::VideoInput, "Built-in Camera"),
            DeviceInfo::new("cam-2", DeviceKind::VideoInput, "USB Camera"),
            DeviceInfo::new("spk-1", DeviceKind::AudioOutput, "Built-in Speakers"),
            DeviceInfo::new("spk-2", DeviceKind::AudioOutput, "USB Headset"),
        ])
    }

    pub fn deny_permission(&self, deny: bool) {
        self.state.lock().deny = deny;
    }

    pub fn fail_transforms(&self, fail: bool) {
        self.state.lock().fail_transforms = fail;
    }

    pub fn fail_display(&self, fail: bool) {
        self.state.lock().fail_display = fail;
    }

    /// Display capture returns video only.
    pub fn without_screen_audio(&self) {
        self.state.lock().no_screen_audio = true;
    }

    /// Makes every capture wait until [`release_acquisitions`](Self::release_acquisitions).
    pub fn hold_acquisitions(&self) {
        self.gate.send_replace(true);
    }

    pub fn release_acquisitions(&self) {
        self.gate.send_replace(false);
    }

    /// Captures currently parked by [`hold_acquisitions`](Self::hold_acquisitions).
    #[must_use]
    pub fn pending_acquisitions(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn last_constraints(&self) -> Option<CaptureConstraints> {
        self.state.lock().last_constraints.clone()
    }

    /// Every track this backend ever handed out, screen tracks included.
    #[must_use]
    pub fn acquired_tracks(&self) -> Vec<MediaTrack> {
        self.state.lock().acquired.clone()
    }

    #[must_use]
    pub fn live_tracks(&self) -> usize {
        self.state
            .lock()
            .acquired
            .iter()
            .filter(|t| t.is_live())
            .count()
    }

    #[must_use]
    pub fn released_devices(&self) -> Vec<String> {
        self.state.lock().released.clone()
    }

    #[must_use]
    pub fn outputs(&self) -> Vec<OutputRoute> {
        self.state.lock().outputs.clone()
    }

    async fn pass_gate(&self) {
        let mut gate = self.gate.subscribe();
        if !*gate.borrow() {
            return;
        }
        self.waiting.fetch_add(1, Ordering::AcqRel);
        let _ = gate.wait_for(|held| !held).await;
        self.waiting.fetch_sub(1, Ordering::AcqRel);
    }

    fn find(&self, kind: DeviceKind, wanted: Option<&str>) -> Result<&DeviceInfo, DeviceError> {
        let mut matching = self.catalog.iter().filter(|d| d.kind == kind);
        match wanted {
            Some(id) => matching
                .find(|d| d.device_id == id)
                .ok_or_else(|| DeviceError::NotFound(id.to_owned())),
            None => matching
                .next()
                .ok_or_else(|| DeviceError::NotFound(format!("{kind:?}"))),
        }
    }
}

#[async_trait]
impl MediaDevices for SimMediaDevices {
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Vec<MediaTrack>, DeviceError> {
        self.pass_gate().await;
        let mut st = self.state.lock();
        st.last_constraints = Some(constraints.clone());
        if st.deny {
            return Err(DeviceError::PermissionDenied("camera and microphone".into()));
        }

        let mut picked = Vec::new();
        if let Some(audio) = &constraints.audio {
            let info = self.find(DeviceKind::AudioInput, audio.device_id.as_deref())?;
            picked.push((MediaKind::Audio, info));
        }
        if let Some(video) = &constraints.video {
            let info = self.find(DeviceKind::VideoInput, video.device_id.as_deref())?;
            picked.push((MediaKind::Video, info));
        }
        let tracks: Vec<MediaTrack> = picked
            .into_iter()
            .map(|(kind, info)| MediaTrack::new(kind, &info.label, Some(info.device_id.clone())))
            .collect();
        st.acquired.extend(tracks.iter().cloned());
        Ok(tracks)
    }

    async fn acquire_display(
        &self,
        constraints: &DisplayConstraints,
    ) -> Result<Vec<MediaTrack>, DeviceError> {
        self.pass_gate().await;
        let mut st = self.state.lock();
        if st.deny || st.fail_display {
            return Err(DeviceError::PermissionDenied("screen".into()));
        }
        let mut tracks = vec![MediaTrack::new(MediaKind::Video, "Screen", None)];
        if constraints.audio && !st.no_screen_audio {
            tracks.push(MediaTrack::new(MediaKind::Audio, "System Audio", None));
        }
        st.acquired.extend(tracks.iter().cloned());
        Ok(tracks)
    }

    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        Ok(self.catalog.clone())
    }

    fn install_transform(
        &self,
        track: &MediaTrack,
        transform: Box<dyn AudioTransform>,
    ) -> Result<(), DeviceError> {
        if self.state.lock().fail_transforms {
            return Err(DeviceError::Unavailable("audio processing".into()));
        }
        track.set_transform(transform);
        Ok(())
    }

    fn release_device(&self, device_id: &str) {
        self.state.lock().released.push(device_id.to_owned());
    }

    fn attach_output(
        &self,
        stream: &CompositeStream,
        device_id: Option<&str>,
        volume: f32,
    ) -> Result<(), DeviceError> {
        if let Some(id) = device_id {
            self.find(DeviceKind::AudioOutput, Some(id))?;
        }
        self.state.lock().outputs.push(OutputRoute {
            generation: stream.generation(),
            track_count: stream.len(),
            device_id: device_id.map(str::to_owned),
            volume,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use std::sync::Arc;

    use super::*;
    use crate::media::AudioConstraints;

    #[tokio::test]
    async fn unknown_device_is_not_found() {
        let sim = SimMediaDevices::with_default_catalog();
        let constraints = CaptureConstraints {
            audio: Some(AudioConstraints::for_device(Some("mic-9".into()))),
            video: None,
        };
        let err = sim.acquire(&constraints).await.unwrap_err();
        assert_eq!(err, DeviceError::NotFound("mic-9".into()));
    }

    #[tokio::test]
    async fn held_acquisition_waits_for_release() {
        let sim = Arc::new(SimMediaDevices::with_default_catalog());
        sim.hold_acquisitions();
        let task = {
            let sim = Arc::clone(&sim);
            tokio::spawn(async move {
                let c = CaptureConstraints {
                    audio: Some(AudioConstraints::for_device(None)),
                    video: None,
                };
                sim.acquire(&c).await
            })
        };
        while sim.pending_acquisitions() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(sim.acquired_tracks().is_empty());
        sim.release_acquisitions();
        let tracks = task.await.unwrap().unwrap();
        assert_eq!(tracks[0].device_id(), Some("mic-1"));
    }
}
