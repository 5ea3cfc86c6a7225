use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::media::{AudioTransform, DeviceLease, MediaKind};

/// A locally captured media track.
///
/// Cheap to clone; clones share the same underlying track. `stop()` ends the
/// track and drops its device lease. Only the first call has an effect, but
/// every call is counted so owners can verify they stop exactly once.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

struct TrackInner {
    id: String,
    kind: MediaKind,
    label: String,
    device_id: Option<String>,
    enabled: AtomicBool,
    ended: AtomicBool,
    stop_calls: AtomicUsize,
    gain: Mutex<f32>,
    transform: Mutex<Option<Box<dyn AudioTransform>>>,
    lease: Mutex<Option<DeviceLease>>,
}

impl MediaTrack {
    pub fn new(kind: MediaKind, label: impl Into<String>, device_id: Option<String>) -> Self {
        let id = rand::random::<u64>();
        Self {
            inner: Arc::new(TrackInner {
                id: format!("{}-{id:016x}", kind.as_str()),
                kind,
                label: label.into(),
                device_id,
                enabled: AtomicBool::new(true),
                ended: AtomicBool::new(false),
                stop_calls: AtomicUsize::new(0),
                gain: Mutex::new(1.0),
                transform: Mutex::new(None),
                lease: Mutex::new(None),
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

    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        self.inner.device_id.as_deref()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Disabled tracks stay attached to their sender and emit silence or black.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.inner.ended.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.inner.stop_calls.fetch_add(1, Ordering::AcqRel);
        if self.inner.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        let lease = self.inner.lease.lock().take();
        drop(lease);
    }

    /// Number of times `stop()` has been called on this track.
    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.inner.stop_calls.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn gain(&self) -> f32 {
        *self.inner.gain.lock()
    }

    /// Sets the capture gain, clamped to `0.0..=1.0`.
    pub fn set_gain(&self, gain: f32) {
        *self.inner.gain.lock() = gain.clamp(0.0, 1.0);
    }

    pub fn set_transform(&self, transform: Box<dyn AudioTransform>) {
        *self.inner.transform.lock() = Some(transform);
    }

    #[must_use]
    pub fn has_transform(&self) -> bool {
        self.inner.transform.lock().is_some()
    }

    pub fn attach_lease(&self, lease: DeviceLease) {
        if self.is_live() {
            *self.inner.lease.lock() = Some(lease);
        }
    }

    /// Runs captured audio through the transform and gain.
    ///
    /// Disabled or ended tracks produce silence.
    pub fn process(&self, samples: &mut [f32]) {
        if !self.is_enabled() || !self.is_live() {
            samples.fill(0.0);
            return;
        }
        if let Some(transform) = self.inner.transform.lock().as_ref() {
            transform.process(samples);
        }
        let gain = self.gain();
        if (gain - 1.0).abs() > f32::EPSILON {
            for s in samples.iter_mut() {
                *s *= gain;
            }
        }
    }

    #[must_use]
    pub fn same_track(&self, other: &MediaTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("device_id", &self.inner.device_id)
            .field("enabled", &self.is_enabled())
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::media::NoiseGate;

    #[test]
    fn stop_is_idempotent_but_counted() {
        let t = MediaTrack::new(MediaKind::Audio, "mic", Some("mic-1".into()));
        assert!(t.is_live());
        t.stop();
        t.clone().stop();
        assert!(!t.is_live());
        assert_eq!(t.stop_count(), 2);
    }

    #[test]
    fn process_applies_gate_then_gain() {
        let t = MediaTrack::new(MediaKind::Audio, "mic", None);
        t.set_transform(Box::new(NoiseGate::default()));
        t.set_gain(0.5);
        let mut buf = [0.005, 0.8];
        t.process(&mut buf);
        assert!((buf[0] - 0.000_25).abs() < 1e-7);
        assert!((buf[1] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn muted_track_emits_silence() {
        let t = MediaTrack::new(MediaKind::Audio, "mic", None);
        t.set_enabled(false);
        let mut buf = [0.3, -0.3];
        t.process(&mut buf);
        assert_eq!(buf, [0.0, 0.0]);
    }

    #[test]
    fn gain_is_clamped() {
        let t = MediaTrack::new(MediaKind::Audio, "mic", None);
        t.set_gain(4.0);
        assert_eq!(t.gain(), 1.0);
        t.set_gain(-1.0);
        assert_eq!(t.gain(), 0.0);
    }
}
