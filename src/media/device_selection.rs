use std::sync::Arc;

use parking_lot::RwLock;

/// Which physical device a selection entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceRole {
    Microphone,
    Camera,
    Speaker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GainTarget {
    /// Capture gain applied to the microphone track.
    Input,
    /// Playback volume of the remote stream.
    Output,
}

/// User's device choices. Survives across calls.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSelection {
    pub input_device: Option<String>,
    pub camera_device: Option<String>,
    pub output_device: Option<String>,
    pub input_gain: f32,
    pub output_gain: f32,
}

impl Default for DeviceSelection {
    fn default() -> Self {
        Self {
            input_device: None,
            camera_device: None,
            output_device: None,
            input_gain: 1.0,
            output_gain: 1.0,
        }
    }
}

impl DeviceSelection {
    #[must_use]
    pub fn device(&self, role: DeviceRole) -> Option<&str> {
        match role {
            DeviceRole::Microphone => self.input_device.as_deref(),
            DeviceRole::Camera => self.camera_device.as_deref(),
            DeviceRole::Speaker => self.output_device.as_deref(),
        }
    }
}

/// Process-wide selection, read on every acquisition and written only on
/// explicit user action.
#[derive(Debug, Clone, Default)]
pub struct SharedDeviceSelection {
    inner: Arc<RwLock<DeviceSelection>>,
}

impl SharedDeviceSelection {
    #[must_use]
    pub fn new(initial: DeviceSelection) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> DeviceSelection {
        self.inner.read().clone()
    }

    pub fn set_device(&self, role: DeviceRole, device_id: impl Into<String>) {
        let device_id = Some(device_id.into());
        let mut sel = self.inner.write();
        match role {
            DeviceRole::Microphone => sel.input_device = device_id,
            DeviceRole::Camera => sel.camera_device = device_id,
            DeviceRole::Speaker => sel.output_device = device_id,
        }
    }

    /// Stores the gain clamped to `0.0..=1.0` and returns the stored value.
    pub fn set_gain(&self, target: GainTarget, level: f32) -> f32 {
        let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
        let mut sel = self.inner.write();
        match target {
            GainTarget::Input => sel.input_gain = level,
            GainTarget::Output => sel.output_gain = level,
        }
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gains_are_clamped() {
        let sel = SharedDeviceSelection::default();
        assert_eq!(sel.set_gain(GainTarget::Input, 1.7), 1.0);
        assert_eq!(sel.set_gain(GainTarget::Output, -0.2), 0.0);
        assert_eq!(sel.set_gain(GainTarget::Output, f32::NAN), 0.0);
        let snap = sel.snapshot();
        assert_eq!(snap.input_gain, 1.0);
        assert_eq!(snap.output_gain, 0.0);
    }

    #[test]
    fn clones_share_state() {
        let sel = SharedDeviceSelection::default();
        let other = sel.clone();
        other.set_device(DeviceRole::Camera, "cam-2");
        assert_eq!(sel.snapshot().device(DeviceRole::Camera), Some("cam-2"));
        assert_eq!(sel.snapshot().device(DeviceRole::Microphone), None);
    }
}
