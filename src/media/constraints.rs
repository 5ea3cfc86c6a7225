/// Microphone capture constraints. Processing flags default to on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Exact device id when the user pinned one.
    pub device_id: Option<String>,
}

impl AudioConstraints {
    #[must_use]
    pub fn for_device(device_id: Option<String>) -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            device_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub device_id: Option<String>,
}

/// What to capture from local devices. `None` means do not capture that kind.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaptureConstraints {
    pub audio: Option<AudioConstraints>,
    pub video: Option<VideoConstraints>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayConstraints {
    /// Also capture system audio when the platform allows it.
    pub audio: bool,
}
