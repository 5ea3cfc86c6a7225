//! Local media: capture, device selection and the audio processing chain.

pub mod constraints;
#[cfg(feature = "cpal-capture")]
pub mod cpal_capture;
pub mod device_error;
pub mod device_pool;
pub mod device_selection;
pub mod devices;
pub mod media_kind;
pub mod noise_filter;
pub mod pipeline;
pub mod track;

#[cfg(feature = "cpal-capture")]
pub use cpal_capture::{CapturedAudio, CpalMediaDevices, PlaybackRoute};
pub use constraints::{AudioConstraints, CaptureConstraints, DisplayConstraints, VideoConstraints};
pub use device_error::{DeviceError, SwitchError};
pub use device_pool::{DeviceLease, DevicePool};
pub use device_selection::{DeviceRole, DeviceSelection, GainTarget, SharedDeviceSelection};
pub use devices::{DeviceInfo, DeviceKind, MediaDevices};
pub use media_kind::MediaKind;
pub use noise_filter::{AudioTransform, NoiseGate};
pub use pipeline::{LocalMedia, MediaPipeline, MediaSettings, ScreenMedia};
pub use track::MediaTrack;
