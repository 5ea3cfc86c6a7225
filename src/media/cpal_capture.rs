//! Microphone capture and device listing through `cpal`.
//!
//! Each captured microphone runs on its own thread, which owns the `cpal`
//! stream (streams are not `Send` on every platform). Buffers pass through
//! [`MediaTrack::process`] so mute, gain and the noise gate apply before
//! samples leave the capture callback. Cameras and screens are not captured
//! by this backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::aggregator::CompositeStream;
use crate::log::LogSink;
use crate::media::{
    CaptureConstraints, DeviceError, DeviceInfo, DeviceKind, DisplayConstraints, MediaDevices,
    MediaKind, MediaTrack,
};
use crate::{sink_debug, sink_error, sink_info, sink_warn};

const POLL: Duration = Duration::from_millis(100);

fn unavailable(e: impl std::fmt::Display) -> DeviceError {
    DeviceError::Unavailable(e.to_string())
}

/// Lists the host's audio inputs and outputs. Device names double as ids.
///
/// # Errors
/// `Unavailable` when the host cannot enumerate devices.
pub fn list_audio_devices() -> Result<Vec<DeviceInfo>, DeviceError> {
    let host = cpal::default_host();
    let mut out = Vec::new();
    for device in host.input_devices().map_err(unavailable)? {
        if let Ok(name) = device.name() {
            out.push(DeviceInfo::new(name.clone(), DeviceKind::AudioInput, name));
        }
    }
    for device in host.output_devices().map_err(unavailable)? {
        if let Ok(name) = device.name() {
            out.push(DeviceInfo::new(name.clone(), DeviceKind::AudioOutput, name));
        }
    }
    Ok(out)
}

/// One processed buffer from a live microphone track.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedAudio {
    pub track_id: String,
    pub samples: Vec<f32>,
}

/// Where remote audio was last routed.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRoute {
    pub device_id: Option<String>,
    pub volume: f32,
    pub track_count: usize,
}

struct Capture {
    device_id: String,
    running: Arc<AtomicBool>,
}

/// [`MediaDevices`] backed by the host's audio devices.
pub struct CpalMediaDevices {
    frames: Sender<CapturedAudio>,
    captures: Mutex<Vec<Capture>>,
    playback: Mutex<Option<PlaybackRoute>>,
    logger: Arc<dyn LogSink>,
}

impl CpalMediaDevices {
    /// Returns the backend and the stream of processed microphone buffers.
    pub fn new(logger: Arc<dyn LogSink>) -> (Self, Receiver<CapturedAudio>) {
        let (frames, rx) = mpsc::channel();
        let devices = Self {
            frames,
            captures: Mutex::new(Vec::new()),
            playback: Mutex::new(None),
            logger,
        };
        (devices, rx)
    }

    #[must_use]
    pub fn playback_route(&self) -> Option<PlaybackRoute> {
        self.playback.lock().clone()
    }

    /// Starts a capture thread; the returned flag stops it.
    fn spawn_capture(
        &self,
        device_id: Option<String>,
    ) -> (Arc<AtomicBool>, oneshot::Receiver<Result<MediaTrack, DeviceError>>) {
        let (ready_tx, ready_rx) = oneshot::channel();
        let running = Arc::new(AtomicBool::new(true));
        let frames = self.frames.clone();
        let logger = Arc::clone(&self.logger);
        let flag = Arc::clone(&running);
        let spawned = thread::Builder::new()
            .name("rustycall-mic-capture".into())
            .spawn(move || run_capture(device_id, frames, flag, ready_tx, logger));
        if let Err(e) = spawned {
            sink_error!(self.logger, "[cpal] cannot start capture thread: {}", e);
        }
        (running, ready_rx)
    }

    fn register(&self, track: &MediaTrack, running: Arc<AtomicBool>) {
        if let Some(id) = track.device_id() {
            self.captures.lock().push(Capture {
                device_id: id.to_owned(),
                running,
            });
        }
    }
}

fn stream_error_logger(logger: Arc<dyn LogSink>) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| sink_warn!(logger, "[cpal] input stream error: {}", err)
}

fn open_input(
    device_id: Option<&str>,
    frames: Sender<CapturedAudio>,
    logger: &Arc<dyn LogSink>,
) -> Result<(MediaTrack, cpal::Stream), DeviceError> {
    let host = cpal::default_host();
    let device = match device_id {
        Some(id) => host
            .input_devices()
            .map_err(unavailable)?
            .find(|d| d.name().is_ok_and(|n| n == id))
            .ok_or_else(|| DeviceError::NotFound(id.to_owned()))?,
        None => host
            .default_input_device()
            .ok_or_else(|| DeviceError::NotFound("default input".into()))?,
    };
    let name = device.name().map_err(unavailable)?;
    let config = device.default_input_config().map_err(unavailable)?.config();

    let track = MediaTrack::new(MediaKind::Audio, name.clone(), Some(name));
    let processed = track.clone();
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mut samples = data.to_vec();
                processed.process(&mut samples);
                let _ = frames.send(CapturedAudio {
                    track_id: processed.id().to_owned(),
                    samples,
                });
            },
            stream_error_logger(Arc::clone(logger)),
            None,
        )
        .map_err(unavailable)?;
    stream.play().map_err(unavailable)?;
    Ok((track, stream))
}

fn run_capture(
    device_id: Option<String>,
    frames: Sender<CapturedAudio>,
    running: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<MediaTrack, DeviceError>>,
    logger: Arc<dyn LogSink>,
) {
    let (track, stream) = match open_input(device_id.as_deref(), frames, &logger) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    sink_info!(logger, "[cpal] capturing from {}", track.label());
    if ready.send(Ok(track.clone())).is_err() {
        return;
    }

    while running.load(Ordering::SeqCst) && track.is_live() {
        thread::sleep(POLL);
    }
    drop(stream);
    sink_debug!(logger, "[cpal] capture from {} stopped", track.label());
}

#[async_trait]
impl MediaDevices for CpalMediaDevices {
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Vec<MediaTrack>, DeviceError> {
        if constraints.video.is_some() {
            return Err(DeviceError::Unavailable("no camera capture on this backend".into()));
        }
        let Some(audio) = &constraints.audio else {
            return Ok(Vec::new());
        };
        let (running, ready) = self.spawn_capture(audio.device_id.clone());
        let track = ready
            .await
            .map_err(|_| DeviceError::Unavailable("capture thread exited".into()))??;
        self.register(&track, running);
        Ok(vec![track])
    }

    async fn acquire_display(
        &self,
        _constraints: &DisplayConstraints,
    ) -> Result<Vec<MediaTrack>, DeviceError> {
        Err(DeviceError::Unavailable("no screen capture on this backend".into()))
    }

    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        tokio::task::spawn_blocking(list_audio_devices)
            .await
            .map_err(unavailable)?
    }

    fn release_device(&self, device_id: &str) {
        let mut captures = self.captures.lock();
        captures.retain(|c| {
            if c.device_id == device_id {
                c.running.store(false, Ordering::SeqCst);
                false
            } else {
                true
            }
        });
        sink_debug!(self.logger, "[cpal] released {}", device_id);
    }

    fn attach_output(
        &self,
        stream: &CompositeStream,
        device_id: Option<&str>,
        volume: f32,
    ) -> Result<(), DeviceError> {
        if let Some(id) = device_id {
            let known = cpal::default_host()
                .output_devices()
                .map_err(unavailable)?
                .any(|d| d.name().is_ok_and(|n| n == id));
            if !known {
                return Err(DeviceError::NotFound(id.to_owned()));
            }
        }
        *self.playback.lock() = Some(PlaybackRoute {
            device_id: device_id.map(str::to_owned),
            volume,
            track_count: stream.tracks_of(MediaKind::Audio).count(),
        });
        Ok(())
    }
}
