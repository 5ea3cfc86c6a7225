//! In-process audio transforms applied between raw capture and the link.

/// Processes captured samples in place. Runs on the capture thread.
pub trait AudioTransform: Send + Sync {
    fn process(&self, samples: &mut [f32]);
}

pub const DEFAULT_GATE_THRESHOLD: f32 = 0.01;
pub const DEFAULT_GATE_ATTENUATION: f32 = 0.1;

/// Attenuates low-level samples to suppress background hiss.
///
/// Any sample whose magnitude is below `threshold` is multiplied by
/// `attenuation`; louder samples pass untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseGate {
    pub threshold: f32,
    pub attenuation: f32,
}

impl Default for NoiseGate {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_GATE_THRESHOLD,
            attenuation: DEFAULT_GATE_ATTENUATION,
        }
    }
}

impl NoiseGate {
    #[must_use]
    pub fn new(threshold: f32, attenuation: f32) -> Self {
        Self {
            threshold: threshold.abs(),
            attenuation: attenuation.clamp(0.0, 1.0),
        }
    }
}

impl AudioTransform for NoiseGate {
    fn process(&self, samples: &mut [f32]) {
        for s in samples.iter_mut() {
            if s.abs() < self.threshold {
                *s *= self.attenuation;
            }
        }
    }
}
