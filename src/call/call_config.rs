use std::time::Duration;

use crate::config::{Config, ConfigError};
use crate::log::LogSink;
use crate::media::{MediaSettings, NoiseGate};
use crate::peer::PeerLinkConfig;
use crate::sink_warn;

pub const DEFAULT_STUN_SERVERS: [&str; 2] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
];
pub const DEFAULT_RING_TIMEOUT: Duration = Duration::from_secs(45);
pub const DEFAULT_EARLY_CANDIDATE_LIMIT: usize = 64;
pub const DEFAULT_EARLY_CANDIDATE_PEERS: usize = 32;

/// Runtime settings of the call core.
#[derive(Debug, Clone, PartialEq)]
pub struct CallConfig {
    /// How long an outgoing call may stay in `Dialing`.
    pub ring_timeout: Duration,
    /// Candidates kept per peer that arrive before its `call_request`.
    pub early_candidate_limit: usize,
    /// Peers that may hold early candidates at the same time.
    pub early_candidate_peers: usize,
    pub link: PeerLinkConfig,
    pub media: MediaSettings,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ring_timeout: DEFAULT_RING_TIMEOUT,
            early_candidate_limit: DEFAULT_EARLY_CANDIDATE_LIMIT,
            early_candidate_peers: DEFAULT_EARLY_CANDIDATE_PEERS,
            link: PeerLinkConfig::with_stun_servers(DEFAULT_STUN_SERVERS),
            media: MediaSettings::default(),
        }
    }
}

impl CallConfig {
    /// Reads `[Call]`, `[Ice]` and `[Media]`. Invalid values are logged and
    /// replaced by their defaults.
    pub fn from_config(config: &Config, logger: &dyn LogSink) -> Self {
        let mut out = Self::default();

        let read = |res: Result<(), ConfigError>| {
            if let Err(e) = res {
                sink_warn!(logger, "[config] {}, using default", e);
            }
        };

        read(config.get_parsed::<u64>("Call", "ring_timeout_ms").map(|v| {
            if let Some(ms) = v.filter(|ms| *ms > 0) {
                out.ring_timeout = Duration::from_millis(ms);
            }
        }));
        read(config.get_parsed::<usize>("Call", "early_candidate_limit").map(|v| {
            if let Some(limit) = v {
                out.early_candidate_limit = limit;
            }
        }));
        read(config.get_parsed::<usize>("Call", "early_candidate_peers").map(|v| {
            if let Some(peers) = v {
                out.early_candidate_peers = peers;
            }
        }));
        if let Some(servers) = config.get_list("Ice", "stun_servers") {
            if !servers.is_empty() {
                out.link = PeerLinkConfig::with_stun_servers(servers);
            }
        }
        read(config.get_bool("Media", "noise_suppression").map(|v| {
            if let Some(on) = v {
                out.media.noise_suppression = on;
            }
        }));
        let mut threshold = out.media.noise_gate.threshold;
        let mut attenuation = out.media.noise_gate.attenuation;
        read(config.get_parsed::<f32>("Media", "noise_gate_threshold").map(|v| {
            if let Some(t) = v {
                threshold = t;
            }
        }));
        read(config.get_parsed::<f32>("Media", "noise_gate_attenuation").map(|v| {
            if let Some(a) = v {
                attenuation = a;
            }
        }));
        out.media.noise_gate = NoiseGate::new(threshold, attenuation);
        read(config.get_parsed::<u32>("Media", "video_width").map(|v| {
            if let Some(w) = v.filter(|w| *w > 0) {
                out.media.video_width = w;
            }
        }));
        read(config.get_parsed::<u32>("Media", "video_height").map(|v| {
            if let Some(h) = v.filter(|h| *h > 0) {
                out.media.video_height = h;
            }
        }));

        out
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::{LogLevel, MemoryLogSink};

    #[test]
    fn defaults_without_config() {
        let cfg = CallConfig::from_config(&Config::empty(), &MemoryLogSink::new());
        assert_eq!(cfg, CallConfig::default());
        assert_eq!(cfg.link.ice_servers.len(), 2);
        assert_eq!(cfg.link.ice_servers[0].urls, vec![DEFAULT_STUN_SERVERS[0]]);
    }

    #[test]
    fn file_values_override_defaults() {
        let text = "[Call]\nring_timeout_ms = 5000\nearly_candidate_limit = 8\n\
                    early_candidate_peers = 4\n\
                    [Ice]\nstun_servers = stun:turn.example.org:3478\n\
                    [Media]\nnoise_suppression = no\nnoise_gate_threshold = 0.02\nvideo_width = 640\nvideo_height = 360\n";
        let cfg = CallConfig::from_config(&Config::parse(text), &MemoryLogSink::new());
        assert_eq!(cfg.ring_timeout, Duration::from_millis(5000));
        assert_eq!(cfg.early_candidate_limit, 8);
        assert_eq!(cfg.early_candidate_peers, 4);
        assert_eq!(cfg.link.ice_servers.len(), 1);
        assert!(!cfg.media.noise_suppression);
        assert!((cfg.media.noise_gate.threshold - 0.02).abs() < f32::EPSILON);
        assert_eq!((cfg.media.video_width, cfg.media.video_height), (640, 360));
    }

    #[test]
    fn bad_values_fall_back_with_warning() {
        let log = MemoryLogSink::new();
        let cfg = CallConfig::from_config(
            &Config::parse("[Call]\nring_timeout_ms = later\n"),
            &log,
        );
        assert_eq!(cfg.ring_timeout, DEFAULT_RING_TIMEOUT);
        assert!(log.contains(LogLevel::Warn, "ring_timeout_ms"));
    }
}
