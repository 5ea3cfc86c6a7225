use std::fmt;

use serde::{Deserialize, Serialize};

use crate::signaling::CallSignal;

/// User id of a remote endpoint, as known to the signaling server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A signal on its way to `to`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMsg {
    pub to: PeerId,
    pub signal: CallSignal,
}

/// A signal delivered from `from`.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMsg {
    pub from: PeerId,
    pub signal: CallSignal,
}

impl OutboundMsg {
    pub fn new(to: impl Into<PeerId>, signal: CallSignal) -> Self {
        Self {
            to: to.into(),
            signal,
        }
    }

    /// The message as the recipient sees it.
    #[must_use]
    pub fn deliver_from(self, from: PeerId) -> InboundMsg {
        InboundMsg {
            from,
            signal: self.signal,
        }
    }
}

impl InboundMsg {
    pub fn new(from: impl Into<PeerId>, signal: CallSignal) -> Self {
        Self {
            from: from.into(),
            signal,
        }
    }
}
