use std::collections::HashMap;

use crate::signaling::PeerId;

/// Resolves peer ids to display names. Lookup failures never affect a call.
pub trait PeerDirectory: Send + Sync {
    fn display_name(&self, peer: &PeerId) -> Option<String>;
}

/// Display name for `peer`, or `User #<id>` when the directory has none.
pub fn display_label(directory: &dyn PeerDirectory, peer: &PeerId) -> String {
    directory
        .display_name(peer)
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| format!("User #{peer}"))
}

#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    names: HashMap<PeerId, String>,
}

impl StaticDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, peer: impl Into<PeerId>, name: impl Into<String>) -> Self {
        self.names.insert(peer.into(), name.into());
        self
    }
}

impl PeerDirectory for StaticDirectory {
    fn display_name(&self, peer: &PeerId) -> Option<String> {
        self.names.get(peer).cloned()
    }
}
