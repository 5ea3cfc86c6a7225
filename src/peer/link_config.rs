/// A STUN server entry. TURN relays are not used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PeerLinkConfig {
    pub ice_servers: Vec<IceServer>,
}

impl PeerLinkConfig {
    pub fn with_stun_servers<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ice_servers: urls.into_iter().map(IceServer::stun).collect(),
        }
    }
}
