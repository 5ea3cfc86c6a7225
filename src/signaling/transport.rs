use async_trait::async_trait;

use crate::signaling::{OutboundMsg, TransportError};

/// Outbound half of the signaling channel. Delivery is at most once and may
/// be reordered; inbound messages are fed to `CallManager::handle_inbound`.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    async fn send(&self, msg: OutboundMsg) -> Result<(), TransportError>;
}
