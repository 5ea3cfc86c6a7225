use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::signaling::{OutboundMsg, SignalKind, SignalingTransport, TransportError};

/// Records every outbound message, optionally passing it on to another transport.
#[derive(Default)]
pub struct SimTransport {
    sent: Mutex<Vec<OutboundMsg>>,
    failing: Mutex<bool>,
    next: Option<Arc<dyn SignalingTransport>>,
}

impl SimTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records, then forwards to `next`.
    #[must_use]
    pub fn forwarding(next: Arc<dyn SignalingTransport>) -> Self {
        Self {
            next: Some(next),
            ..Self::default()
        }
    }

    /// While set, every send fails with `Disconnected` and nothing is recorded.
    pub fn fail_sends(&self, fail: bool) {
        *self.failing.lock() = fail;
    }

    #[must_use]
    pub fn sent(&self) -> Vec<OutboundMsg> {
        self.sent.lock().clone()
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<SignalKind> {
        self.sent.lock().iter().map(|m| m.signal.kind()).collect()
    }

    #[must_use]
    pub fn count(&self, kind: SignalKind) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.signal.kind() == kind)
            .count()
    }
}

#[async_trait]
impl SignalingTransport for SimTransport {
    async fn send(&self, msg: OutboundMsg) -> Result<(), TransportError> {
        if *self.failing.lock() {
            return Err(TransportError::Disconnected);
        }
        self.sent.lock().push(msg.clone());
        match &self.next {
            Some(next) => next.send(msg).await,
            None => Ok(()),
        }
    }
}
