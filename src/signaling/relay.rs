use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::log::LogSink;
use crate::signaling::{InboundMsg, OutboundMsg, PeerId, SignalingTransport, TransportError};
use crate::{sink_debug, sink_info, sink_warn};

/// One registration made by [`CallRelay::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

struct Inbox {
    conn: ConnectionId,
    tx: mpsc::UnboundedSender<InboundMsg>,
}

/// Server-side router for call signals.
///
/// Each connected user registers an inbox. A message from `a` addressed to
/// `b` is delivered to `b`'s inbox as coming from `a`. Messages for users
/// that are not connected are dropped.
pub struct CallRelay {
    inboxes: Mutex<HashMap<PeerId, Inbox>>,
    next_conn: AtomicU64,
    logger: Arc<dyn LogSink>,
}

impl CallRelay {
    pub fn new(logger: Arc<dyn LogSink>) -> Self {
        Self {
            inboxes: Mutex::new(HashMap::new()),
            next_conn: AtomicU64::new(1),
            logger,
        }
    }

    /// Registers `user` and returns the registration and its inbox. A second
    /// connection for the same user replaces the first.
    pub fn connect(&self, user: PeerId) -> (ConnectionId, mpsc::UnboundedReceiver<InboundMsg>) {
        let conn = ConnectionId(self.next_conn.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        if self
            .inboxes
            .lock()
            .insert(user.clone(), Inbox { conn, tx })
            .is_some()
        {
            sink_warn!(self.logger, "[relay] {} reconnected, old inbox dropped", user);
        } else {
            sink_info!(self.logger, "[relay] {} connected", user);
        }
        (conn, rx)
    }

    /// Unregisters `user` if `conn` is still its current registration.
    /// Returns false when a newer connection has taken over.
    pub fn disconnect(&self, user: &PeerId, conn: ConnectionId) -> bool {
        let mut inboxes = self.inboxes.lock();
        if !inboxes.get(user).is_some_and(|inbox| inbox.conn == conn) {
            sink_debug!(self.logger, "[relay] stale disconnect for {} ignored", user);
            return false;
        }
        inboxes.remove(user);
        sink_info!(self.logger, "[relay] {} disconnected", user);
        true
    }

    #[must_use]
    pub fn is_online(&self, user: &PeerId) -> bool {
        self.inboxes.lock().contains_key(user)
    }

    /// Forwards `msg` from `from`. Returns false when the recipient is offline.
    pub fn route(&self, from: &PeerId, msg: OutboundMsg) -> bool {
        let to = msg.to.clone();
        let kind = msg.signal.kind();
        let mut inboxes = self.inboxes.lock();
        let Some(inbox) = inboxes.get(&to) else {
            sink_debug!(self.logger, "[relay] {} from {} dropped: {} offline", kind, from, to);
            return false;
        };
        if inbox.tx.send(msg.deliver_from(from.clone())).is_err() {
            inboxes.remove(&to);
            sink_debug!(self.logger, "[relay] {} from {} dropped: {} gone", kind, from, to);
            return false;
        }
        sink_debug!(self.logger, "[relay] {} {} -> {}", kind, from, to);
        true
    }

    /// An in-process transport that sends as `user` through this relay.
    #[must_use]
    pub fn transport_for(self: &Arc<Self>, user: PeerId) -> RelayTransport {
        RelayTransport {
            relay: Arc::clone(self),
            user,
        }
    }
}

/// [`SignalingTransport`] bound to one user of an in-process [`CallRelay`].
pub struct RelayTransport {
    relay: Arc<CallRelay>,
    user: PeerId,
}

#[async_trait]
impl SignalingTransport for RelayTransport {
    async fn send(&self, msg: OutboundMsg) -> Result<(), TransportError> {
        if !self.relay.is_online(&self.user) {
            return Err(TransportError::Disconnected);
        }
        // Offline recipients are the relay's concern, not a send failure.
        self.relay.route(&self.user, msg);
        Ok(())
    }
}
