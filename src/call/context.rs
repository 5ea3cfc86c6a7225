use std::sync::Arc;

use tokio::sync::mpsc;

use crate::call::{CallConfig, CallEvent, PeerDirectory};
use crate::log::LogSink;
use crate::media::{MediaDevices, MediaPipeline};
use crate::peer::PeerLinkFactory;
use crate::signaling::SignalingTransport;

/// External collaborators of the call core.
#[derive(Clone)]
pub struct CallServices {
    pub transport: Arc<dyn SignalingTransport>,
    pub links: Arc<dyn PeerLinkFactory>,
    pub devices: Arc<dyn MediaDevices>,
    pub directory: Arc<dyn PeerDirectory>,
    pub logger: Arc<dyn LogSink>,
}

/// What every session of one manager shares.
pub(crate) struct CallContext {
    pub(crate) transport: Arc<dyn SignalingTransport>,
    pub(crate) links: Arc<dyn PeerLinkFactory>,
    pub(crate) pipeline: Arc<MediaPipeline>,
    pub(crate) directory: Arc<dyn PeerDirectory>,
    pub(crate) config: CallConfig,
    pub(crate) events: mpsc::UnboundedSender<CallEvent>,
    pub(crate) logger: Arc<dyn LogSink>,
}

impl CallContext {
    pub(crate) fn emit(&self, event: CallEvent) {
        let _ = self.events.send(event);
    }
}
