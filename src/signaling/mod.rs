//! Call signaling: the message contract, its JSON wire form, the outbound
//! transport seam and the relay that routes messages between users.

pub mod call_signal;
pub mod codec;
pub mod envelope;
pub mod relay;
pub mod signaling_error;
pub mod tcp;
pub mod transport;

pub use call_signal::{CallSignal, SignalKind};
pub use codec::{decode_inbound, decode_outbound, encode_inbound, encode_outbound};
pub use envelope::{InboundMsg, OutboundMsg, PeerId};
pub use relay::{CallRelay, ConnectionId, RelayTransport};
pub use signaling_error::{CodecError, TransportError};
pub use tcp::{TcpSignalingClient, serve};
pub use transport::SignalingTransport;
