//! Newline-delimited JSON signaling over TCP.
//!
//! A client opens a connection, sends one hello line `{"user_id": "..."}`,
//! then writes outbound wire frames. The relay answers with inbound frames for
//! that user.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{Mutex, mpsc};

use crate::log::LogSink;
use crate::signaling::{
    CallRelay, CodecError, InboundMsg, OutboundMsg, PeerId, SignalingTransport, TransportError,
    decode_inbound, decode_outbound, encode_inbound, encode_outbound,
};
use crate::{sink_debug, sink_info, sink_warn};

#[derive(Debug, Serialize, Deserialize)]
struct Hello {
    user_id: PeerId,
}

fn io_err(e: std::io::Error) -> TransportError {
    TransportError::Io(e.to_string())
}

/// Accepts connections forever, one task per client.
///
/// # Errors
/// Only when accepting fails; per-connection failures are logged.
pub async fn serve(
    listener: TcpListener,
    relay: Arc<CallRelay>,
    logger: Arc<dyn LogSink>,
) -> Result<(), TransportError> {
    loop {
        let (stream, peer_addr) = listener.accept().await.map_err(io_err)?;
        sink_debug!(logger, "[relay] connection from {}", peer_addr);
        let relay = Arc::clone(&relay);
        let logger = Arc::clone(&logger);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, relay, Arc::clone(&logger)).await {
                sink_warn!(logger, "[relay] connection from {} closed: {}", peer_addr, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    relay: Arc<CallRelay>,
    logger: Arc<dyn LogSink>,
) -> Result<(), TransportError> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    let Some(first) = lines.next_line().await.map_err(io_err)? else {
        return Ok(());
    };
    let hello: Hello = serde_json::from_str(&first).map_err(CodecError::from)?;
    let user = hello.user_id;
    let (conn, mut inbox) = relay.connect(user.clone());

    let writer_logger = Arc::clone(&logger);
    let writer = tokio::spawn(async move {
        while let Some(msg) = inbox.recv().await {
            let line = match encode_inbound(&msg) {
                Ok(line) => line,
                Err(e) => {
                    sink_warn!(writer_logger, "[relay] cannot encode {}: {}", msg.signal.kind(), e);
                    continue;
                }
            };
            if write.write_all(format!("{line}\n").as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let result = route_frames(&mut lines, &relay, &user, &logger).await;
    relay.disconnect(&user, conn);
    writer.abort();
    result
}

async fn route_frames(
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    relay: &CallRelay,
    user: &PeerId,
    logger: &Arc<dyn LogSink>,
) -> Result<(), TransportError> {
    while let Some(line) = lines.next_line().await.map_err(io_err)? {
        if line.trim().is_empty() {
            continue;
        }
        match decode_outbound(&line) {
            Ok(msg) => {
                relay.route(user, msg);
            }
            Err(e) => sink_warn!(logger, "[relay] bad frame from {}: {}", user, e),
        }
    }
    Ok(())
}

/// Client side of the TCP relay: a [`SignalingTransport`] plus the stream of
/// inbound messages for this user.
pub struct TcpSignalingClient {
    writer: Mutex<OwnedWriteHalf>,
}

impl TcpSignalingClient {
    /// Connects, introduces itself as `user` and starts reading inbound frames.
    /// Undecodable frames are logged and skipped.
    ///
    /// # Errors
    /// `Io` when the connection or the hello fails.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        user: PeerId,
        logger: Arc<dyn LogSink>,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<InboundMsg>), TransportError> {
        let stream = TcpStream::connect(addr).await.map_err(io_err)?;
        let (read, mut write) = stream.into_split();
        let hello = serde_json::to_string(&Hello {
            user_id: user.clone(),
        })
        .map_err(CodecError::from)?;
        write
            .write_all(format!("{hello}\n").as_bytes())
            .await
            .map_err(io_err)?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match decode_inbound(&line) {
                    Ok(msg) => {
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(e) => sink_warn!(logger, "[signaling] bad frame for {}: {}", user, e),
                }
            }
            sink_info!(logger, "[signaling] relay connection for {} closed", user);
        });

        let client = Arc::new(Self {
            writer: Mutex::new(write),
        });
        Ok((client, rx))
    }
}

#[async_trait]
impl SignalingTransport for TcpSignalingClient {
    async fn send(&self, msg: OutboundMsg) -> Result<(), TransportError> {
        let line = encode_outbound(&msg)?;
        self.writer
            .lock()
            .await
            .write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(|_| TransportError::Disconnected)
    }
}
