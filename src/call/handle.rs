use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot, watch};

use crate::aggregator::CompositeStream;
use crate::call::session_input::{LocalCommand, Reply, SessionInput};
use crate::call::{CallError, CallState, Direction};
use crate::signaling::CallSignal;

/// Manager-side handle to a running session task.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    pub(crate) direction: Direction,
    inputs: mpsc::UnboundedSender<SessionInput>,
    state: watch::Receiver<CallState>,
    remote: watch::Receiver<Arc<CompositeStream>>,
    hangup: Arc<AtomicBool>,
}

impl SessionHandle {
    pub(crate) fn new(
        direction: Direction,
        inputs: mpsc::UnboundedSender<SessionInput>,
        state: watch::Receiver<CallState>,
        remote: watch::Receiver<Arc<CompositeStream>>,
        hangup: Arc<AtomicBool>,
    ) -> Self {
        Self {
            direction,
            inputs,
            state,
            remote,
            hangup,
        }
    }

    pub(crate) fn state(&self) -> CallState {
        *self.state.borrow()
    }

    pub(crate) fn is_live(&self) -> bool {
        self.state().is_live()
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<CallState> {
        self.state.clone()
    }

    pub(crate) fn remote_stream(&self) -> Arc<CompositeStream> {
        Arc::clone(&self.remote.borrow())
    }

    pub(crate) fn send(&self, input: SessionInput) -> Result<(), CallError> {
        self.inputs.send(input).map_err(|_| CallError::SessionGone)
    }

    pub(crate) fn signal(&self, signal: CallSignal) -> Result<(), CallError> {
        self.send(SessionInput::Signal(signal))
    }

    pub(crate) fn command(&self, cmd: LocalCommand) -> Result<(), CallError> {
        self.send(SessionInput::Command(cmd))
    }

    /// Sends a command and waits for the session's answer.
    pub(crate) async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> LocalCommand,
    ) -> Result<T, CallError> {
        let (tx, rx) = oneshot::channel();
        self.command(make(tx))?;
        rx.await.map_err(|_| CallError::SessionGone)?
    }

    /// Flags the session as hung up and queues the hangup. In-flight setup
    /// steps observe the flag after their next await. Returns false if a
    /// hangup was already requested.
    pub(crate) fn hangup(&self) -> bool {
        if self.hangup.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.command(LocalCommand::Hangup);
        true
    }
}
