use tokio::sync::oneshot;

use crate::call::{CallError, CallState};
use crate::media::MediaKind;
use crate::signaling::CallSignal;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, CallError>>;

/// Requests from the local user, answered through their reply channel.
pub(crate) enum LocalCommand {
    Start { reply: Reply<()> },
    Accept { reply: Reply<()> },
    Reject { reply: Reply<()> },
    Hangup,
    /// Replies with the new muted flag.
    ToggleMute { reply: Reply<bool> },
    /// Replies with the new camera enabled flag.
    ToggleCamera { reply: Reply<bool> },
    /// Replies with whether the screen is now being shared.
    ToggleScreenShare { reply: Reply<bool> },
    SwitchDevice {
        kind: MediaKind,
        device_id: String,
        reply: Reply<()>,
    },
    ApplyInputGain,
    ReattachOutput,
}

impl LocalCommand {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            LocalCommand::Start { .. } => "start",
            LocalCommand::Accept { .. } => "accept",
            LocalCommand::Reject { .. } => "reject",
            LocalCommand::Hangup => "hangup",
            LocalCommand::ToggleMute { .. } => "toggle mute",
            LocalCommand::ToggleCamera { .. } => "toggle camera",
            LocalCommand::ToggleScreenShare { .. } => "toggle screen share",
            LocalCommand::SwitchDevice { .. } => "switch device",
            LocalCommand::ApplyInputGain => "apply input gain",
            LocalCommand::ReattachOutput => "reattach output",
        }
    }

    /// Answers the command with `InvalidState` without running it.
    pub(crate) fn refuse(self, state: CallState) {
        let err = CallError::InvalidState {
            op: self.name(),
            state,
        };
        match self {
            LocalCommand::Start { reply }
            | LocalCommand::Accept { reply }
            | LocalCommand::Reject { reply }
            | LocalCommand::SwitchDevice { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            LocalCommand::ToggleMute { reply }
            | LocalCommand::ToggleCamera { reply }
            | LocalCommand::ToggleScreenShare { reply } => {
                let _ = reply.send(Err(err));
            }
            LocalCommand::Hangup | LocalCommand::ApplyInputGain | LocalCommand::ReattachOutput => {}
        }
    }
}

/// Everything a session consumes through its input channel.
pub(crate) enum SessionInput {
    Command(LocalCommand),
    Signal(CallSignal),
}
