//! Upload state machine.
//!
//! ```text
//! Unregistered -> Registered -> Uploading -> Finalizing -> Done
//!                                                 \-> Polling -> Done
//! ```
//!
//! `Failed` is reachable from every non-terminal state. Every other pair
//! of state and event is rejected.

use std::fmt;

use crate::error::{InvalidTransition, UploadPhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Unregistered,
    Registered,
    Uploading,
    Finalizing,
    Polling,
    Done,
    Failed(UploadPhase),
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Done | UploadState::Failed(_))
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadState::Unregistered => f.write_str("unregistered"),
            UploadState::Registered => f.write_str("registered"),
            UploadState::Uploading => f.write_str("uploading"),
            UploadState::Finalizing => f.write_str("finalizing"),
            UploadState::Polling => f.write_str("polling"),
            UploadState::Done => f.write_str("done"),
            UploadState::Failed(phase) => write!(f, "failed ({phase})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadEvent {
    Registered,
    UploadStarted,
    /// The join barrier was reached with `pending` chunks still unacknowledged.
    ChunksAcknowledged { pending: usize },
    Finalized { wait: bool },
    ProcessingComplete,
    Failed(UploadPhase),
}

impl fmt::Display for UploadEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadEvent::Registered => f.write_str("registered"),
            UploadEvent::UploadStarted => f.write_str("upload started"),
            UploadEvent::ChunksAcknowledged { pending } => {
                write!(f, "chunks acknowledged ({pending} pending)")
            }
            UploadEvent::Finalized { wait } => write!(f, "finalized (wait={wait})"),
            UploadEvent::ProcessingComplete => f.write_str("processing complete"),
            UploadEvent::Failed(phase) => write!(f, "{phase} failure"),
        }
    }
}

pub fn transition(
    state: UploadState,
    event: UploadEvent,
) -> Result<UploadState, InvalidTransition> {
    use UploadEvent as E;
    use UploadState as S;

    let next = match (state, event) {
        (S::Unregistered, E::Registered) => S::Registered,
        (S::Registered, E::UploadStarted) => S::Uploading,
        (S::Uploading, E::ChunksAcknowledged { pending: 0 }) => S::Finalizing,
        (S::Finalizing, E::Finalized { wait: true }) => S::Polling,
        (S::Finalizing, E::Finalized { wait: false }) => S::Done,
        (S::Polling, E::ProcessingComplete) => S::Done,
        (from, E::Failed(phase)) if !from.is_terminal() => S::Failed(phase),
        (from, event) => {
            return Err(InvalidTransition {
                from: from.to_string(),
                event: event.to_string(),
            })
        }
    };
    Ok(next)
}
