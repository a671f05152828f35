//! Installation State Machine - Single source of truth for valid phase transitions
//!
//! State diagram:
//! ```text
//! Idle ──Start──> Requesting ──FrameReceived──> Downloading ──Succeeded──> Succeeded
//!                     │                             │
//!                     └──────CancelRequested────────┤
//!                     │                             ↓
//!                     │                        Cancelling ──CancelAcknowledged──> Cancelled
//!                     │                             │
//!                     └──Failed──> Failed <──Failed─┘ (grace timeout)
//!
//! Succeeded | Cancelled | Failed ──Reset──> Idle
//! ```
//!
//! Busy phases own the attempt's cancellation token; terminal phases wait
//! for the display timer or a new start to reset them.

/// Events that can trigger phase transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum InstallEvent {
    /// Pull request issued
    Start,
    /// A progress frame arrived
    FrameReceived,
    /// The host reported `success`
    Succeeded,
    /// User asked to cancel
    CancelRequested,
    /// The installer unwound after cancellation
    CancelAcknowledged,
    /// Transport error, host error or cancel grace timeout
    Failed,
    /// Display period over, or superseded by a new start
    Reset,
}

/// Installation phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InstallPhase {
    #[default]
    Idle,
    /// Pull sent, no frame yet
    Requesting,
    Downloading,
    /// Cancel requested, waiting for the transfer to unwind
    Cancelling,
    Succeeded,
    Cancelled,
    Failed,
}

impl InstallPhase {
    /// An attempt is in flight and holds a cancellation token
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Requesting | Self::Downloading | Self::Cancelling)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Cancelled | Self::Failed)
    }
}

/// Result of a successful state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    /// Phase changed
    Changed { from: InstallPhase, to: InstallPhase },
    /// Event was valid but phase didn't change
    Unchanged,
}

/// Reason a transition was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{attempted_event} event rejected in {current_phase} phase")]
pub struct TransitionRejection {
    pub current_phase: InstallPhase,
    pub attempted_event: InstallEvent,
}

/// Installation phase holder. Not synchronized itself; the view-model keeps
/// it behind the same lock as the rest of its state.
#[derive(Debug, Default)]
pub struct InstallStateMachine {
    phase: InstallPhase,
}

impl InstallStateMachine {
    pub fn current(&self) -> InstallPhase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.phase.is_busy()
    }

    /// Attempt a phase transition based on an event
    ///
    /// This is the ONLY way to change phase - ensures all transitions are valid.
    pub fn transition(
        &mut self,
        event: InstallEvent,
    ) -> Result<TransitionResult, TransitionRejection> {
        let current = self.phase;

        match compute_transition(current, event) {
            Some(next) if next == current => Ok(TransitionResult::Unchanged),
            Some(next) => {
                self.phase = next;
                Ok(TransitionResult::Changed {
                    from: current,
                    to: next,
                })
            }
            None => Err(TransitionRejection {
                current_phase: current,
                attempted_event: event,
            }),
        }
    }
}

/// Pure function: compute the next phase, or None if the event is invalid
fn compute_transition(current: InstallPhase, event: InstallEvent) -> Option<InstallPhase> {
    use InstallEvent as E;
    use InstallPhase as P;

    match (current, event) {
        (P::Idle, E::Start) => Some(P::Requesting),
        (P::Idle, E::Reset) => Some(P::Idle),

        (P::Requesting | P::Downloading, E::FrameReceived) => Some(P::Downloading),
        (P::Requesting | P::Downloading, E::Succeeded) => Some(P::Succeeded),
        (P::Requesting | P::Downloading, E::CancelRequested) => Some(P::Cancelling),
        (P::Requesting | P::Downloading, E::Failed) => Some(P::Failed),

        // Frames still in the pipe after a cancel are ignored
        (P::Cancelling, E::FrameReceived | E::CancelRequested) => Some(P::Cancelling),
        (P::Cancelling, E::CancelAcknowledged) => Some(P::Cancelled),
        (P::Cancelling, E::Failed) => Some(P::Failed),
        // The host finished before the cancel reached it
        (P::Cancelling, E::Succeeded) => Some(P::Succeeded),

        (P::Succeeded | P::Cancelled | P::Failed, E::Reset) => Some(P::Idle),

        _ => None,
    }
}
