mod cancel;
pub mod events;
mod installer;
mod request;
mod state_manager;
mod view_model;

pub use cancel::{AttemptToken, Busy, CancellationCoordinator};
pub use events::InstallationStateChanged;
pub use installer::{Outcome, StreamingInstaller, ENDED_EARLY};
pub use request::{InstallationRequest, ValidationError};
pub use state_manager::{
    InstallEvent, InstallPhase, InstallStateMachine, TransitionRejection, TransitionResult,
};
pub use view_model::{
    ByteProgress, InstallationSnapshot, InstallationViewModel, StartError, CANCEL_TIMED_OUT,
    STATUS_CANCELLED, STATUS_CANCELLING, STATUS_COMPLETE, STATUS_FAILED, STATUS_STARTING,
};
