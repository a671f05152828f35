use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use ollama_console_progress::ProgressFrame;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::cancel::{AttemptToken, Busy, CancellationCoordinator};
use super::events::InstallationStateChanged;
use super::installer::{Outcome, StreamingInstaller};
use super::request::{InstallationRequest, ValidationError};
use super::state_manager::{InstallEvent, InstallPhase, InstallStateMachine, TransitionResult};
use crate::config::InstallerConfig;
use crate::listeners::{Listeners, Subscription};
use crate::models::{InstalledModel, ModelRegistry};
use crate::sync::lock;

pub const STATUS_STARTING: &str = "Starting installation...";
pub const STATUS_CANCELLING: &str = "Cancelling...";
pub const STATUS_COMPLETE: &str = "Installation complete";
pub const STATUS_CANCELLED: &str = "Installation cancelled";
pub const STATUS_FAILED: &str = "Installation failed";

/// Reason recorded when a cancelled pull outlives the grace period.
pub const CANCEL_TIMED_OUT: &str = "cancellation did not complete in time";

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Busy(#[from] Busy),
}

impl StartError {
    pub fn user_message(&self) -> String {
        match self {
            StartError::Validation(e) => e.user_message(),
            StartError::Busy(_) => "Another installation is still running.".to_string(),
        }
    }
}

/// Byte progress of the latest frame that carried it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteProgress {
    pub completed: u64,
    pub total: u64,
    pub percentage: u8,
}

/// What the display layer renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationSnapshot {
    pub phase: InstallPhase,
    pub model_name: Option<String>,
    pub status_text: String,
    pub progress: Option<ByteProgress>,
}

#[derive(Debug, Default)]
struct State {
    machine: InstallStateMachine,
    model_name: Option<String>,
    status_text: String,
    progress: Option<ByteProgress>,
    /// Present only while an attempt is busy
    attempt: Option<AttemptToken>,
    /// Bumped per attempt so a stale reset timer leaves a newer one alone
    generation: u64,
}

impl State {
    fn snapshot(&self) -> InstallationSnapshot {
        InstallationSnapshot {
            phase: self.machine.current(),
            model_name: self.model_name.clone(),
            status_text: self.status_text.clone(),
            progress: self.progress,
        }
    }

    fn clear(&mut self) {
        self.model_name = None;
        self.status_text.clear();
        self.progress = None;
    }

    /// Apply an event; a rejection is logged and leaves the phase unchanged.
    fn apply(&mut self, event: InstallEvent) -> bool {
        match self.machine.transition(event) {
            Ok(TransitionResult::Changed { from, to }) => {
                debug!("Installation phase {} -> {}", from, to);
                true
            }
            Ok(TransitionResult::Unchanged) => false,
            Err(rejection) => {
                warn!("{}", rejection);
                false
            }
        }
    }
}

/// Presentation-facing installation state, driven by the installer.
///
/// Clones share state. One installation runs at a time; `start()` while one
/// is in flight is rejected.
#[derive(Clone)]
pub struct InstallationViewModel {
    state: Arc<Mutex<State>>,
    coordinator: Arc<CancellationCoordinator>,
    installer: StreamingInstaller,
    registry: ModelRegistry,
    config: InstallerConfig,
    listeners: Listeners<InstallationStateChanged>,
}

/// Settles an attempt whose `start()` future is dropped before the pull ends.
///
/// The transfer is dropped along with the future, so the attempt is closed
/// as cancelled and its slot released for the next `start()`.
struct AttemptGuard<'a> {
    view_model: &'a InstallationViewModel,
    attempt: AttemptToken,
    generation: u64,
    armed: bool,
}

impl AttemptGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        warn!("Installation attempt {} dropped before it finished", self.attempt.id());
        let view_model = self.view_model;
        view_model.coordinator.cancel(&self.attempt);
        lock(&view_model.state).apply(InstallEvent::CancelRequested);
        view_model.finish(&self.attempt, &Outcome::Cancelled);

        // Outside a runtime there is nothing to run the reset timer on
        if tokio::runtime::Handle::try_current().is_ok() {
            view_model.schedule_reset(self.generation);
        }
    }
}

impl InstallationViewModel {
    pub fn new(
        installer: StreamingInstaller,
        registry: ModelRegistry,
        config: InstallerConfig,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            coordinator: Arc::new(CancellationCoordinator::new()),
            installer,
            registry,
            config,
            listeners: Listeners::new(),
        }
    }

    /// Install `model` and wait for the attempt to end.
    ///
    /// A terminal phase left over from a previous attempt is reset first.
    /// On success the installed list is refreshed after the display delay,
    /// without delaying the return. Dropping the returned future before it
    /// completes cancels the attempt.
    pub async fn start(&self, model: &str, insecure: bool) -> Result<Outcome, StartError> {
        let request = InstallationRequest::new(model)?.insecure(insecure);
        let model_name = request.model().to_string();

        let (attempt, generation) = {
            let mut state = lock(&self.state);
            if state.machine.is_busy() {
                return Err(Busy.into());
            }
            if state.machine.current().is_terminal() {
                state.apply(InstallEvent::Reset);
                state.clear();
            }

            let attempt = self.coordinator.begin()?;
            state.apply(InstallEvent::Start);
            state.generation += 1;
            state.model_name = Some(model_name.clone());
            state.status_text = STATUS_STARTING.to_string();
            state.progress = None;
            state.attempt = Some(attempt.clone());
            (attempt, state.generation)
        };

        let guard = AttemptGuard {
            view_model: self,
            attempt: attempt.clone(),
            generation,
            armed: true,
        };

        info!("Installing model '{}'", model_name);
        self.listeners.emit(&InstallationStateChanged::Started {
            model_name: model_name.clone(),
        });

        let outcome = self
            .run(request.with_cancel(attempt.token().clone()), &attempt)
            .await;
        guard.disarm();
        self.finish(&attempt, &outcome);

        if outcome == Outcome::Success {
            self.schedule_refresh();
        }
        self.schedule_reset(generation);

        Ok(outcome)
    }

    async fn run(&self, request: InstallationRequest, attempt: &AttemptToken) -> Outcome {
        let progress_sink = self.clone();
        let install = self
            .installer
            .install(request, move |frame| progress_sink.apply_frame(frame));
        let grace = Duration::from_millis(self.config.cancel_grace_ms);

        await_with_grace(install, attempt.token(), grace).await
    }

    fn apply_frame(&self, frame: &ProgressFrame) {
        let event = {
            let mut state = lock(&self.state);
            if state.machine.current() == InstallPhase::Cancelling || !state.machine.is_busy() {
                return;
            }

            state.apply(InstallEvent::FrameReceived);
            state.status_text = frame.status().to_string();
            state.progress = frame
                .bytes()
                .zip(frame.percentage())
                .map(|((completed, total), percentage)| ByteProgress {
                    completed,
                    total,
                    percentage: percentage.value(),
                });

            InstallationStateChanged::Progress {
                status: state.status_text.clone(),
                completed: state.progress.map(|p| p.completed),
                total: state.progress.map(|p| p.total),
                percentage: state.progress.map(|p| p.percentage),
            }
        };

        self.listeners.emit(&event);
    }

    fn finish(&self, attempt: &AttemptToken, outcome: &Outcome) {
        let event = {
            let mut state = lock(&self.state);

            let event = match outcome {
                Outcome::Success => {
                    state.apply(InstallEvent::Succeeded);
                    state.status_text = STATUS_COMPLETE.to_string();
                    InstallationStateChanged::Succeeded {
                        model_name: state.model_name.clone().unwrap_or_default(),
                    }
                }
                Outcome::Cancelled => {
                    state.apply(InstallEvent::CancelAcknowledged);
                    state.status_text = STATUS_CANCELLED.to_string();
                    state.progress = None;
                    InstallationStateChanged::Cancelled
                }
                Outcome::Failed(reason) => {
                    state.apply(InstallEvent::Failed);
                    state.status_text = STATUS_FAILED.to_string();
                    state.progress = None;
                    InstallationStateChanged::Failed {
                        reason: reason.clone(),
                        user_message: STATUS_FAILED.to_string(),
                    }
                }
            };

            state.attempt = None;
            self.coordinator.finish(attempt);
            event
        };

        self.listeners.emit(&event);
    }

    fn schedule_refresh(&self) {
        let view_model = self.clone();
        let delay = Duration::from_millis(self.config.success_display_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            view_model.refresh_installed().await;
        });
    }

    fn schedule_reset(&self, generation: u64) {
        let view_model = self.clone();
        let delay = Duration::from_millis(self.config.reset_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            view_model.reset_generation(generation);
        });
    }

    /// Ask the in-flight installation to stop. Returns `false` when nothing
    /// is running or a cancel is already pending.
    pub fn cancel(&self) -> bool {
        {
            let mut state = lock(&self.state);
            let Some(attempt) = state.attempt.clone() else {
                return false;
            };
            if !state.apply(InstallEvent::CancelRequested) {
                return false;
            }

            state.status_text = STATUS_CANCELLING.to_string();
            self.coordinator.cancel(&attempt);
        }

        info!("Installation cancel requested");
        self.listeners.emit(&InstallationStateChanged::Cancelling);
        true
    }

    /// Return a terminal phase to idle right away.
    pub fn reset(&self) {
        let generation = lock(&self.state).generation;
        self.reset_generation(generation);
    }

    fn reset_generation(&self, generation: u64) {
        {
            let mut state = lock(&self.state);
            if state.generation != generation || !state.machine.current().is_terminal() {
                return;
            }
            state.apply(InstallEvent::Reset);
            state.clear();
        }

        self.listeners.emit(&InstallationStateChanged::Reset);
    }

    /// Reload the installed-model list.
    pub async fn refresh_installed(&self) -> Vec<InstalledModel> {
        self.registry.refresh_installed().await
    }

    pub fn snapshot(&self) -> InstallationSnapshot {
        lock(&self.state).snapshot()
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.state).machine.is_busy()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription<InstallationStateChanged>
    where
        F: Fn(&InstallationStateChanged) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }
}

/// Wait for `install`, giving it `grace` to unwind once `token` fires.
///
/// The streaming installer races the same token and normally returns
/// right away; this bounds an unwind that stalls anyway.
async fn await_with_grace<F>(install: F, token: &CancellationToken, grace: Duration) -> Outcome
where
    F: Future<Output = Outcome>,
{
    tokio::pin!(install);

    tokio::select! {
        outcome = &mut install => return outcome,
        _ = token.cancelled() => {}
    }

    match tokio::time::timeout(grace, &mut install).await {
        Ok(outcome) => outcome,
        Err(_) => {
            error!("Cancelled installation still running after {:?}", grace);
            Outcome::Failed(CANCEL_TIMED_OUT.to_string())
        }
    }
}
