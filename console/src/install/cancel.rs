use std::sync::Mutex;

use log::debug;
use tokio_util::sync::CancellationToken;

use crate::sync::lock;

/// Cancellation handle of one installation attempt.
#[derive(Debug, Clone)]
pub struct AttemptToken {
    id: u64,
    token: CancellationToken,
}

impl AttemptToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("An installation is already in progress")]
pub struct Busy;

#[derive(Debug, Default)]
struct Slot {
    next_id: u64,
    live: Option<AttemptToken>,
}

/// Hands out at most one live cancellation token at a time.
#[derive(Debug, Default)]
pub struct CancellationCoordinator {
    slot: Mutex<Slot>,
}

impl CancellationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the token for a new attempt. Rejected while another attempt
    /// still holds one.
    pub fn begin(&self) -> Result<AttemptToken, Busy> {
        let mut slot = lock(&self.slot);
        if slot.live.is_some() {
            return Err(Busy);
        }

        slot.next_id += 1;
        let attempt = AttemptToken {
            id: slot.next_id,
            token: CancellationToken::new(),
        };
        slot.live = Some(attempt.clone());

        debug!("Installation attempt {} started", attempt.id);
        Ok(attempt)
    }

    /// Request cancellation. Returns `false` when the attempt is no longer
    /// live or was already cancelled.
    pub fn cancel(&self, attempt: &AttemptToken) -> bool {
        let slot = lock(&self.slot);
        match &slot.live {
            Some(live) if live.id == attempt.id && !live.is_cancelled() => {
                debug!("Cancelling installation attempt {}", attempt.id);
                live.token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.slot).live.is_some()
    }

    /// Release the attempt's slot so the next `begin()` succeeds.
    pub fn finish(&self, attempt: &AttemptToken) {
        let mut slot = lock(&self.slot);
        if slot.live.as_ref().is_some_and(|live| live.id == attempt.id) {
            slot.live = None;
        }
    }
}
