use std::ops::ControlFlow;
use std::sync::Arc;

use log::{debug, info, warn};
use ollama_console_progress::{parse_line, CumulativeBuffer, ProgressFrame, StreamLine};
use reqwest::Method;

use super::request::InstallationRequest;
use crate::clients::{StreamEnd, Transport};

const PULL_PATH: &str = "api/pull";

/// Reason reported when the host closes the stream without `success`.
pub const ENDED_EARLY: &str = "stream ended before success";

/// How an installation ended.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum Outcome {
    #[display("success")]
    Success,
    #[display("cancelled")]
    Cancelled,
    #[display("failed: {_0}")]
    Failed(String),
}

/// Pulls a model over a single streamed request and reports its progress.
#[derive(Debug, Clone)]
pub struct StreamingInstaller {
    transport: Arc<Transport>,
}

impl StreamingInstaller {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    /// Run one pull to completion.
    ///
    /// Every chunk re-reads the accumulated response and surfaces only its
    /// newest non-empty line, so several lines arriving together yield a
    /// single frame. Lines that fail to parse are skipped. The first
    /// `success` frame resolves the pull; anything after it is ignored.
    ///
    /// A fired cancellation token always yields [`Outcome::Cancelled`], even
    /// if the transport reported a different error while unwinding.
    pub async fn install<F>(&self, request: InstallationRequest, mut on_progress: F) -> Outcome
    where
        F: FnMut(&ProgressFrame),
    {
        let body = request.body();
        let token = request.cancel_token().cloned();
        let is_cancelled = || token.as_ref().is_some_and(|t| t.is_cancelled());

        let mut buffer = CumulativeBuffer::new();
        let mut verdict: Option<Outcome> = None;

        info!("Pulling model '{}'", request.model());

        let result = self
            .transport
            .stream(Method::POST, PULL_PATH, Some(&body), token.as_ref(), |text| {
                if is_cancelled() {
                    verdict = Some(Outcome::Cancelled);
                    return ControlFlow::Break(());
                }

                let Some(line) = buffer.latest_line(text) else {
                    return ControlFlow::Continue(());
                };

                match parse_line(line) {
                    Ok(StreamLine::Progress(frame)) => {
                        debug!("Pull progress: {:?}", frame);
                        on_progress(&frame);
                        if frame.is_success() {
                            buffer.reset();
                            verdict = Some(Outcome::Success);
                            return ControlFlow::Break(());
                        }
                    }
                    Ok(StreamLine::HostError(message)) => {
                        warn!("Host reported pull failure: {}", message);
                        verdict = Some(Outcome::Failed(message));
                        return ControlFlow::Break(());
                    }
                    // A line still being received is expected to fail
                    Err(e) if !text.ends_with('\n') => {
                        debug!("Skipping incomplete progress line: {}", e);
                    }
                    Err(e) => {
                        warn!("Skipping unparseable progress line '{}': {}", line, e);
                    }
                }

                ControlFlow::Continue(())
            })
            .await;

        let outcome = match (verdict, result) {
            (Some(outcome), _) => outcome,
            (None, _) if is_cancelled() => Outcome::Cancelled,
            (None, Ok(StreamEnd::Completed)) => Outcome::Failed(ENDED_EARLY.to_string()),
            (None, Ok(StreamEnd::Stopped)) => Outcome::Failed(ENDED_EARLY.to_string()),
            (None, Err(e)) if e.is_cancelled() => Outcome::Cancelled,
            (None, Err(e)) => Outcome::Failed(e.to_string()),
        };

        info!("Pull of '{}' finished: {}", request.model(), outcome);
        outcome
    }
}
