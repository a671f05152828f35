use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request cancelled")]
    Cancelled,
    #[error("Request timed out after {} seconds", .after.as_secs())]
    Timeout { after: Duration },
    #[error("Host returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Unexpected response body: {0}")]
    Decode(String),
    #[error("Invalid request path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}

impl TransportError {
    /// Whether the request ended because its cancellation token fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, limit: Option<Duration>) -> Self {
        if err.is_timeout() {
            if let Some(after) = limit {
                return TransportError::Timeout { after };
            }
        }
        if err.is_decode() {
            return TransportError::Decode(err.to_string());
        }
        TransportError::Network(err.to_string())
    }

    /// Returns a user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            TransportError::Cancelled => "Installation cancelled.".to_string(),
            TransportError::Timeout { .. } => {
                "The inference host stopped responding. Please try again.".to_string()
            }
            TransportError::Status { status, body } => match status {
                404 => "Model not found on the inference host.".to_string(),
                _ if body.is_empty() => format!("The inference host answered with HTTP {}.", status),
                _ => format!("The inference host answered with HTTP {}: {}", status, body),
            },
            TransportError::Network(_) => {
                "Cannot reach the inference host. Is it running?".to_string()
            }
            TransportError::Decode(_) => {
                "The inference host sent a response this console does not understand.".to_string()
            }
            TransportError::InvalidPath { .. } => "Invalid request.".to_string(),
        }
    }
}
