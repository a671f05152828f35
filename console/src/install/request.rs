use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// Input rejected before any request is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Model name must not be empty")]
    EmptyModelName,
}

impl ValidationError {
    pub fn user_message(&self) -> String {
        match self {
            ValidationError::EmptyModelName => "Please enter a model name.".to_string(),
        }
    }
}

/// One model pull, consumed by [`super::StreamingInstaller::install`].
#[derive(Debug, Clone)]
pub struct InstallationRequest {
    model: String,
    insecure: bool,
    cancel: Option<CancellationToken>,
}

impl InstallationRequest {
    /// `model` is an opaque `name:tag` string; surrounding whitespace is
    /// dropped.
    pub fn new(model: impl AsRef<str>) -> Result<Self, ValidationError> {
        let model = model.as_ref().trim();
        if model.is_empty() {
            return Err(ValidationError::EmptyModelName);
        }

        Ok(Self {
            model: model.to_string(),
            insecure: false,
            cancel: None,
        })
    }

    /// Let the host skip certificate validation when fetching the model.
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn cancel_token(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    pub(crate) fn body(&self) -> Value {
        json!({
            "model": self.model,
            "insecure": self.insecure,
            "stream": true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_names_are_rejected() {
        for name in ["", "   ", "\t\n"] {
            assert_eq!(
                InstallationRequest::new(name).unwrap_err(),
                ValidationError::EmptyModelName
            );
        }
    }

    #[test]
    fn test_request_body() {
        let request = InstallationRequest::new("  llava:7b ").unwrap().insecure(true);

        assert_eq!(request.model(), "llava:7b");
        assert!(request.cancel_token().is_none());
        assert_eq!(
            request.body(),
            json!({ "model": "llava:7b", "insecure": true, "stream": true })
        );
    }
}
