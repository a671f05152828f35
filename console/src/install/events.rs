//! Events for the installation view-model.
//!
//! Published to subscribers of [`super::InstallationViewModel::subscribe`]
//! in the order the phases change.

use serde::{Deserialize, Serialize};

/// Installation state change event - single event stream for all phase transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum InstallationStateChanged {
    /// Pull request issued
    #[serde(rename = "started")]
    Started {
        #[serde(rename = "modelName")]
        model_name: String,
    },
    /// A progress frame was applied
    #[serde(rename = "progress")]
    Progress {
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        completed: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        percentage: Option<u8>,
    },
    /// User asked to cancel; waiting for the transfer to unwind
    #[serde(rename = "cancelling")]
    Cancelling,
    /// The model is installed
    #[serde(rename = "succeeded")]
    Succeeded {
        #[serde(rename = "modelName")]
        model_name: String,
    },
    /// Installation was cancelled by user
    #[serde(rename = "cancelled")]
    Cancelled,
    /// Installation failed
    #[serde(rename = "failed")]
    Failed {
        /// Technical reason for debugging
        reason: String,
        /// User-friendly message
        #[serde(rename = "userMessage")]
        user_message: String,
    },
    /// Back to idle after the display period
    #[serde(rename = "reset")]
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_progress_event_shape() {
        let event = InstallationStateChanged::Progress {
            status: "pulling manifest".to_string(),
            completed: None,
            total: None,
            percentage: None,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "state": "progress", "status": "pulling manifest" })
        );
    }

    #[test]
    fn test_failed_event_shape() {
        let event = InstallationStateChanged::Failed {
            reason: "Network error".to_string(),
            user_message: "Installation failed".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "state": "failed", "reason": "Network error", "userMessage": "Installation failed" })
        );
    }
}
