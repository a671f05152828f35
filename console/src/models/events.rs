//! Events published by the model registry.
//!
//! Subscribers register through [`super::ModelRegistry::subscribe`] and
//! receive every change to the installed or running model lists.

use serde::{Deserialize, Serialize};

use super::types::{InstalledModel, RunningModel};

/// Registry change event - single event stream for all list updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RegistryEvent {
    /// The installed list was replaced by a fresh fetch
    #[serde(rename = "installedChanged")]
    InstalledChanged { models: Vec<InstalledModel> },
    /// The set of running models differs from the previous poll
    #[serde(rename = "runningChanged")]
    RunningChanged { models: Vec<RunningModel> },
    /// A model was deleted from the host
    #[serde(rename = "modelDeleted")]
    ModelDeleted {
        #[serde(rename = "modelName")]
        model_name: String,
    },
}
