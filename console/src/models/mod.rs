mod catalog;
pub mod events;
mod poller;
mod registry;
mod status;
mod types;

pub use catalog::{
    estimated_size_gb, suggested_catalog, suggestions, ModelCategory, ModelKind, SuggestedModel,
};
pub use events::RegistryEvent;
pub use poller::spawn_running_poller;
pub use registry::{DeleteOutcome, ModelRegistry};
pub use status::{probe, HostStatus};
pub use types::{base_name, InstalledModel, ModelDetails, ModelSummary, RunningModel};
