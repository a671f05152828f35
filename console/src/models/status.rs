use log::warn;
use serde::{Deserialize, Serialize};

use super::catalog::estimated_size_gb;
use super::registry::ModelRegistry;

/// Rough memory footprint assumed per loaded model, in GB.
pub const MEMORY_PER_RUNNING_MODEL_GB: f64 = 2.5;

/// Host summary - computed, not stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostStatus {
    /// Did the host answer the installed-models query?
    pub reachable: bool,
    pub model_count: usize,
    pub running_count: usize,
    pub estimated_memory_gb: f64,
    pub estimated_storage_gb: f64,
}

impl HostStatus {
    pub fn unreachable() -> Self {
        Self::default()
    }
}

/// Query the host and summarize what is installed and loaded.
pub async fn probe(registry: &ModelRegistry) -> HostStatus {
    let installed = match registry.try_fetch_installed().await {
        Ok(models) => models,
        Err(e) => {
            warn!("Inference host unreachable: {}", e);
            return HostStatus::unreachable();
        }
    };
    let running = registry.fetch_running().await;

    HostStatus {
        reachable: true,
        model_count: installed.len(),
        running_count: running.len(),
        estimated_memory_gb: running.len() as f64 * MEMORY_PER_RUNNING_MODEL_GB,
        estimated_storage_gb: installed.iter().map(|m| estimated_size_gb(&m.name)).sum(),
    }
}
