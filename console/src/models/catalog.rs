use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};

use super::types::{base_name, InstalledModel};

/// Category a suggested model is listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModelCategory {
    Chat,
    Vision,
    Embeddings,
}

impl ModelCategory {
    /// Parse a category name as typed on the command line.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::iter().find(|c| c.to_string().eq_ignore_ascii_case(value))
    }
}

/// Kind of an installed model, guessed from its name.
pub type ModelKind = ModelCategory;

impl ModelKind {
    /// `llava`, `vision` and `minicpm-v` mark vision models, `embed` marks
    /// embedding models; everything else is a chat model.
    pub fn classify(model_name: &str) -> ModelKind {
        let name = model_name.to_lowercase();
        if name.contains("llava") || name.contains("vision") || name.contains("minicpm-v") {
            ModelKind::Vision
        } else if name.contains("embed") {
            ModelKind::Embeddings
        } else {
            ModelKind::Chat
        }
    }
}

/// A model offered for one-click installation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedModel {
    /// Full name with tag (e.g., "phi3:latest")
    pub name: &'static str,
    /// Download size as shown to the user (e.g., "2.2GB")
    pub size_label: &'static str,
    pub category: ModelCategory,
}

impl SuggestedModel {
    pub fn base_name(&self) -> &'static str {
        base_name(self.name)
    }

    /// Installed under its full name, or its base name under any tag.
    pub fn is_installed(&self, installed: &[InstalledModel]) -> bool {
        installed
            .iter()
            .any(|m| m.name == self.name || m.base_name() == self.base_name())
    }
}

const fn suggestion(
    name: &'static str,
    size_label: &'static str,
    category: ModelCategory,
) -> SuggestedModel {
    SuggestedModel {
        name,
        size_label,
        category,
    }
}

/// Hardcoded list of suggested models
pub fn suggested_catalog() -> Vec<SuggestedModel> {
    use ModelCategory::*;

    vec![
        suggestion("phi4:latest", "9.1GB", Chat),
        suggestion("mistral:latest", "4.1GB", Chat),
        suggestion("phi3:latest", "2.2GB", Chat),
        suggestion("llama3.2:latest", "2.0GB", Chat),
        suggestion("deepseek-r1:7b", "4.7GB", Chat),
        suggestion("llava:7b", "4.7GB", Vision),
        suggestion("minicpm-v:8b", "5.5GB", Vision),
        suggestion("llama3.2-vision:11b", "7.9GB", Vision),
        suggestion("mxbai-embed-large:latest", "670MB", Embeddings),
        suggestion("nomic-embed-text:latest", "274MB", Embeddings),
    ]
}

/// Suggestions of one category that are not installed yet.
pub fn suggestions(category: ModelCategory, installed: &[InstalledModel]) -> Vec<SuggestedModel> {
    suggested_catalog()
        .into_iter()
        .filter(|s| s.category == category && !s.is_installed(installed))
        .collect()
}

/// Approximate on-disk size per base name, in GB. Order matters: the first
/// key contained in a model's base name wins.
const SIZE_ESTIMATES_GB: &[(&str, f64)] = &[
    ("phi4", 9.1),
    ("mistral", 4.1),
    ("phi3", 2.2),
    ("llama3.2", 2.0),
    ("deepseek-r1", 4.7),
    ("llava", 4.7),
    ("minicpm-v", 5.5),
    ("llama3.2-vision", 7.9),
    ("mxbai-embed-large", 0.67),
    ("nomic-embed-text", 0.274),
];

/// Estimated size of a model in GB; 0 for unknown models.
pub fn estimated_size_gb(model_name: &str) -> f64 {
    let base = base_name(model_name);
    SIZE_ESTIMATES_GB
        .iter()
        .find(|(key, _)| base.contains(key))
        .map(|(_, size)| *size)
        .unwrap_or(0.0)
}
