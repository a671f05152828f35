use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A model registered on the inference host (`GET /api/tags`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledModel {
    pub name: String,
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

impl InstalledModel {
    /// Name without the tag: `llama3.2:latest` -> `llama3.2`.
    pub fn base_name(&self) -> &str {
        base_name(&self.name)
    }
}

/// A model currently loaded in the host's memory (`GET /api/ps`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningModel {
    pub name: String,
}

/// Envelope shared by `/api/tags` and `/api/ps`.
#[derive(Debug, Deserialize)]
pub(crate) struct ModelsResponse<T> {
    #[serde(default = "Vec::new")]
    pub models: Vec<T>,
}

/// Extended metadata of one model (`POST /api/show`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDetails {
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub details: ModelSummary,
    /// Free-form `<architecture>.<field>` keys
    #[serde(default)]
    pub model_info: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSummary {
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub parameter_size: String,
    #[serde(default)]
    pub quantization_level: String,
}

impl ModelDetails {
    pub fn architecture(&self) -> Option<&str> {
        self.model_info
            .get("general.architecture")
            .and_then(Value::as_str)
    }

    pub fn context_length(&self) -> Option<u64> {
        self.architecture_field("context_length")
    }

    pub fn embedding_length(&self) -> Option<u64> {
        self.architecture_field("embedding_length")
    }

    /// Look up `<architecture>.<field>`, falling back to the `llama.` prefix
    /// used by most GGUF conversions.
    fn architecture_field(&self, field: &str) -> Option<u64> {
        let lookup = |prefix: &str| {
            self.model_info
                .get(&format!("{}.{}", prefix, field))
                .and_then(Value::as_u64)
        };

        self.architecture()
            .and_then(lookup)
            .or_else(|| lookup("llama"))
    }
}

/// Name without the tag: `llama3.2:latest` -> `llama3.2`.
pub fn base_name(name: &str) -> &str {
    name.split(':').next().unwrap_or(name)
}
