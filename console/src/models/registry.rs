use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};
use reqwest::Method;
use serde_json::json;

use super::events::RegistryEvent;
use super::types::{InstalledModel, ModelDetails, ModelsResponse, RunningModel};
use crate::clients::{Transport, TransportError};
use crate::listeners::{Listeners, Subscription};
use crate::sync::lock;

const TAGS_PATH: &str = "api/tags";
const PS_PATH: &str = "api/ps";
const SHOW_PATH: &str = "api/show";
const DELETE_PATH: &str = "api/delete";

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum DeleteOutcome {
    Deleted,
    /// Refused locally because the model is loaded on the host
    Running,
    Failed,
}

/// Reads and edits the host's model registry.
///
/// Single-shot operations never surface errors to the caller: a failed
/// fetch logs and yields an empty list or `None`. The last fetched
/// installed and running lists are kept so views can read them without a
/// round trip, and every change is published to subscribers.
#[derive(Clone)]
pub struct ModelRegistry {
    transport: Arc<Transport>,
    installed: Arc<Mutex<Vec<InstalledModel>>>,
    running: Arc<Mutex<Vec<RunningModel>>>,
    listeners: Listeners<RegistryEvent>,
}

impl ModelRegistry {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self {
            transport,
            installed: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(Mutex::new(Vec::new())),
            listeners: Listeners::new(),
        }
    }

    /// List installed models, surfacing transport failures.
    pub async fn try_fetch_installed(&self) -> Result<Vec<InstalledModel>, TransportError> {
        let response: ModelsResponse<InstalledModel> = self.transport.get_json(TAGS_PATH).await?;
        Ok(response.models)
    }

    /// List installed models; empty on failure.
    pub async fn fetch_installed(&self) -> Vec<InstalledModel> {
        match self.try_fetch_installed().await {
            Ok(models) => {
                debug!("Host reports {} installed models", models.len());
                models
            }
            Err(e) => {
                error!("Failed to list installed models: {}", e);
                Vec::new()
            }
        }
    }

    /// List models loaded on the host; empty on failure.
    pub async fn fetch_running(&self) -> Vec<RunningModel> {
        match self
            .transport
            .get_json::<ModelsResponse<RunningModel>>(PS_PATH)
            .await
        {
            Ok(response) => response.models,
            Err(e) => {
                error!("Failed to list running models: {}", e);
                Vec::new()
            }
        }
    }

    /// Fetch extended metadata for one model; `None` on failure.
    pub async fn fetch_details(&self, model_name: &str) -> Option<ModelDetails> {
        match self
            .transport
            .post_json(SHOW_PATH, &json!({ "model": model_name }))
            .await
        {
            Ok(details) => Some(details),
            Err(e) => {
                error!("Failed to fetch details of '{}': {}", model_name, e);
                None
            }
        }
    }

    /// Delete a model, unless it is currently loaded.
    ///
    /// On success the installed list is refreshed and subscribers receive
    /// [`RegistryEvent::ModelDeleted`].
    pub async fn delete_model(&self, model_name: &str) -> DeleteOutcome {
        if self.is_running(model_name) {
            warn!("Refusing to delete '{}' while it is running", model_name);
            return DeleteOutcome::Running;
        }

        let body = json!({ "model": model_name });
        if let Err(e) = self
            .transport
            .request(Method::DELETE, DELETE_PATH, Some(&body), None)
            .await
        {
            error!("Error deleting model '{}': {}", model_name, e);
            return DeleteOutcome::Failed;
        }

        info!("Deleted model '{}'", model_name);
        self.refresh_installed().await;
        self.listeners.emit(&RegistryEvent::ModelDeleted {
            model_name: model_name.to_string(),
        });

        DeleteOutcome::Deleted
    }

    /// Replace the cached installed list with a fresh fetch and notify
    /// subscribers. A failed fetch replaces it with an empty list.
    pub async fn refresh_installed(&self) -> Vec<InstalledModel> {
        let models = self.fetch_installed().await;
        *lock(&self.installed) = models.clone();

        self.listeners.emit(&RegistryEvent::InstalledChanged {
            models: models.clone(),
        });
        models
    }

    /// Replace the cached running list; subscribers are only notified
    /// when it changed.
    pub async fn refresh_running(&self) -> Vec<RunningModel> {
        let models = self.fetch_running().await;

        let changed = {
            let mut running = lock(&self.running);
            let changed = *running != models;
            *running = models.clone();
            changed
        };

        if changed {
            debug!("Running models changed: {} loaded", models.len());
            self.listeners.emit(&RegistryEvent::RunningChanged {
                models: models.clone(),
            });
        }
        models
    }

    /// Installed models as of the last refresh.
    pub fn installed(&self) -> Vec<InstalledModel> {
        lock(&self.installed).clone()
    }

    pub fn is_running(&self, model_name: &str) -> bool {
        lock(&self.running).iter().any(|m| m.name == model_name)
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription<RegistryEvent>
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn registry_for(server: &MockServer) -> ModelRegistry {
        let config = HostConfig {
            base_url: server.uri(),
            request_timeout_secs: 2,
            ..HostConfig::default()
        };
        ModelRegistry::new(Arc::new(Transport::new(&config).unwrap()))
    }

    fn collect_events(registry: &ModelRegistry) -> (Arc<Mutex<Vec<RegistryEvent>>>, Subscription<RegistryEvent>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let subscription = registry.subscribe(move |event| lock(&sink).push(event.clone()));
        (events, subscription)
    }

    async fn mount_tags(server: &MockServer, names: &[&str]) {
        let models: Vec<_> = names
            .iter()
            .map(|name| json!({ "name": name, "digest": format!("digest-{}", name) }))
            .collect();
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": models })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_refresh_installed_replaces_list_and_notifies() {
        let server = MockServer::start().await;
        mount_tags(&server, &["phi3:latest", "llava:7b"]).await;

        let registry = registry_for(&server);
        let (events, _subscription) = collect_events(&registry);

        let models = registry.refresh_installed().await;

        assert_eq!(models.len(), 2);
        assert_eq!(registry.installed(), models);
        assert_eq!(
            *lock(&events),
            vec![RegistryEvent::InstalledChanged { models }]
        );
    }

    #[tokio::test]
    async fn test_failed_fetches_yield_empty_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let registry = registry_for(&server);

        assert!(registry.fetch_installed().await.is_empty());
        assert!(registry.fetch_running().await.is_empty());
        assert!(registry.fetch_details("phi3:latest").await.is_none());
        assert!(matches!(
            registry.try_fetch_installed().await,
            Err(TransportError::Status { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_details() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/show"))
            .and(body_json(json!({ "model": "llama3.2:latest" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "template": "{{ .Prompt }}",
                "details": { "format": "gguf", "family": "llama",
                             "parameter_size": "3.2B", "quantization_level": "Q4_K_M" },
                "model_info": { "general.architecture": "llama", "llama.context_length": 131072 }
            })))
            .mount(&server)
            .await;

        let registry = registry_for(&server);
        let details = registry.fetch_details("llama3.2:latest").await.unwrap();

        assert_eq!(details.details.quantization_level, "Q4_K_M");
        assert_eq!(details.context_length(), Some(131_072));
    }

    #[tokio::test]
    async fn test_delete_refreshes_and_notifies() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/delete"))
            .and(body_json(json!({ "model": "phi3:latest" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        mount_tags(&server, &["llava:7b"]).await;

        let registry = registry_for(&server);
        let (events, _subscription) = collect_events(&registry);

        assert_eq!(registry.delete_model("phi3:latest").await, DeleteOutcome::Deleted);

        let events = lock(&events).clone();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], RegistryEvent::InstalledChanged { models } if models.len() == 1));
        assert_eq!(
            events[1],
            RegistryEvent::ModelDeleted {
                model_name: "phi3:latest".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_delete_failure_does_not_notify() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/delete"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let registry = registry_for(&server);
        let (events, _subscription) = collect_events(&registry);

        assert_eq!(registry.delete_model("ghost:latest").await, DeleteOutcome::Failed);
        assert!(lock(&events).is_empty());
    }

    #[tokio::test]
    async fn test_running_model_cannot_be_deleted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ps"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "models": [{ "name": "phi3:latest" }] })),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let registry = registry_for(&server);
        registry.refresh_running().await;

        assert!(registry.is_running("phi3:latest"));
        assert_eq!(registry.delete_model("phi3:latest").await, DeleteOutcome::Running);
    }

    #[tokio::test]
    async fn test_running_change_notifies_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ps"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "models": [{ "name": "mistral:latest" }] })),
            )
            .mount(&server)
            .await;

        let registry = registry_for(&server);
        let (events, _subscription) = collect_events(&registry);

        registry.refresh_running().await;
        registry.refresh_running().await;

        assert_eq!(lock(&events).len(), 1);
    }
}
