use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::sync::lock;

/// Environment variable selecting the inference host.
pub const BASE_URL_ENV: &str = "OLLAMA_API_URL";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid host URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode config value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Type-safe configuration key that associates a key name with its value type
#[derive(Debug, Clone, Copy)]
pub struct ConfigKey<T> {
    name: &'static str,
    _phantom: PhantomData<T>,
}

impl<T> ConfigKey<T> {
    const fn new(name: &'static str) -> Self {
        Self {
            name,
            _phantom: PhantomData,
        }
    }

    pub fn key_name(&self) -> &'static str {
        self.name
    }
}

// ===== Host Configuration =====

/// Where the inference host lives and how long to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HostConfig {
    pub base_url: String,
    /// Whole-request limit for single-shot calls
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated between two chunks of a streamed pull
    pub stream_idle_timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            stream_idle_timeout_secs: 120,
        }
    }
}

impl HostConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }

    /// Replace the base URL with the environment override, if any.
    pub fn with_env_override(mut self, env_value: Option<String>) -> Self {
        if let Some(url) = env_value.filter(|v| !v.trim().is_empty()) {
            debug!("Using host from {}: {}", BASE_URL_ENV, url);
            self.base_url = url.trim().to_string();
        }
        self
    }

    /// Base URL parsed and normalized with a trailing slash, so that
    /// relative API paths join below it instead of replacing its last segment.
    pub fn parsed_base_url(&self) -> Result<reqwest::Url, ConfigError> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }

        let url = reqwest::Url::parse(&raw).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: format!("unsupported scheme '{}'", other),
            }),
        }
    }
}

impl ConfigKey<HostConfig> {
    pub const HOST: Self = Self::new("hostConfig");
}

// ===== Installer Configuration =====

/// Defaults and timings of the installation view-model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct InstallerConfig {
    /// Ask the host to accept registries with invalid certificates
    pub insecure: bool,
    /// How long "succeeded" stays on screen before the installed list refreshes
    pub success_display_ms: u64,
    /// How long a terminal phase stays on screen before returning to idle
    pub reset_delay_ms: u64,
    /// How long a cancelled pull may keep running before it is declared failed
    pub cancel_grace_ms: u64,
    pub running_poll_ms: u64,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            insecure: false,
            success_display_ms: 1_000,
            reset_delay_ms: 3_000,
            cancel_grace_ms: 10_000,
            running_poll_ms: 5_000,
        }
    }
}

impl InstallerConfig {
    pub fn running_poll_interval(&self) -> Duration {
        Duration::from_millis(self.running_poll_ms)
    }
}

impl ConfigKey<InstallerConfig> {
    pub const INSTALLER: Self = Self::new("installerConfig");
}

// ===== Type-Safe Config Store =====

pub trait ConfigStore {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T>;
    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), ConfigError>;
    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), ConfigError>;
}

/// Config store persisted as a single JSON object on disk.
pub struct FileConfigStore {
    path: PathBuf,
    data: Mutex<HashMap<String, serde_json::Value>>,
}

impl FileConfigStore {
    /// Open the store at `path`. A missing file is an empty store; an
    /// unreadable one is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Ignoring malformed config file {:?}: {}", path, e);
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(ConfigError::Io(e)),
        };

        info!("Config file: {:?}", path);
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, data: &HashMap<String, serde_json::Value>) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl ConfigStore for FileConfigStore {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T> {
        lock(&self.data)
            .get(key.key_name())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), ConfigError> {
        let val = serde_json::to_value(value)?;
        let mut data = lock(&self.data);
        data.insert(key.key_name().to_string(), val);
        self.save(&data)
    }

    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), ConfigError> {
        let mut data = lock(&self.data);
        data.remove(key.key_name());
        self.save(&data)
    }
}

/// `<config dir>/ollama-console/config.json`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ollama-console").join("config.json"))
}

/// Stored host config (or defaults) with the environment override applied.
pub fn load_host_config(store: &impl ConfigStore) -> HostConfig {
    store
        .get(&ConfigKey::HOST)
        .unwrap_or_default()
        .with_env_override(std::env::var(BASE_URL_ENV).ok())
}

pub fn load_installer_config(store: &impl ConfigStore) -> InstallerConfig {
    store.get(&ConfigKey::INSTALLER).unwrap_or_default()
}
