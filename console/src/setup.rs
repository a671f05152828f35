use std::path::PathBuf;
use std::sync::Arc;

use log::{info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clients::Transport;
use crate::config::{
    self, ConfigKey, ConfigStore, FileConfigStore, HostConfig, InstallerConfig, BASE_URL_ENV,
};
use crate::error::Error;
use crate::install::{InstallationViewModel, StreamingInstaller};
use crate::models::{spawn_running_poller, ModelRegistry};

/// Everything a front-end needs, wired to one inference host.
pub struct Console {
    store: Option<FileConfigStore>,
    host: HostConfig,
    installer_config: InstallerConfig,
    registry: ModelRegistry,
    installs: InstallationViewModel,
}

impl Console {
    /// Load settings from `config_path` (or the platform default) and
    /// connect the components.
    pub fn setup(config_path: Option<PathBuf>) -> Result<Self, Error> {
        info!("Ollama Console v{}", env!("CARGO_PKG_VERSION"));

        let store = match config_path.or_else(config::default_config_path) {
            Some(path) => Some(FileConfigStore::open(path)?),
            None => {
                warn!("No config directory on this platform, using defaults");
                None
            }
        };

        let (host, installer_config) = match &store {
            Some(store) => (
                config::load_host_config(store),
                config::load_installer_config(store),
            ),
            None => (
                HostConfig::default().with_env_override(std::env::var(BASE_URL_ENV).ok()),
                InstallerConfig::default(),
            ),
        };

        let mut console = Self::from_config(host, installer_config)?;
        console.store = store;
        Ok(console)
    }

    /// Connect the components without a config store.
    pub fn from_config(host: HostConfig, installer_config: InstallerConfig) -> Result<Self, Error> {
        let transport = Arc::new(Transport::new(&host)?);
        let registry = ModelRegistry::new(transport.clone());
        let installs = InstallationViewModel::new(
            StreamingInstaller::new(transport),
            registry.clone(),
            installer_config.clone(),
        );

        Ok(Self {
            store: None,
            host,
            installer_config,
            registry,
            installs,
        })
    }

    pub fn host(&self) -> &HostConfig {
        &self.host
    }

    pub fn installer_config(&self) -> &InstallerConfig {
        &self.installer_config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn installs(&self) -> &InstallationViewModel {
        &self.installs
    }

    /// Persist a new host URL. Takes effect on the next start.
    pub fn save_base_url(&self, base_url: &str) -> Result<(), Error> {
        let Some(store) = &self.store else {
            return Err(no_store());
        };

        let host = HostConfig {
            base_url: base_url.trim().to_string(),
            ..store.get(&ConfigKey::HOST).unwrap_or_default()
        };
        // Reject URLs the transport could not use
        host.parsed_base_url()?;
        store.set(&ConfigKey::HOST, host)?;
        Ok(())
    }

    /// Forget stored host settings.
    pub fn reset_host_config(&self) -> Result<(), Error> {
        let Some(store) = &self.store else {
            return Err(no_store());
        };
        store.delete(&ConfigKey::HOST)?;
        Ok(())
    }

    pub fn config_path(&self) -> Option<&std::path::Path> {
        self.store.as_ref().map(FileConfigStore::path)
    }

    pub fn spawn_running_poller(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        spawn_running_poller(
            self.registry.clone(),
            self.installer_config.running_poll_interval(),
            shutdown,
        )
    }
}

fn no_store() -> Error {
    std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "no config file location available",
    )
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_persists_host_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let console = Console::setup(Some(path.clone())).unwrap();
        assert_eq!(console.config_path(), Some(path.as_path()));

        console.save_base_url("http://gpu-box:11434").unwrap();
        assert!(console.save_base_url("ftp://gpu-box").is_err());

        let stored = FileConfigStore::open(&path).unwrap();
        let host: HostConfig = stored.get(&ConfigKey::HOST).unwrap();
        assert_eq!(host.base_url, "http://gpu-box:11434");

        console.reset_host_config().unwrap();
        let stored = FileConfigStore::open(&path).unwrap();
        assert!(stored.get(&ConfigKey::HOST).is_none());
    }

    #[test]
    fn test_from_config_has_no_store() {
        let console = Console::from_config(HostConfig::default(), InstallerConfig::default()).unwrap();
        assert!(console.config_path().is_none());
        assert!(console.save_base_url("http://localhost:11434/").is_err());
    }
}
