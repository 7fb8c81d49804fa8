//! Declarative federation configuration.
//!
//! Hosts describe their remotes in config rather than code, so adding a
//! module is a deploy-time change. The model deserializes from whatever
//! provider the host uses and is validated when turned into descriptors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::descriptor::ModuleDescriptor;
use crate::shared_scope::SharedScope;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("module '{id}' is declared more than once")]
    DuplicateModuleId { id: String },

    #[error("module '{id}' has an invalid entry URL '{url}': {reason}")]
    InvalidUrl {
        id: String,
        url: String,
        reason: String,
    },
}

/// One remote module declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub id: String,
    /// Location of the remote entry manifest.
    pub url: String,
    pub scope: String,
    /// Exposed module path inside the container, defaults to `./App`.
    #[serde(default = "default_exposed_module")]
    pub exposed_module: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Permissions gating preload for this module; empty means always.
    #[serde(default)]
    pub required_permissions: Vec<String>,
}

fn default_exposed_module() -> String {
    "./App".to_owned()
}

/// Load-chain tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Upper bound on one remote entry fetch-and-register, in seconds.
    #[serde(default = "default_entry_timeout_secs")]
    pub entry_timeout_secs: u64,
    /// Upper bound on one fragment fetch at render time, in seconds.
    #[serde(default = "default_fragment_timeout_secs")]
    pub fragment_timeout_secs: u64,
}

fn default_entry_timeout_secs() -> u64 {
    10
}

fn default_fragment_timeout_secs() -> u64 {
    10
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            entry_timeout_secs: default_entry_timeout_secs(),
            fragment_timeout_secs: default_fragment_timeout_secs(),
        }
    }
}

impl LoadConfig {
    pub fn entry_timeout(&self) -> Duration {
        Duration::from_secs(self.entry_timeout_secs)
    }

    pub fn fragment_timeout(&self) -> Duration {
        Duration::from_secs(self.fragment_timeout_secs)
    }
}

/// Health-check tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSection {
    /// Results younger than this are served from cache, in seconds.
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: u64,
    /// Upper bound on one probe, in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Background monitor cadence, in seconds. Zero disables the monitor.
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
}

fn default_staleness_secs() -> u64 {
    30
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

fn default_monitor_interval_secs() -> u64 {
    60
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            staleness_secs: default_staleness_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            monitor_interval_secs: default_monitor_interval_secs(),
        }
    }
}

impl HealthSection {
    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn monitor_interval(&self) -> Option<Duration> {
        (self.monitor_interval_secs > 0)
            .then(|| Duration::from_secs(self.monitor_interval_secs))
    }
}

/// Root federation section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Remote modules this host composes.
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
    /// Library versions the host offers to remotes, `library -> version`.
    #[serde(default)]
    pub shared: HashMap<String, String>,
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub health: HealthSection,
}

impl FederationConfig {
    /// Validate the declarations and turn them into descriptors.
    pub fn descriptors(&self) -> Result<Vec<ModuleDescriptor>, ConfigError> {
        let mut seen: HashMap<&str, ()> = HashMap::new();
        let mut descriptors = Vec::with_capacity(self.modules.len());

        for entry in &self.modules {
            if seen.insert(entry.id.as_str(), ()).is_some() {
                return Err(ConfigError::DuplicateModuleId {
                    id: entry.id.clone(),
                });
            }
            let url = Url::parse(&entry.url).map_err(|e| ConfigError::InvalidUrl {
                id: entry.id.clone(),
                url: entry.url.clone(),
                reason: e.to_string(),
            })?;

            let mut descriptor =
                ModuleDescriptor::new(&entry.id, url, &entry.scope, &entry.exposed_module);
            if let Some(name) = &entry.name {
                descriptor = descriptor.with_name(name);
            }
            if let Some(description) = &entry.description {
                descriptor = descriptor.with_description(description);
            }
            if !entry.required_permissions.is_empty() {
                descriptor = descriptor.with_permissions(entry.required_permissions.clone());
            }
            descriptors.push(descriptor);
        }
        Ok(descriptors)
    }

    pub fn shared_scope(&self) -> SharedScope {
        SharedScope::from_versions(&self.shared)
    }
}
