//! Federation runtime assembly.
//!
//! Wires the registry, namespace, script loader, bridge, module loader,
//! health checker, and preloader into one handle a host can carry around.
//! The wiring is all the host shell needs to know about the crate's
//! internals; everything else hangs off [`Federation`] accessors.

use std::sync::Arc;
use std::time::Duration;

use crate::config::FederationConfig;
use crate::bridge::ContainerBridge;
use crate::health::{HealthChecker, HealthConfig, MonitorHandle, ProbeTransport};
use crate::http::HttpTransport;
use crate::loader::ModuleLoader;
use crate::namespace::ContainerNamespace;
use crate::preload::Preloader;
use crate::registry::ModuleRegistry;
use crate::script::{RemoteEntry, ScriptLoader};
use crate::slot::ModuleSlot;

/// Builder over [`FederationConfig`] with injectable transports.
///
/// Production hosts take the defaults (one [`HttpTransport`] serving both
/// entry execution and probing); tests swap in fakes.
pub struct FederationBuilder {
    config: FederationConfig,
    entry: Option<Arc<dyn RemoteEntry>>,
    probe: Option<Arc<dyn ProbeTransport>>,
}

impl FederationBuilder {
    pub fn from_config(config: FederationConfig) -> Self {
        Self {
            config,
            entry: None,
            probe: None,
        }
    }

    pub fn with_remote_entry(mut self, entry: Arc<dyn RemoteEntry>) -> Self {
        self.entry = Some(entry);
        self
    }

    pub fn with_probe_transport(mut self, probe: Arc<dyn ProbeTransport>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn build(self) -> anyhow::Result<Federation> {
        let Self {
            config,
            entry,
            probe,
        } = self;

        let (entry, probe) = match (entry, probe) {
            (Some(e), Some(p)) => (e, p),
            (entry, probe) => {
                let transport = Arc::new(
                    HttpTransport::new().with_fragment_timeout(config.load.fragment_timeout()),
                );
                (
                    entry.unwrap_or_else(|| transport.clone() as Arc<dyn RemoteEntry>),
                    probe.unwrap_or_else(|| transport as Arc<dyn ProbeTransport>),
                )
            }
        };

        let registry = Arc::new(ModuleRegistry::new());
        for descriptor in config.descriptors()? {
            registry.register(descriptor);
        }

        let namespace = Arc::new(ContainerNamespace::new());
        let scripts = Arc::new(ScriptLoader::new(
            entry,
            Arc::clone(&namespace),
            config.load.entry_timeout(),
        ));
        let bridge = Arc::new(ContainerBridge::new(
            scripts,
            Arc::clone(&namespace),
            Arc::new(config.shared_scope()),
        ));
        let loader = Arc::new(ModuleLoader::new(Arc::clone(&registry), bridge));
        let health = Arc::new(HealthChecker::new(
            Arc::clone(&registry),
            probe,
            HealthConfig {
                staleness: config.health.staleness(),
                probe_timeout: config.health.probe_timeout(),
            },
        ));

        tracing::info!(
            modules = registry.len(),
            shared = config.shared.len(),
            "federation runtime assembled"
        );

        Ok(Federation {
            monitor_interval: config.health.monitor_interval(),
            registry,
            namespace,
            loader,
            health,
        })
    }
}

/// Assembled federation runtime.
pub struct Federation {
    registry: Arc<ModuleRegistry>,
    namespace: Arc<ContainerNamespace>,
    loader: Arc<ModuleLoader>,
    health: Arc<HealthChecker>,
    monitor_interval: Option<Duration>,
}

impl Federation {
    pub fn builder(config: FederationConfig) -> FederationBuilder {
        FederationBuilder::from_config(config)
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn namespace(&self) -> &Arc<ContainerNamespace> {
        &self.namespace
    }

    pub fn loader(&self) -> &Arc<ModuleLoader> {
        &self.loader
    }

    pub fn health(&self) -> &Arc<HealthChecker> {
        &self.health
    }

    pub fn preloader(&self) -> Preloader {
        Preloader::new(Arc::clone(&self.loader))
    }

    /// Slot bound to `module_id`, wired to this runtime's loader and
    /// health checker.
    pub fn slot(&self, module_id: impl Into<String>) -> Arc<ModuleSlot> {
        ModuleSlot::new(module_id, Arc::clone(&self.loader), Arc::clone(&self.health))
    }

    /// Start the background health monitor if configured. Returns `None`
    /// when the monitor interval is zero.
    pub fn spawn_health_monitor(&self) -> Option<MonitorHandle> {
        self.monitor_interval
            .map(|interval| self.health.spawn_monitor(interval))
    }
}
