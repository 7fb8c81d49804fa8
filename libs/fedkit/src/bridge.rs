//! Bridge between the host and a federated remote container.
//!
//! The highest-risk integration point in the system: it depends on an
//! independently deployed remote honoring the same protocol version. Every
//! step failure maps to a distinguishable [`LoadError`] variant so
//! diagnostics can tell a dead server apart from a wrong build.

use std::sync::Arc;

use crate::contracts::ComponentFactory;
use crate::descriptor::ModuleDescriptor;
use crate::error::{ContainerError, LoadError};
use crate::namespace::ContainerNamespace;
use crate::script::ScriptLoader;
use crate::shared_scope::SharedScope;

/// Negotiates with a remote container and yields a component factory.
pub struct ContainerBridge {
    scripts: Arc<ScriptLoader>,
    namespace: Arc<ContainerNamespace>,
    shared: Arc<SharedScope>,
}

impl ContainerBridge {
    pub fn new(
        scripts: Arc<ScriptLoader>,
        namespace: Arc<ContainerNamespace>,
        shared: Arc<SharedScope>,
    ) -> Self {
        Self {
            scripts,
            namespace,
            shared,
        }
    }

    pub fn scripts(&self) -> &Arc<ScriptLoader> {
        &self.scripts
    }

    /// Run the full load sequence for one descriptor:
    /// entry execution → scope lookup → handshake → exposed-path factory.
    pub async fn load_remote(
        &self,
        descriptor: &ModuleDescriptor,
    ) -> Result<ComponentFactory, LoadError> {
        self.scripts
            .load(&descriptor.entry_url)
            .await
            .map_err(|source| LoadError::Transport {
                id: descriptor.id.clone(),
                source,
            })?;

        // The entry executed; the container must now be in the namespace.
        let container =
            self.namespace
                .get(&descriptor.scope)
                .ok_or_else(|| LoadError::ContainerMissing {
                    scope: descriptor.scope.clone(),
                    url: descriptor.entry_url.to_string(),
                })?;

        container
            .init(&self.shared)
            .await
            .map_err(|source| LoadError::Handshake {
                scope: descriptor.scope.clone(),
                source,
            })?;

        container
            .get(&descriptor.exposed_module)
            .map_err(|source| match source {
                ContainerError::UnknownPath { .. } => LoadError::UnknownExposedPath {
                    scope: descriptor.scope.clone(),
                    path: descriptor.exposed_module.clone(),
                    source,
                },
                other => LoadError::Handshake {
                    scope: descriptor.scope.clone(),
                    source: other,
                },
            })
    }
}
