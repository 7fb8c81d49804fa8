//! Contracts between the host and independently deployed remote modules.
//!
//! A remote's shape is unknown until runtime, so its contract is kept as
//! narrow as possible: a container is "a thing with `init` and `get`".
//! Any deviation surfaces as a [`ContainerError`] and is mapped to a
//! protocol-class [`crate::error::LoadError`] by the bridge, never a crash.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{ComponentError, ContainerError};
use crate::shared_scope::SharedScope;

/// Zero-argument factory handed out by a container for one exposed path.
pub type ComponentFactory =
    Box<dyn Fn() -> Result<Arc<dyn ModuleComponent>, ContainerError> + Send + Sync>;

/// The object a remote entry registers under its federation scope.
#[async_trait]
pub trait RemoteContainer: Send + Sync {
    /// Shared-dependency handshake: the host offers the library versions it
    /// carries, the remote validates it can reuse them instead of bundling
    /// duplicates. Must run before any `get`.
    async fn init(&self, shared: &SharedScope) -> Result<(), ContainerError>;

    /// Factory for one exposed module path (e.g. `./App`).
    fn get(&self, exposed_path: &str) -> Result<ComponentFactory, ContainerError>;
}

/// Whether a module runs on its own or inside the host shell.
///
/// Passed explicitly instead of letting modules sniff their serving origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Standalone,
    Embedded,
}

/// Render context the host hands to every component.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub mode: RunMode,
    /// Path prefix the host mounts the module under, if any.
    pub basename: Option<String>,
}

impl RunContext {
    pub fn embedded(basename: impl Into<String>) -> Self {
        Self {
            mode: RunMode::Embedded,
            basename: Some(basename.into()),
        }
    }

    pub fn standalone() -> Self {
        Self {
            mode: RunMode::Standalone,
            basename: None,
        }
    }
}

/// Output of one successful component render.
#[derive(Debug, Clone)]
pub struct RenderedView {
    /// Component name, for the slot chrome.
    pub component: String,
    /// Markup body to place into the slot.
    pub html: String,
}

/// The top-level component a remote module exposes.
#[async_trait]
pub trait ModuleComponent: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the component's view. Failures here are render failures:
    /// they are caught by the slot, not by the loader cache.
    async fn render(&self, ctx: &RunContext) -> Result<RenderedView, ComponentError>;
}

/// A fully loaded module: the cached outcome of one load chain.
#[derive(Clone)]
pub struct LoadedModule {
    pub id: String,
    pub component: Arc<dyn ModuleComponent>,
}

impl LoadedModule {
    /// True when both handles refer to the same component instance.
    pub fn same_component(&self, other: &LoadedModule) -> bool {
        Arc::ptr_eq(&self.component, &other.component)
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("id", &self.id)
            .field("component", &self.component.name())
            .finish()
    }
}

/// Convenience for containers built around plain async render functions,
/// mainly used by hosts embedding local fallback components.
pub struct FnComponent {
    name: String,
    render: Box<
        dyn Fn(&RunContext) -> Result<RenderedView, ComponentError> + Send + Sync,
    >,
}

impl FnComponent {
    pub fn new(
        name: impl Into<String>,
        render: impl Fn(&RunContext) -> Result<RenderedView, ComponentError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            render: Box::new(render),
        }
    }
}

#[async_trait]
impl ModuleComponent for FnComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn render(&self, ctx: &RunContext) -> Result<RenderedView, ComponentError> {
        (self.render)(ctx)
    }
}
