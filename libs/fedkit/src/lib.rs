#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Runtime module federation for composable hosts
//!
//! A host shell composes modules that are built and deployed
//! independently and discovered only at runtime. This crate provides the
//! load chain that makes that safe:
//! - A registry of module descriptors (id, entry URL, scope, exposed path)
//! - Idempotent remote entry execution with per-URL once semantics
//! - A container bridge running the shared-dependency handshake
//! - A de-duplicating module loader that caches outcomes per module id
//! - Reachability checks with a staleness-bounded cache and a background
//!   monitor
//! - Slots that isolate one module's failure from its siblings and offer
//!   retry with a fresh load
//!
//! Containers register into an explicit [`ContainerNamespace`] owned by
//! the host; nothing global is mutated, and two runtimes in one process
//! cannot observe each other's remotes.
//!
//! # Example
//!
//! ```ignore
//! use fedkit::{Federation, FederationConfig, RunContext};
//!
//! let config: FederationConfig = load_from_somewhere()?;
//! let federation = Federation::builder(config).build()?;
//!
//! federation.preloader().preload_all().await;
//!
//! let slot = federation.slot("crm");
//! let view = slot.render(&RunContext::embedded("/modules/crm")).await;
//! ```

mod bridge;
mod config;
mod contracts;
mod descriptor;
mod error;
mod health;
mod http;
mod loader;
mod manifest;
mod namespace;
mod preload;
mod registry;
mod runtime;
mod script;
mod shared_scope;
mod slot;

pub use bridge::ContainerBridge;
pub use config::{ConfigError, FederationConfig, HealthSection, LoadConfig, ModuleEntry};
pub use contracts::{
    ComponentFactory, FnComponent, LoadedModule, ModuleComponent, RemoteContainer, RenderedView,
    RunContext, RunMode,
};
pub use descriptor::ModuleDescriptor;
pub use error::{ComponentError, ContainerError, LoadError, ScriptError};
pub use health::{
    HealthChecker, HealthConfig, HealthError, HealthRecord, MonitorHandle, ProbeTransport,
    setup_instructions,
};
pub use http::HttpTransport;
pub use loader::{LoadState, ModuleLoader};
pub use manifest::{
    ExposeDefinition, FragmentComponent, FragmentFetcher, ManifestContainer, RemoteEntryManifest,
};
pub use namespace::ContainerNamespace;
pub use preload::Preloader;
pub use registry::ModuleRegistry;
pub use runtime::{Federation, FederationBuilder};
pub use script::{RemoteEntry, ScriptLoader};
pub use shared_scope::{SharedLibrary, SharedScope, version_compatible};
pub use slot::{ModuleSlot, SlotView};
