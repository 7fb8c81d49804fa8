//! Opportunistic warming of the module loader cache.
//!
//! Preloading is strictly best-effort: failures are logged and swallowed,
//! never surfaced to the caller. These are thin orchestration conveniences
//! over the loader and add no state of their own.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

use crate::loader::ModuleLoader;

pub struct Preloader {
    loader: Arc<ModuleLoader>,
}

impl Preloader {
    pub fn new(loader: Arc<ModuleLoader>) -> Self {
        Self { loader }
    }

    /// Warm one module; the outcome is logged, never returned.
    pub async fn preload(&self, id: &str) {
        match self.loader.load(id).await {
            Ok(_) => tracing::debug!(module = id, "preloaded"),
            Err(error) => tracing::warn!(module = id, %error, "preload failed"),
        }
    }

    /// Warm every registered module; resolves once all attempts settle,
    /// regardless of individual failures.
    pub async fn preload_all(&self) {
        let descriptors = self.loader.registry().list();
        tracing::info!(count = descriptors.len(), "preloading all modules");
        join_all(descriptors.iter().map(|d| self.preload(&d.id))).await;
    }

    /// Warm exactly the modules whose required permissions intersect
    /// `permissions`. A module with no overlap is never preloaded.
    pub async fn preload_for_permissions(&self, permissions: &HashSet<String>) {
        let matching: Vec<_> = self
            .loader
            .registry()
            .list()
            .into_iter()
            .filter(|d| {
                d.required_permissions
                    .iter()
                    .any(|p| permissions.contains(p))
            })
            .collect();
        tracing::info!(count = matching.len(), "preloading permitted modules");
        join_all(matching.iter().map(|d| self.preload(&d.id))).await;
    }
}
