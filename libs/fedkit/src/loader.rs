//! Module loader cache: each logical module loads at most once per session.
//!
//! The de-duplication invariant lives here: for any number of concurrent
//! `load` calls for the same id, exactly one bridge load runs and every
//! caller settles with the same outcome. Correctness relies on performing
//! the check-state/insert-`Loading` transition inside one synchronous lock
//! section before the first await; after that the in-flight future is
//! shared.
//!
//! There is no cancellation: a started load always runs to completion or
//! failure. Retry is discard-and-restart: [`ModuleLoader::unload`] drops
//! the cached entry (and the descriptor's script-cache entry), and the next
//! `load` starts fresh. A failed entry stays failed until unloaded, so
//! callers see a stable outcome instead of accidental retry storms.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::bridge::ContainerBridge;
use crate::contracts::LoadedModule;
use crate::error::LoadError;
use crate::registry::ModuleRegistry;

/// Pure view of a cache entry's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

type LoadFuture = Shared<BoxFuture<'static, Result<LoadedModule, LoadError>>>;

enum Entry {
    Loading { generation: u64, fut: LoadFuture },
    Loaded(LoadedModule),
    Failed(LoadError),
}

type EntryMap = Arc<Mutex<HashMap<String, Entry>>>;

/// Session-wide cache in front of the [`ContainerBridge`].
pub struct ModuleLoader {
    registry: Arc<ModuleRegistry>,
    bridge: Arc<ContainerBridge>,
    entries: EntryMap,
    generations: AtomicU64,
}

impl ModuleLoader {
    pub fn new(registry: Arc<ModuleRegistry>, bridge: Arc<ContainerBridge>) -> Self {
        Self {
            registry,
            bridge,
            entries: Arc::new(Mutex::new(HashMap::new())),
            generations: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Load `id`, joining an in-flight load or returning the cached
    /// outcome. See the module docs for the exact semantics per state.
    pub async fn load(&self, id: &str) -> Result<LoadedModule, LoadError> {
        // Single synchronous section: observe the state and, if absent,
        // install the Loading entry before anything yields.
        let fut = {
            let mut entries = self.entries.lock();
            match entries.get(id) {
                Some(Entry::Loaded(module)) => return Ok(module.clone()),
                Some(Entry::Failed(error)) => return Err(error.clone()),
                Some(Entry::Loading { fut, .. }) => fut.clone(),
                None => {
                    let Some(descriptor) = self.registry.get(id) else {
                        return Err(LoadError::UnknownModule { id: id.to_owned() });
                    };
                    let generation = self.generations.fetch_add(1, Ordering::Relaxed);
                    let fut = self.begin(id.to_owned(), generation, descriptor);
                    entries.insert(
                        id.to_owned(),
                        Entry::Loading {
                            generation,
                            fut: fut.clone(),
                        },
                    );
                    fut
                }
            }
        };
        fut.await
    }

    /// Discard the cached entry for `id`, whatever its state, and evict the
    /// descriptor's entry URL from the script cache. The next `load` starts
    /// a brand-new attempt; an in-flight load keeps running for its current
    /// waiters but can no longer write its outcome back.
    pub fn unload(&self, id: &str) {
        let removed = self.entries.lock().remove(id);
        if removed.is_some() {
            tracing::info!(module = id, "module unloaded");
        }
        if let Some(descriptor) = self.registry.get(id) {
            self.bridge.scripts().evict(&descriptor.entry_url);
        }
    }

    /// Pure state query with no side effects.
    pub fn state(&self, id: &str) -> LoadState {
        match self.entries.lock().get(id) {
            None => LoadState::Unloaded,
            Some(Entry::Loading { .. }) => LoadState::Loading,
            Some(Entry::Loaded(_)) => LoadState::Loaded,
            Some(Entry::Failed(_)) => LoadState::Failed,
        }
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.state(id) == LoadState::Loaded
    }

    fn begin(
        &self,
        id: String,
        generation: u64,
        descriptor: crate::descriptor::ModuleDescriptor,
    ) -> LoadFuture {
        let bridge = Arc::clone(&self.bridge);
        let entries = Arc::clone(&self.entries);

        async move {
            let result: Result<LoadedModule, LoadError> = async {
                let factory = bridge.load_remote(&descriptor).await?;
                let component = factory().map_err(|e| LoadError::Factory {
                    scope: descriptor.scope.clone(),
                    path: descriptor.exposed_module.clone(),
                    reason: e.to_string(),
                })?;
                Ok(LoadedModule {
                    id: id.clone(),
                    component,
                })
            }
            .await;

            // Write the outcome back only if this attempt still owns the
            // entry; an unload during the flight discards it for good.
            let mut entries = entries.lock();
            let still_current = matches!(
                entries.get(&id),
                Some(Entry::Loading { generation: g, .. }) if *g == generation
            );
            if still_current {
                match &result {
                    Ok(module) => {
                        tracing::info!(module = %id, "module loaded");
                        entries.insert(id.clone(), Entry::Loaded(module.clone()));
                    }
                    Err(error) => {
                        tracing::warn!(module = %id, %error, "module failed to load");
                        entries.insert(id.clone(), Entry::Failed(error.clone()));
                    }
                }
            } else {
                tracing::debug!(module = %id, "load outcome discarded (entry was unloaded mid-flight)");
            }
            drop(entries);

            result
        }
        .boxed()
        .shared()
    }
}
