//! Namespace where remote entries register their containers.
//!
//! The browser original keeps this on a shared global object; here it is an
//! explicit, injected lookup table so the bridge controls it and tests can
//! fake it. Key = the federation scope name the remote registers under.
//!
//! Re-registering a scope overwrites the previous container atomically;
//! callers already holding an `Arc` keep a valid handle.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::contracts::RemoteContainer;

/// Scope-keyed table of registered remote containers.
#[derive(Default)]
pub struct ContainerNamespace {
    containers: RwLock<HashMap<String, Arc<dyn RemoteContainer>>>,
}

impl ContainerNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a container under `scope`, overwriting any previous one.
    pub fn register(&self, scope: impl Into<String>, container: Arc<dyn RemoteContainer>) {
        let scope = scope.into();
        tracing::debug!(%scope, "container registered");
        self.containers.write().insert(scope, container);
    }

    /// The container registered under `scope`, if any.
    pub fn get(&self, scope: &str) -> Option<Arc<dyn RemoteContainer>> {
        self.containers.read().get(scope).cloned()
    }

    /// Remove a container; returns it if it was present.
    pub fn remove(&self, scope: &str) -> Option<Arc<dyn RemoteContainer>> {
        self.containers.write().remove(scope)
    }

    /// Clear everything (useful in tests).
    pub fn clear(&self) {
        self.containers.write().clear();
    }

    pub fn len(&self) -> usize {
        self.containers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.read().is_empty()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::contracts::{ComponentFactory, FnComponent, RenderedView};
    use crate::error::ContainerError;
    use crate::shared_scope::SharedScope;
    use async_trait::async_trait;

    struct StubContainer(&'static str);

    #[async_trait]
    impl RemoteContainer for StubContainer {
        async fn init(&self, _shared: &SharedScope) -> Result<(), ContainerError> {
            Ok(())
        }

        fn get(&self, _exposed_path: &str) -> Result<ComponentFactory, ContainerError> {
            let label = self.0;
            Ok(Box::new(move || {
                Ok(Arc::new(FnComponent::new(label, move |_| {
                    Ok(RenderedView {
                        component: label.into(),
                        html: String::new(),
                    })
                })))
            }))
        }
    }

    #[test]
    fn register_and_get() {
        let ns = ContainerNamespace::new();
        ns.register("crm", Arc::new(StubContainer("crm")));

        assert!(ns.get("crm").is_some());
        assert!(ns.get("hr").is_none());
        assert_eq!(ns.len(), 1);
    }

    #[test]
    fn re_registering_overwrites_but_old_arcs_stay_valid() {
        let ns = ContainerNamespace::new();
        ns.register("crm", Arc::new(StubContainer("old")));
        let old = ns.get("crm").unwrap();

        ns.register("crm", Arc::new(StubContainer("new")));
        let new = ns.get("crm").unwrap();

        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(ns.len(), 1);
    }

    #[test]
    fn remove_and_clear() {
        let ns = ContainerNamespace::new();
        ns.register("crm", Arc::new(StubContainer("crm")));
        ns.register("hr", Arc::new(StubContainer("hr")));

        assert!(ns.remove("crm").is_some());
        assert!(ns.remove("crm").is_none());

        ns.clear();
        assert!(ns.is_empty());
    }
}
