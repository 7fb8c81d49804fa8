//! Per-slot error boundary around one rendered remote module.
//!
//! A slot isolates the failure of its module from every sibling and from
//! the host shell. Its state machine is `Ok → Error → Ok`: entering the
//! error state best-effort triggers a health check for diagnostics, and the
//! only ways back are an explicit retry (which discards the module's cached
//! state first) or re-pointing the slot at a different module. There is no
//! terminal "give up" state.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::contracts::{RenderedView, RunContext};
use crate::health::{self, HealthChecker};
use crate::loader::ModuleLoader;

/// What a slot produces for its region of the page.
#[derive(Debug, Clone)]
pub enum SlotView {
    Rendered(RenderedView),
    /// Inline diagnostic panel shown instead of the module.
    Fallback {
        module_id: String,
        error: String,
        /// Remediation lines, present once the background health check
        /// finished and found the remote unreachable.
        instructions: Vec<String>,
        /// True while the background health check is still running.
        checking: bool,
    },
}

impl SlotView {
    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered(_))
    }
}

#[derive(Debug, Clone)]
enum State {
    Ok,
    Error {
        error: String,
        instructions: Vec<String>,
        checking: bool,
    },
}

/// One mount point for a remote module inside the host shell.
pub struct ModuleSlot {
    loader: Arc<ModuleLoader>,
    health: Arc<HealthChecker>,
    inner: Mutex<Inner>,
}

struct Inner {
    module_id: String,
    state: State,
}

impl ModuleSlot {
    pub fn new(
        module_id: impl Into<String>,
        loader: Arc<ModuleLoader>,
        health: Arc<HealthChecker>,
    ) -> Arc<Self> {
        Arc::new(Self {
            loader,
            health,
            inner: Mutex::new(Inner {
                module_id: module_id.into(),
                state: State::Ok,
            }),
        })
    }

    pub fn module_id(&self) -> String {
        self.inner.lock().module_id.clone()
    }

    /// Point the slot at a different module. Switching away from a failed
    /// module must not carry its error state over, so the state resets.
    pub fn set_module(self: &Arc<Self>, module_id: impl Into<String>) {
        let module_id = module_id.into();
        let mut inner = self.inner.lock();
        if inner.module_id != module_id {
            inner.module_id = module_id;
            inner.state = State::Ok;
        }
    }

    /// Render the module, or the fallback panel when the slot is in the
    /// error state. Load and render failures flip the slot into the error
    /// state; they never propagate.
    pub async fn render(self: &Arc<Self>, ctx: &RunContext) -> SlotView {
        let module_id = {
            let inner = self.inner.lock();
            if let State::Error { .. } = &inner.state {
                return self.fallback_view(&inner);
            }
            inner.module_id.clone()
        };

        let attempt = async {
            let module = self
                .loader
                .load(&module_id)
                .await
                .map_err(|e| e.to_string())?;
            module
                .component
                .render(ctx)
                .await
                .map_err(|e| e.to_string())
        };

        match attempt.await {
            Ok(view) => SlotView::Rendered(view),
            Err(error) => {
                tracing::warn!(module = %module_id, %error, "slot entering error state");
                self.enter_error(&module_id, error);
                self.fallback_view(&self.inner.lock())
            }
        }
    }

    /// Discard the module's cached state and re-attempt from a clean slate.
    pub async fn retry(self: &Arc<Self>, ctx: &RunContext) -> SlotView {
        let module_id = {
            let mut inner = self.inner.lock();
            inner.state = State::Ok;
            inner.module_id.clone()
        };
        tracing::info!(module = %module_id, "slot retry requested");
        self.loader.unload(&module_id);
        self.render(ctx).await
    }

    /// Current fallback view, if the slot is in the error state.
    pub fn error_view(&self) -> Option<SlotView> {
        let inner = self.inner.lock();
        match &inner.state {
            State::Ok => None,
            State::Error { .. } => Some(self.fallback_view(&inner)),
        }
    }

    fn fallback_view(&self, inner: &Inner) -> SlotView {
        match &inner.state {
            State::Ok => SlotView::Fallback {
                module_id: inner.module_id.clone(),
                error: String::new(),
                instructions: Vec::new(),
                checking: false,
            },
            State::Error {
                error,
                instructions,
                checking,
            } => SlotView::Fallback {
                module_id: inner.module_id.clone(),
                error: error.clone(),
                instructions: instructions.clone(),
                checking: *checking,
            },
        }
    }

    fn enter_error(self: &Arc<Self>, module_id: &str, error: String) {
        {
            let mut inner = self.inner.lock();
            // The slot may have been re-pointed while the attempt ran.
            if inner.module_id != module_id {
                return;
            }
            inner.state = State::Error {
                error,
                instructions: Vec::new(),
                checking: true,
            };
        }

        // Best-effort diagnostics: the health check's own failure must not
        // affect the slot.
        let slot = Arc::clone(self);
        let id = module_id.to_owned();
        tokio::spawn(async move {
            let instructions = match slot.health.check(&id).await {
                Ok(record) if !record.healthy => health::setup_instructions(&[record]),
                Ok(_) => Vec::new(),
                Err(error) => {
                    tracing::debug!(module = %id, %error, "diagnostic health check failed");
                    Vec::new()
                }
            };

            let mut inner = slot.inner.lock();
            if inner.module_id != id {
                return;
            }
            if let State::Error {
                instructions: slot_instructions,
                checking,
                ..
            } = &mut inner.state
            {
                *slot_instructions = instructions;
                *checking = false;
            }
        });
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::bridge::ContainerBridge;
    use crate::contracts::{
        ComponentFactory, FnComponent, RemoteContainer, RunContext,
    };
    use crate::descriptor::ModuleDescriptor;
    use crate::error::{ComponentError, ContainerError, ScriptError};
    use crate::health::{HealthConfig, ProbeTransport};
    use crate::loader::LoadState;
    use crate::namespace::ContainerNamespace;
    use crate::registry::ModuleRegistry;
    use crate::script::{RemoteEntry, ScriptLoader};
    use crate::shared_scope::SharedScope;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use url::Url;

    /// Container whose component renders, or fails, based on whether its
    /// own scope is marked broken, so tests can break and fix one remote
    /// without touching the others.
    struct FlaggedContainer {
        scope: String,
        broken: Arc<Mutex<HashSet<String>>>,
    }

    #[async_trait]
    impl RemoteContainer for FlaggedContainer {
        async fn init(&self, _shared: &SharedScope) -> Result<(), ContainerError> {
            Ok(())
        }

        fn get(&self, _exposed_path: &str) -> Result<ComponentFactory, ContainerError> {
            let scope = self.scope.clone();
            let broken = self.broken.clone();
            Ok(Box::new(move || {
                let scope = scope.clone();
                let broken = broken.clone();
                Ok(Arc::new(FnComponent::new("app", move |_| {
                    if broken.lock().contains(&scope) {
                        Err(ComponentError::new("app", "boom"))
                    } else {
                        Ok(crate::contracts::RenderedView {
                            component: "app".into(),
                            html: "<p>ok</p>".into(),
                        })
                    }
                })))
            }))
        }
    }

    struct FlaggedEntry {
        broken: Arc<Mutex<HashSet<String>>>,
        down: Arc<AtomicBool>,
    }

    #[async_trait]
    impl RemoteEntry for FlaggedEntry {
        async fn execute(
            &self,
            url: &Url,
            namespace: &ContainerNamespace,
        ) -> Result<(), ScriptError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(ScriptError::Fetch {
                    url: url.to_string(),
                    reason: "connection refused".into(),
                });
            }
            let scope = url
                .path_segments()
                .and_then(|mut s| s.next().map(str::to_owned))
                .unwrap_or_default();
            namespace.register(
                scope.clone(),
                Arc::new(FlaggedContainer {
                    scope,
                    broken: self.broken.clone(),
                }),
            );
            Ok(())
        }
    }

    struct AlwaysUp;

    #[async_trait]
    impl ProbeTransport for AlwaysUp {
        async fn probe(&self, _url: &Url) -> Result<http::StatusCode, String> {
            Ok(http::StatusCode::OK)
        }
    }

    struct AlwaysDown;

    #[async_trait]
    impl ProbeTransport for AlwaysDown {
        async fn probe(&self, _url: &Url) -> Result<http::StatusCode, String> {
            Err("connection refused".into())
        }
    }

    struct Fixture {
        loader: Arc<ModuleLoader>,
        health: Arc<HealthChecker>,
        broken: Arc<Mutex<HashSet<String>>>,
        down: Arc<AtomicBool>,
    }

    impl Fixture {
        fn break_module(&self, id: &str) {
            self.broken.lock().insert(id.to_owned());
        }

        fn fix_module(&self, id: &str) {
            self.broken.lock().remove(id);
        }
    }

    fn fixture(probe: Arc<dyn ProbeTransport>) -> Fixture {
        let broken = Arc::new(Mutex::new(HashSet::new()));
        let down = Arc::new(AtomicBool::new(false));

        let namespace = Arc::new(ContainerNamespace::new());
        let scripts = Arc::new(ScriptLoader::new(
            Arc::new(FlaggedEntry {
                broken: broken.clone(),
                down: down.clone(),
            }),
            namespace.clone(),
            Duration::from_secs(5),
        ));
        let bridge = Arc::new(ContainerBridge::new(
            scripts,
            namespace,
            Arc::new(SharedScope::new()),
        ));

        let registry = Arc::new(ModuleRegistry::new());
        for (id, port) in [("inventory", 4304), ("crm", 4301)] {
            let url =
                Url::parse(&format!("http://localhost:{port}/{id}/remote-entry.json")).unwrap();
            registry.register(ModuleDescriptor::new(id, url, id, "./App"));
        }

        let loader = Arc::new(ModuleLoader::new(registry.clone(), bridge));
        let health = Arc::new(HealthChecker::new(
            registry,
            probe,
            HealthConfig {
                staleness: Duration::from_secs(30),
                probe_timeout: Duration::from_millis(200),
            },
        ));

        Fixture {
            loader,
            health,
            broken,
            down,
        }
    }

    fn ctx() -> RunContext {
        RunContext::embedded("/modules/inventory")
    }

    #[tokio::test]
    async fn healthy_module_renders() {
        let f = fixture(Arc::new(AlwaysUp));
        let slot = ModuleSlot::new("inventory", f.loader.clone(), f.health.clone());

        let view = slot.render(&ctx()).await;
        assert!(view.is_rendered());
    }

    #[tokio::test]
    async fn render_failure_flips_to_fallback_and_retry_recovers() {
        let f = fixture(Arc::new(AlwaysUp));
        f.break_module("inventory");
        let slot = ModuleSlot::new("inventory", f.loader.clone(), f.health.clone());

        let view = slot.render(&ctx()).await;
        let SlotView::Fallback { error, .. } = view else {
            panic!("expected fallback");
        };
        assert!(error.contains("boom"));

        // Fix the remote, then retry: the slot must unload before loading.
        f.fix_module("inventory");
        let view = slot.retry(&ctx()).await;
        assert!(view.is_rendered());
        assert_eq!(f.loader.state("inventory"), LoadState::Loaded);
    }

    #[tokio::test]
    async fn error_state_sticks_until_retry() {
        let f = fixture(Arc::new(AlwaysUp));
        f.down.store(true, Ordering::SeqCst);
        let slot = ModuleSlot::new("inventory", f.loader.clone(), f.health.clone());

        assert!(!slot.render(&ctx()).await.is_rendered());
        // Remote comes back, but without a retry the slot stays in error.
        f.down.store(false, Ordering::SeqCst);
        assert!(!slot.render(&ctx()).await.is_rendered());
        assert!(slot.retry(&ctx()).await.is_rendered());
    }

    #[tokio::test]
    async fn unreachable_module_gets_setup_instructions() {
        let f = fixture(Arc::new(AlwaysDown));
        f.down.store(true, Ordering::SeqCst);
        let slot = ModuleSlot::new("inventory", f.loader.clone(), f.health.clone());

        slot.render(&ctx()).await;

        // Give the background health check a moment to settle.
        let mut instructions = Vec::new();
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if let Some(SlotView::Fallback {
                instructions: found,
                checking: false,
                ..
            }) = slot.error_view()
            {
                instructions = found;
                break;
            }
        }
        assert!(
            instructions.iter().any(|l| l.contains("./inventory-module")),
            "diagnostics should point at the module directory, got {instructions:?}"
        );
    }

    #[tokio::test]
    async fn failures_are_isolated_between_slots() {
        let f = fixture(Arc::new(AlwaysUp));
        let failing = ModuleSlot::new("inventory", f.loader.clone(), f.health.clone());
        let healthy = ModuleSlot::new("crm", f.loader.clone(), f.health.clone());

        // Load crm first so inventory's failure cannot interfere.
        let crm_before = healthy.render(&ctx()).await;
        f.break_module("inventory");
        f.loader.unload("inventory");
        assert!(!failing.render(&ctx()).await.is_rendered());

        let crm_after = healthy.render(&ctx()).await;
        assert!(crm_before.is_rendered() && crm_after.is_rendered());
        assert!(healthy.error_view().is_none());
    }

    #[tokio::test]
    async fn repointing_the_slot_clears_error_state() {
        let f = fixture(Arc::new(AlwaysUp));
        f.down.store(true, Ordering::SeqCst);
        let slot = ModuleSlot::new("inventory", f.loader.clone(), f.health.clone());

        assert!(!slot.render(&ctx()).await.is_rendered());
        assert!(slot.error_view().is_some());

        f.down.store(false, Ordering::SeqCst);
        slot.set_module("crm");
        assert!(slot.error_view().is_none(), "stale error must not carry over");
        assert!(slot.render(&ctx()).await.is_rendered());
    }
}
