//! Idempotent, timeout-bounded loading of remote entries.
//!
//! One distinct URL is executed at most once per session. Concurrent and
//! later callers of [`ScriptLoader::load`] share the same in-flight future
//! and observe the same settled outcome, success or failure, until the URL
//! is explicitly evicted (the module loader does that on unload so a retry
//! starts clean).
//!
//! "Executing" an entry is delegated to a [`RemoteEntry`] implementation:
//! HTTP in production ([`crate::http::HttpTransport`]), fakes in tests.
//! Whatever the implementation, a successful execution must leave the
//! remote's container registered in the [`ContainerNamespace`].

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::ScriptError;
use crate::namespace::ContainerNamespace;

/// Fetches and executes one remote entry, registering its container.
#[async_trait::async_trait]
pub trait RemoteEntry: Send + Sync {
    async fn execute(&self, url: &Url, namespace: &ContainerNamespace) -> Result<(), ScriptError>;
}

type EntryFuture = Shared<BoxFuture<'static, Result<(), ScriptError>>>;

/// Per-URL once semantics over a [`RemoteEntry`].
pub struct ScriptLoader {
    entry: Arc<dyn RemoteEntry>,
    namespace: Arc<ContainerNamespace>,
    timeout: Duration,
    requested: DashMap<String, EntryFuture>,
}

impl ScriptLoader {
    pub fn new(
        entry: Arc<dyn RemoteEntry>,
        namespace: Arc<ContainerNamespace>,
        timeout: Duration,
    ) -> Self {
        Self {
            entry,
            namespace,
            timeout,
            requested: DashMap::new(),
        }
    }

    /// Execute the entry at `url`, or join the execution already requested
    /// for it. The returned outcome is shared by every caller of the same
    /// URL until [`evict`](Self::evict).
    pub async fn load(&self, url: &Url) -> Result<(), ScriptError> {
        let fut = self
            .requested
            .entry(url.to_string())
            .or_insert_with(|| self.begin(url))
            .value()
            .clone();
        fut.await
    }

    /// Forget the settled (or in-flight) outcome for `url`. The next `load`
    /// starts a fresh execution; an evicted in-flight execution still runs
    /// to completion for its current waiters.
    pub fn evict(&self, url: &Url) {
        if self.requested.remove(url.as_str()).is_some() {
            tracing::debug!(%url, "script cache entry evicted");
        }
    }

    /// Whether `url` has been requested this session (pure query).
    pub fn is_requested(&self, url: &Url) -> bool {
        self.requested.contains_key(url.as_str())
    }

    fn begin(&self, url: &Url) -> EntryFuture {
        let entry = Arc::clone(&self.entry);
        let namespace = Arc::clone(&self.namespace);
        let timeout = self.timeout;
        let url = url.clone();

        async move {
            tracing::debug!(%url, "loading remote entry");
            match tokio::time::timeout(timeout, entry.execute(&url, &namespace)).await {
                Ok(Ok(())) => {
                    tracing::info!(%url, "remote entry loaded");
                    Ok(())
                }
                Ok(Err(e)) => {
                    tracing::warn!(%url, error = %e, "remote entry failed to load");
                    Err(e)
                }
                Err(_) => {
                    tracing::warn!(%url, ?timeout, "remote entry load timed out");
                    Err(ScriptError::Timeout {
                        url: url.to_string(),
                        after: timeout,
                    })
                }
            }
        }
        .boxed()
        .shared()
    }
}
