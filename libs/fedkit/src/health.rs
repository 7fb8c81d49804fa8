//! Reachability probing for remote modules.
//!
//! A health probe is a lightweight existence check (HEAD) against a
//! module's entry URL, independent of whether the module ever went through
//! the loader. Results are cached per module id and expire after a
//! staleness window; a stale record is treated as absent and forces a
//! re-probe. Probes are bounded by a timeout so an unresponsive remote
//! yields an unhealthy record instead of a hung future.

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::registry::ModuleRegistry;

/// Issues one existence probe. HTTP HEAD in production, fakes in tests.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Resolve with the response status, or a human-readable failure cause.
    async fn probe(&self, url: &Url) -> Result<http::StatusCode, String>;
}

/// Point-in-time reachability result for one module.
#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub module_id: String,
    pub name: String,
    pub url: String,
    pub healthy: bool,
    pub latency: Duration,
    pub error: Option<String>,
    pub checked_at: Instant,
}

impl HealthRecord {
    pub fn age(&self) -> Duration {
        self.checked_at.elapsed()
    }
}

/// Tuning knobs for the checker.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Cached records older than this are not served; default 30 s.
    pub staleness: Duration,
    /// Upper bound for one probe; default 5 s.
    pub probe_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            staleness: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Error from [`HealthChecker::check`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum HealthError {
    #[error("module '{id}' is not registered")]
    UnknownModule { id: String },
}

/// Probes module reachability with a staleness-bounded cache.
pub struct HealthChecker {
    registry: Arc<ModuleRegistry>,
    transport: Arc<dyn ProbeTransport>,
    config: HealthConfig,
    cache: Mutex<HashMap<String, HealthRecord>>,
}

impl HealthChecker {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        transport: Arc<dyn ProbeTransport>,
        config: HealthConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Health of one module, from cache when fresh, probing otherwise.
    pub async fn check(&self, id: &str) -> Result<HealthRecord, HealthError> {
        let descriptor = self
            .registry
            .get(id)
            .ok_or_else(|| HealthError::UnknownModule { id: id.to_owned() })?;

        if let Some(cached) = self.fresh_cached(id) {
            return Ok(cached);
        }

        let started = Instant::now();
        let outcome =
            tokio::time::timeout(self.config.probe_timeout, self.transport.probe(&descriptor.entry_url))
                .await;
        let latency = started.elapsed();

        let (healthy, error) = match outcome {
            Ok(Ok(status)) if !status.is_client_error() && !status.is_server_error() => {
                (true, None)
            }
            Ok(Ok(status)) => (false, Some(format!("HTTP {status}"))),
            Ok(Err(cause)) => (false, Some(cause)),
            Err(_) => (
                false,
                Some(format!(
                    "no response within {:?}",
                    self.config.probe_timeout
                )),
            ),
        };

        let record = HealthRecord {
            module_id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            url: descriptor.entry_url.to_string(),
            healthy,
            latency,
            error,
            checked_at: Instant::now(),
        };
        if record.healthy {
            tracing::debug!(module = %id, ?latency, "module healthy");
        } else {
            tracing::debug!(module = %id, error = ?record.error, "module unhealthy");
        }
        self.cache.lock().insert(id.to_owned(), record.clone());
        Ok(record)
    }

    /// Probe every registered module concurrently. Individual probe
    /// failures become unhealthy records; the batch never aborts.
    pub async fn check_all(&self) -> Vec<HealthRecord> {
        let descriptors = self.registry.list();
        let probes = descriptors.iter().map(|d| self.check(&d.id));
        join_all(probes)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect()
    }

    fn fresh_cached(&self, id: &str) -> Option<HealthRecord> {
        let cache = self.cache.lock();
        let record = cache.get(id)?;
        (record.age() <= self.config.staleness).then(|| record.clone())
    }

    /// Run `check_all` on a fixed interval in the background, logging
    /// modules that cross between healthy and unhealthy. The returned
    /// handle must be stopped (or dropped) to avoid leaking the timer.
    pub fn spawn_monitor(self: &Arc<Self>, interval: Duration) -> MonitorHandle {
        let checker = Arc::clone(self);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last_healthy: HashMap<String, bool> = HashMap::new();

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                for record in checker.check_all().await {
                    let was = last_healthy.insert(record.module_id.clone(), record.healthy);
                    match (was, record.healthy) {
                        (Some(true), false) => tracing::warn!(
                            module = %record.module_id,
                            error = ?record.error,
                            "module became unhealthy"
                        ),
                        (Some(false), true) => tracing::info!(
                            module = %record.module_id,
                            "module recovered"
                        ),
                        _ => {}
                    }
                }
            }
            tracing::debug!("health monitor stopped");
        });

        MonitorHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// Stops the periodic monitor when asked, or when dropped.
pub struct MonitorHandle {
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for the monitor task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Ordered remediation text for a set of unhealthy modules. Pure; derives
/// everything from the record's URL port and the `<id>-module` directory
/// naming convention.
pub fn setup_instructions(unhealthy: &[HealthRecord]) -> Vec<String> {
    let mut lines = Vec::new();
    for record in unhealthy.iter().filter(|r| !r.healthy) {
        let port = Url::parse(&record.url)
            .ok()
            .and_then(|u| u.port_or_known_default());
        match port {
            Some(port) => lines.push(format!(
                "{} is unreachable at {}, start it from ./{}-module on port {}",
                record.name, record.url, record.module_id, port
            )),
            None => lines.push(format!(
                "{} is unreachable at {}, start it from ./{}-module",
                record.name, record.url, record.module_id
            )),
        }
        if let Some(error) = &record.error {
            lines.push(format!("  last error: {error}"));
        }
    }
    lines
}
