//! Manifest-backed remote containers.
//!
//! In this host, a remote entry is a JSON document describing the remote's
//! federation surface: the scope it registers under, the shared libraries
//! it requires, and the modules it exposes as server-rendered fragments.
//! [`ManifestContainer`] turns such a document into a [`RemoteContainer`]
//! whose components fetch their fragment at render time.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::contracts::{ComponentFactory, ModuleComponent, RenderedView, RunContext};
use crate::error::{ComponentError, ContainerError};
use crate::shared_scope::SharedScope;

/// Fetches one fragment's markup. HTTP in production, fakes in tests.
#[async_trait]
pub trait FragmentFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String, String>;
}

/// Wire format of a remote entry document.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEntryManifest {
    /// Scope the remote registers under; must match the descriptor.
    pub scope: String,
    /// Shared libraries the remote requires from the host,
    /// `library -> required version`.
    #[serde(default)]
    pub shared: HashMap<String, String>,
    /// Exposed modules, `path -> definition` (e.g. `"./App"`).
    pub exposes: HashMap<String, ExposeDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExposeDefinition {
    /// Component name, for slot chrome and diagnostics.
    pub name: String,
    /// Fragment location, relative to the entry URL.
    pub fragment: String,
}

impl RemoteEntryManifest {
    pub fn parse(entry_url: &Url, payload: &[u8]) -> Result<Self, String> {
        let manifest: Self = serde_json::from_slice(payload)
            .map_err(|e| format!("invalid remote entry manifest: {e}"))?;
        if manifest.exposes.is_empty() {
            return Err("remote entry manifest exposes nothing".to_owned());
        }
        // Relative fragments must resolve against the entry URL.
        for def in manifest.exposes.values() {
            entry_url
                .join(&def.fragment)
                .map_err(|e| format!("bad fragment URL '{}': {e}", def.fragment))?;
        }
        Ok(manifest)
    }
}

/// Container backed by a parsed remote entry manifest.
pub struct ManifestContainer {
    entry_url: Url,
    manifest: RemoteEntryManifest,
    fetcher: Arc<dyn FragmentFetcher>,
    fragment_timeout: Duration,
}

impl ManifestContainer {
    pub fn new(
        entry_url: Url,
        manifest: RemoteEntryManifest,
        fetcher: Arc<dyn FragmentFetcher>,
        fragment_timeout: Duration,
    ) -> Self {
        Self {
            entry_url,
            manifest,
            fetcher,
            fragment_timeout,
        }
    }

    pub fn scope(&self) -> &str {
        &self.manifest.scope
    }
}

#[async_trait]
impl crate::contracts::RemoteContainer for ManifestContainer {
    async fn init(&self, shared: &SharedScope) -> Result<(), ContainerError> {
        for (library, required) in &self.manifest.shared {
            if !shared.satisfies(library, required) {
                let provided = shared
                    .get(library)
                    .map_or_else(|| "nothing".to_owned(), |l| l.version.clone());
                return Err(ContainerError::Incompatible {
                    library: library.clone(),
                    required: required.clone(),
                    provided,
                });
            }
        }
        Ok(())
    }

    fn get(&self, exposed_path: &str) -> Result<ComponentFactory, ContainerError> {
        let Some(def) = self.manifest.exposes.get(exposed_path) else {
            let mut available: Vec<_> = self.manifest.exposes.keys().cloned().collect();
            available.sort();
            return Err(ContainerError::UnknownPath {
                path: exposed_path.to_owned(),
                available,
            });
        };

        // Validated in RemoteEntryManifest::parse, but a hand-built
        // manifest may skip that, so fail through the factory.
        let fragment_url = self.entry_url.join(&def.fragment);
        let name = def.name.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let fragment_timeout = self.fragment_timeout;

        Ok(Box::new(move || match &fragment_url {
            Ok(url) => Ok(Arc::new(FragmentComponent {
                name: name.clone(),
                fragment_url: url.clone(),
                fetcher: Arc::clone(&fetcher),
                fragment_timeout,
            })),
            Err(e) => Err(ContainerError::Handshake(format!(
                "fragment URL does not resolve: {e}"
            ))),
        }))
    }
}

/// Component rendering a server-fetched fragment.
pub struct FragmentComponent {
    name: String,
    fragment_url: Url,
    fetcher: Arc<dyn FragmentFetcher>,
    fragment_timeout: Duration,
}

#[async_trait]
impl ModuleComponent for FragmentComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn render(&self, ctx: &RunContext) -> Result<RenderedView, ComponentError> {
        let mut url = self.fragment_url.clone();
        if let Some(basename) = &ctx.basename {
            url.query_pairs_mut().append_pair("basename", basename);
        }

        // A renderer stuck on a dead remote would hold its slot forever.
        let html = tokio::time::timeout(self.fragment_timeout, self.fetcher.fetch(&url))
            .await
            .map_err(|_| {
                ComponentError::new(
                    &self.name,
                    format!("no fragment within {:?}", self.fragment_timeout),
                )
            })?
            .map_err(|reason| ComponentError::new(&self.name, reason))?;
        Ok(RenderedView {
            component: self.name.clone(),
            html,
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::contracts::RemoteContainer;

    struct StaticFetcher(&'static str);

    #[async_trait]
    impl FragmentFetcher for StaticFetcher {
        async fn fetch(&self, _url: &Url) -> Result<String, String> {
            Ok(self.0.to_owned())
        }
    }

    fn entry_url() -> Url {
        Url::parse("http://localhost:4301/remote-entry.json").unwrap()
    }

    fn manifest_json() -> &'static [u8] {
        br#"{
            "scope": "crm",
            "shared": { "react": "^18.2.0" },
            "exposes": {
                "./App": { "name": "crm-app", "fragment": "fragments/app.html" }
            }
        }"#
    }

    #[test]
    fn parses_a_valid_manifest() {
        let manifest = RemoteEntryManifest::parse(&entry_url(), manifest_json()).unwrap();
        assert_eq!(manifest.scope, "crm");
        assert_eq!(manifest.exposes["./App"].name, "crm-app");
    }

    #[test]
    fn rejects_manifest_without_exposes() {
        let err =
            RemoteEntryManifest::parse(&entry_url(), br#"{"scope":"crm","exposes":{}}"#)
                .unwrap_err();
        assert!(err.contains("exposes nothing"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(RemoteEntryManifest::parse(&entry_url(), b"<html>404</html>").is_err());
    }

    fn container(react: &str) -> (ManifestContainer, SharedScope) {
        let manifest = RemoteEntryManifest::parse(&entry_url(), manifest_json()).unwrap();
        let container = ManifestContainer::new(
            entry_url(),
            manifest,
            Arc::new(StaticFetcher("<p>crm</p>")),
            Duration::from_secs(5),
        );
        let mut scope = SharedScope::new();
        scope.provide("react", react);
        (container, scope)
    }

    #[tokio::test]
    async fn handshake_accepts_compatible_host() {
        let (container, scope) = container("18.3.1");
        assert!(container.init(&scope).await.is_ok());
    }

    #[tokio::test]
    async fn handshake_rejects_incompatible_host() {
        let (container, scope) = container("17.0.2");
        let err = container.init(&scope).await.unwrap_err();
        assert!(matches!(err, ContainerError::Incompatible { ref library, .. } if library == "react"));
    }

    #[tokio::test]
    async fn exposed_component_fetches_its_fragment() {
        let (container, _) = container("18.3.1");
        let factory = container.get("./App").unwrap();
        let component = factory().unwrap();

        let view = component
            .render(&RunContext::embedded("/modules/crm"))
            .await
            .unwrap();
        assert_eq!(view.html, "<p>crm</p>");
        assert_eq!(view.component, "crm-app");
    }

    struct HangingFetcher;

    #[async_trait]
    impl FragmentFetcher for HangingFetcher {
        async fn fetch(&self, _url: &Url) -> Result<String, String> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn render_gives_up_on_a_fragment_that_never_arrives() {
        let manifest = RemoteEntryManifest::parse(&entry_url(), manifest_json()).unwrap();
        let container = ManifestContainer::new(
            entry_url(),
            manifest,
            Arc::new(HangingFetcher),
            Duration::from_millis(200),
        );

        let factory = container.get("./App").unwrap();
        let component = factory().unwrap();
        let err = component
            .render(&RunContext::standalone())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no fragment within"));
    }

    #[test]
    fn unknown_path_lists_what_is_available() {
        let (container, _) = container("18.3.1");
        let Err(err) = container.get("./Dashboard") else {
            panic!("a path the manifest never exposed must be rejected");
        };
        let ContainerError::UnknownPath { available, .. } = err else {
            panic!("expected UnknownPath");
        };
        assert_eq!(available, vec!["./App"]);
    }
}
