//! HTTP transport for remote entries, health probes, and fragments.
//!
//! One hyper client serves all three concerns so connection reuse works
//! across the load chain: fetch the remote entry manifest, probe the
//! remote's origin, fetch fragment markup at render time.

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::ScriptError;
use crate::health::ProbeTransport;
use crate::manifest::{FragmentFetcher, ManifestContainer, RemoteEntryManifest};
use crate::namespace::ContainerNamespace;
use crate::script::RemoteEntry;

const MAX_ENTRY_BYTES: usize = 1024 * 1024;
const MAX_FRAGMENT_BYTES: usize = 4 * 1024 * 1024;
const DEFAULT_FRAGMENT_TIMEOUT: Duration = Duration::from_secs(10);

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Production transport over hyper with rustls.
///
/// Accepts plain `http://` URLs too; local development runs remotes on
/// localhost ports without certificates.
#[derive(Clone)]
pub struct HttpTransport {
    client: HttpsClient,
    fragment_timeout: Duration,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        let builder = match hyper_rustls::HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder,
            Err(e) => {
                // Minimal containers may ship without an OS trust store.
                tracing::debug!(error = %e, "native TLS roots unavailable, using bundled roots");
                hyper_rustls::HttpsConnectorBuilder::new().with_webpki_roots()
            }
        };
        let connector = builder.https_or_http().enable_http1().build();
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            fragment_timeout: DEFAULT_FRAGMENT_TIMEOUT,
        }
    }

    /// Bound render-time fragment fetches made by the containers this
    /// transport registers.
    #[must_use]
    pub fn with_fragment_timeout(mut self, timeout: Duration) -> Self {
        self.fragment_timeout = timeout;
        self
    }

    async fn fetch_bytes(
        &self,
        url: &Url,
        limit: usize,
    ) -> Result<(StatusCode, Bytes), ScriptError> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(url.as_str())
            .header(http::header::ACCEPT, "application/json, text/html")
            .body(Full::new(Bytes::new()))
            .map_err(|e| ScriptError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ScriptError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = http_body_util::Limited::new(response.into_body(), limit);
        let bytes = body
            .collect()
            .await
            .map_err(|e| ScriptError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?
            .to_bytes();
        Ok((status, bytes))
    }
}

#[async_trait]
impl RemoteEntry for HttpTransport {
    async fn execute(
        &self,
        url: &Url,
        namespace: &ContainerNamespace,
    ) -> Result<(), ScriptError> {
        let (status, bytes) = self.fetch_bytes(url, MAX_ENTRY_BYTES).await?;
        if !status.is_success() {
            return Err(ScriptError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let manifest =
            RemoteEntryManifest::parse(url, &bytes).map_err(|reason| ScriptError::Entry {
                url: url.to_string(),
                reason,
            })?;

        let scope = manifest.scope.clone();
        let container = ManifestContainer::new(
            url.clone(),
            manifest,
            Arc::new(self.clone()) as Arc<dyn FragmentFetcher>,
            self.fragment_timeout,
        );
        tracing::debug!(%url, scope = %scope, "remote entry registered its container");
        namespace.register(scope, Arc::new(container));
        Ok(())
    }
}

#[async_trait]
impl ProbeTransport for HttpTransport {
    async fn probe(&self, url: &Url) -> Result<StatusCode, String> {
        let request = Request::builder()
            .method(Method::HEAD)
            .uri(url.as_str())
            .body(Full::new(Bytes::new()))
            .map_err(|e| e.to_string())?;

        let response = self.client.request(request).await.map_err(|e| {
            // legacy::Error wraps the connect failure; surface the chain.
            let mut reason = e.to_string();
            if let Some(source) = std::error::Error::source(&e) {
                reason = format!("{reason}: {source}");
            }
            reason
        })?;
        Ok(response.status())
    }
}

#[async_trait]
impl FragmentFetcher for HttpTransport {
    async fn fetch(&self, url: &Url) -> Result<String, String> {
        let (status, bytes) = self
            .fetch_bytes(url, MAX_FRAGMENT_BYTES)
            .await
            .map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(format!("fragment returned HTTP {}", status.as_u16()));
        }
        String::from_utf8(bytes.to_vec()).map_err(|_| "fragment is not UTF-8".to_owned())
    }
}
