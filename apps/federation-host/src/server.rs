//! Host shell HTTP surface.
//!
//! Serves the composed shell page, one route per module slot, and a small
//! JSON API for module state, health, and retry. Slots are created lazily
//! per module id and live for the lifetime of the process, so a module's
//! error state survives across requests until somebody retries it.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json};
use axum::routing::{get, post};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use fedkit::{Federation, HealthRecord, LoadState, ModuleSlot, RunContext, SlotView};

pub struct AppState {
    federation: Federation,
    slots: DashMap<String, Arc<ModuleSlot>>,
}

impl AppState {
    pub fn new(federation: Federation) -> Arc<Self> {
        Arc::new(Self {
            federation,
            slots: DashMap::new(),
        })
    }

    fn slot(&self, id: &str) -> Arc<ModuleSlot> {
        self.slots
            .entry(id.to_owned())
            .or_insert_with(|| self.federation.slot(id))
            .clone()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(shell_page))
        .route("/healthz", get(healthz))
        .route("/modules/{id}", get(module_page))
        .route("/api/modules", get(list_modules))
        .route("/api/modules/health", get(modules_health))
        .route("/api/modules/{id}/retry", post(retry_module))
        .with_state(state)
}

pub async fn serve(
    state: Arc<AppState>,
    addr: std::net::SocketAddr,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "host shell listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn shell_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let mut items = String::new();
    for descriptor in state.federation.registry().list() {
        items.push_str(&format!(
            r#"<li><a href="/modules/{id}">{name}</a> <small>{state:?}</small></li>"#,
            id = descriptor.id,
            name = escape(&descriptor.name),
            state = state.federation.loader().state(&descriptor.id),
        ));
    }
    Html(format!(
        "<!doctype html><html><head><title>Federation Host</title></head>\
         <body><h1>Federation Host</h1><ul>{items}</ul></body></html>"
    ))
}

async fn module_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.federation.registry().get(&id).is_none() {
        return (StatusCode::NOT_FOUND, Html(not_found_page(&id)));
    }

    let slot = state.slot(&id);
    let ctx = RunContext::embedded(format!("/modules/{id}"));
    let body = match slot.render(&ctx).await {
        SlotView::Rendered(view) => format!(
            r#"<article data-component="{component}">{html}</article>"#,
            component = escape(&view.component),
            html = view.html,
        ),
        SlotView::Fallback {
            module_id,
            error,
            instructions,
            checking,
        } => fallback_panel(&module_id, &error, &instructions, checking),
    };

    (
        StatusCode::OK,
        Html(format!(
            "<!doctype html><html><head><title>{id}</title></head><body>{body}</body></html>"
        )),
    )
}

fn not_found_page(id: &str) -> String {
    format!(
        "<!doctype html><html><body><h1>Unknown module</h1>\
         <p>No module '{}' is registered.</p></body></html>",
        escape(id)
    )
}

fn fallback_panel(module_id: &str, error: &str, instructions: &[String], checking: bool) -> String {
    let mut panel = format!(
        r#"<section class="module-error"><h2>{} is unavailable</h2><p>{}</p>"#,
        escape(module_id),
        escape(error),
    );
    if checking {
        panel.push_str("<p>Checking module health&hellip;</p>");
    }
    if !instructions.is_empty() {
        panel.push_str("<h3>To run this module locally:</h3><ol>");
        for line in instructions {
            panel.push_str(&format!("<li>{}</li>", escape(line)));
        }
        panel.push_str("</ol>");
    }
    panel.push_str(&format!(
        r#"<form method="post" action="/api/modules/{}/retry"><button>Retry</button></form></section>"#,
        escape(module_id)
    ));
    panel
}

/// Fragments come from remotes this host chose to trust; everything else
/// that lands in markup goes through here.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[derive(Debug, Serialize)]
struct ModuleDto {
    id: String,
    name: String,
    description: Option<String>,
    url: String,
    scope: String,
    state: &'static str,
}

fn state_label(state: LoadState) -> &'static str {
    match state {
        LoadState::Unloaded => "unloaded",
        LoadState::Loading => "loading",
        LoadState::Loaded => "loaded",
        LoadState::Failed => "failed",
    }
}

async fn list_modules(State(state): State<Arc<AppState>>) -> Json<Vec<ModuleDto>> {
    let modules = state
        .federation
        .registry()
        .list()
        .into_iter()
        .map(|d| ModuleDto {
            state: state_label(state.federation.loader().state(&d.id)),
            description: (!d.description.is_empty()).then_some(d.description),
            id: d.id,
            name: d.name,
            url: d.entry_url.to_string(),
            scope: d.scope,
        })
        .collect();
    Json(modules)
}

/// `HealthRecord` carries an `Instant`, so the API gets its own shape.
#[derive(Debug, Serialize)]
struct HealthDto {
    module_id: String,
    name: String,
    url: String,
    healthy: bool,
    latency_ms: u128,
    error: Option<String>,
    age_secs: u64,
}

impl From<HealthRecord> for HealthDto {
    fn from(record: HealthRecord) -> Self {
        Self {
            age_secs: record.age().as_secs(),
            latency_ms: record.latency.as_millis(),
            module_id: record.module_id,
            name: record.name,
            url: record.url,
            healthy: record.healthy,
            error: record.error,
        }
    }
}

async fn modules_health(State(state): State<Arc<AppState>>) -> Json<Vec<HealthDto>> {
    let records = state.federation.health().check_all().await;
    Json(records.into_iter().map(HealthDto::from).collect())
}

#[derive(Debug, Serialize)]
struct RetryDto {
    module_id: String,
    recovered: bool,
    error: Option<String>,
}

async fn retry_module(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.federation.registry().get(&id).is_none() {
        return (
            StatusCode::NOT_FOUND,
            Json(RetryDto {
                module_id: id,
                recovered: false,
                error: Some("unknown module".to_owned()),
            }),
        );
    }

    let slot = state.slot(&id);
    let ctx = RunContext::embedded(format!("/modules/{id}"));
    let view = slot.retry(&ctx).await;
    let dto = match view {
        SlotView::Rendered(_) => RetryDto {
            module_id: id,
            recovered: true,
            error: None,
        },
        SlotView::Fallback { error, .. } => RetryDto {
            module_id: id,
            recovered: false,
            error: Some(error),
        },
    };
    (StatusCode::OK, Json(dto))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fedkit::{
        ComponentFactory, ContainerError, ContainerNamespace, FederationConfig, FnComponent,
        ModuleEntry, ProbeTransport, RemoteContainer, RemoteEntry, RenderedView, ScriptError,
        SharedScope,
    };
    use std::sync::Arc;
    use tower::ServiceExt;
    use url::Url;

    struct OkContainer;

    #[async_trait]
    impl RemoteContainer for OkContainer {
        async fn init(&self, _shared: &SharedScope) -> Result<(), ContainerError> {
            Ok(())
        }

        fn get(&self, _exposed_path: &str) -> Result<ComponentFactory, ContainerError> {
            Ok(Box::new(|| {
                Ok(Arc::new(FnComponent::new("crm-app", |_| {
                    Ok(RenderedView {
                        component: "crm-app".into(),
                        html: "<p>customers</p>".into(),
                    })
                })))
            }))
        }
    }

    struct OkEntry;

    #[async_trait]
    impl RemoteEntry for OkEntry {
        async fn execute(
            &self,
            _url: &Url,
            namespace: &ContainerNamespace,
        ) -> Result<(), ScriptError> {
            namespace.register("crm", Arc::new(OkContainer));
            Ok(())
        }
    }

    struct OkProbe;

    #[async_trait]
    impl ProbeTransport for OkProbe {
        async fn probe(&self, _url: &Url) -> Result<axum::http::StatusCode, String> {
            Ok(axum::http::StatusCode::OK)
        }
    }

    fn test_state() -> Arc<AppState> {
        let config = FederationConfig {
            modules: vec![ModuleEntry {
                id: "crm".into(),
                url: "http://localhost:4301/remote-entry.json".into(),
                scope: "crm".into(),
                exposed_module: "./App".into(),
                name: Some("Customer Relations".into()),
                description: None,
                required_permissions: vec![],
            }],
            ..FederationConfig::default()
        };
        let federation = Federation::builder(config)
            .with_remote_entry(Arc::new(OkEntry))
            .with_probe_transport(Arc::new(OkProbe))
            .build()
            .expect("assembly should succeed");
        AppState::new(federation)
    }

    async fn get_body(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .body(axum::body::Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, String::from_utf8(bytes.to_vec()).expect("utf-8"))
    }

    #[tokio::test]
    async fn shell_page_lists_registered_modules() {
        let (status, body) = get_body(router(test_state()), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Customer Relations"));
        assert!(body.contains("/modules/crm"));
    }

    #[tokio::test]
    async fn module_page_renders_the_slot() {
        let (status, body) = get_body(router(test_state()), "/modules/crm").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<p>customers</p>"));
    }

    #[tokio::test]
    async fn unknown_module_is_404() {
        let (status, _) = get_body(router(test_state()), "/modules/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn module_api_reports_load_state() {
        let state = test_state();
        let (_, before) = get_body(router(state.clone()), "/api/modules").await;
        assert!(before.contains(r#""state":"unloaded""#));
        assert!(
            before.contains(r#""description":null"#),
            "an unset description must serialize as null, not an empty string"
        );

        get_body(router(state.clone()), "/modules/crm").await;
        let (_, after) = get_body(router(state), "/api/modules").await;
        assert!(after.contains(r#""state":"loaded""#));
    }

    #[tokio::test]
    async fn health_api_serializes_records() {
        let (status, body) = get_body(router(test_state()), "/api/modules/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#""healthy":true"#));
        assert!(body.contains(r#""module_id":"crm""#));
    }
}
