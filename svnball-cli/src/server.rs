//! HTTP surface: archive links, on-demand builds and static downloads.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use svnball_engine::{
    ArchiveError, Archiver, DownloadTarget, JoinLinks, PeriodicRefresher, RefreshSummary,
    RepositoryTarget, StoreError,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    archiver: Arc<Archiver>,
    refresher: Arc<PeriodicRefresher>,
    targets: Arc<HashMap<String, DownloadTarget>>,
    mount: String,
}

impl AppState {
    pub fn new(
        archiver: Arc<Archiver>,
        refresher: Arc<PeriodicRefresher>,
        targets: HashMap<String, DownloadTarget>,
        mount: String,
    ) -> Self {
        Self {
            archiver,
            refresher,
            targets: Arc::new(targets),
            mount,
        }
    }

    fn target(&self, name: &str) -> Result<&DownloadTarget, ServerError> {
        self.targets
            .get(name)
            .ok_or_else(|| ServerError::NotFound(format!("no download named {name:?}")))
    }

    fn target_link(&self, name: &str) -> String {
        format!("{}/{name}", self.mount)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            ServerError::Archive(ArchiveError::InvalidTarget(msg)) => {
                (StatusCode::BAD_REQUEST, msg).into_response()
            }
            ServerError::Archive(e) => {
                error!(error = %e, "Archive request failed");
                let message = e.to_string();
                let detail = quick_xml::escape::escape(message.as_str());
                let page = format!(
                    "<!DOCTYPE html>\n<html><head><title>Archive unavailable</title></head>\
                     <body><h1>Archive unavailable</h1><p>The archive could not be \
                     generated.</p><pre>{detail}</pre></body></html>"
                );
                (StatusCode::INTERNAL_SERVER_ERROR, Html(page)).into_response()
            }
            ServerError::Store(e) => {
                error!(error = %e, "Revision store failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct GenerateQuery {
    /// Build this URL instead of the configured one
    pub url: Option<String>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Link target: the archive itself once built, its generate action before.
async fn show_target(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Redirect, ServerError> {
    let download = state.target(&name)?;
    let mut scope = state.archiver.scope();
    let location = state
        .archiver
        .download_url(&mut scope, download, &state.target_link(&name), &JoinLinks)
        .await?;
    Ok(Redirect::to(&location))
}

async fn generate_target(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<GenerateQuery>,
) -> Result<Redirect, ServerError> {
    let configured = state.target(&name)?;
    let download = match query.url.as_deref() {
        Some(raw) => configured.with_target(RepositoryTarget::from_untrusted(raw)?),
        None => configured.clone(),
    };

    let mut scope = state.archiver.scope();
    let generated = state.archiver.generate(&mut scope, &download).await?;
    Ok(Redirect::to(&generated.public_url))
}

async fn refresh_all(State(state): State<AppState>) -> Result<Json<RefreshSummary>, ServerError> {
    let summary = state.refresher.run_once().await?;
    Ok(Json(summary))
}

pub fn build_app(state: AppState) -> Router {
    let mount = state.mount.clone();
    let mut app = Router::new()
        .route("/healthz", get(health_check))
        .route("/refresh", post(refresh_all))
        .route(&format!("{mount}/{{target}}"), get(show_target))
        .route(&format!("{mount}/{{target}}/generate"), get(generate_target));

    let layout = state.archiver.coordinator().layout();
    match public_mount(state.archiver.public_prefix()) {
        Some(prefix) => {
            app = app.nest_service(&prefix, ServeDir::new(layout.cache_dir()));
        }
        None => warn!(
            prefix = %state.archiver.public_prefix(),
            "Public prefix is not a local path, archives must be served elsewhere"
        ),
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Local path the archives can be served under, if the public prefix is one.
fn public_mount(prefix: &str) -> Option<String> {
    let path = prefix.trim_end_matches('/');
    (path.starts_with('/') && path.len() > 1).then(|| path.to_string())
}

/// Run the HTTP server and the periodic refresher until ctrl-c.
pub async fn serve(state: AppState, bind: std::net::SocketAddr) -> Result<(), AppError> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let refresher = state.refresher.clone().spawn(shutdown_rx);

    let listener = TcpListener::bind(bind).await?;
    info!(address = %bind, mount = %state.mount, "Listening");

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("Shutting down");
        })
        .await?;

    let _ = shutdown_tx.send(());
    if let Err(e) = refresher.await {
        warn!(error = %e, "Refresher task ended abnormally");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, header};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use svnball_engine::build::{ArchivePipeline, BuildJob};
    use svnball_engine::svn::DirectoryListing;
    use svnball_engine::{
        ArchiveNamer, BuildCoordinator, BuildError, CacheLayout, InfoError, InfoSource,
        MemoryStore, RevisionCache, WaitPolicy,
    };
    use tower::ServiceExt;

    struct FixedRevision(u64);

    #[async_trait]
    impl InfoSource for FixedRevision {
        async fn latest_revision(&self, _url: &str) -> Result<u64, InfoError> {
            Ok(self.0)
        }

        async fn child_directories(&self, _url: &str) -> Result<DirectoryListing, InfoError> {
            Ok(DirectoryListing::default())
        }
    }

    #[derive(Default)]
    struct ScriptedPipeline {
        runs: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl ArchivePipeline for ScriptedPipeline {
        async fn run(&self, job: &BuildJob) -> Result<(), BuildError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(BuildError::PipelineFailed {
                    stage: svnball_engine::build::PipelineStage::Export,
                    status: svnball_engine::error::ExitStatusDisplay(Some(1)),
                    output: "svn: E170000: <path> doesn't exist".to_string(),
                });
            }
            tokio::fs::write(&job.archive_path, format!("archive of {}", job.url)).await?;
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        app: Router,
        pipeline: Arc<ScriptedPipeline>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(RevisionCache::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FixedRevision(42)),
        ));
        let pipeline = Arc::new(ScriptedPipeline::default());
        let coordinator = Arc::new(BuildCoordinator::with_layout(
            CacheLayout::new(dir.path().join("downloads"), dir.path().join("tmp")),
            pipeline.clone(),
            WaitPolicy {
                poll_interval: Duration::from_millis(5),
                max_polls: 2,
            },
        ));
        let archiver = Arc::new(Archiver::new(
            ArchiveNamer::new(cache.clone(), None),
            coordinator,
            "/assets/downloads",
        ));
        let refresher = Arc::new(PeriodicRefresher::new(cache, Duration::from_secs(3600)));

        let mut targets = HashMap::new();
        targets.insert(
            "blog".to_string(),
            DownloadTarget::new("http://svn.example.com/modules/blog/trunk"),
        );
        let state = AppState::new(archiver, refresher, targets, "/downloads".to_string());

        Fixture {
            _dir: dir,
            app: build_app(state),
            pipeline,
        }
    }

    async fn get(app: &Router, uri: &str) -> Response {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    fn location(response: &Response) -> &str {
        response.headers()[header::LOCATION].to_str().unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let f = fixture();
        let response = get(&f.app, "/healthz").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_link_redirects_to_generate_then_to_archive() {
        let f = fixture();

        let response = get(&f.app, "/downloads/blog").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/downloads/blog/generate");

        let response = get(&f.app, "/downloads/blog/generate").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/assets/downloads/blog-trunk-r42.tar.gz");

        let response = get(&f.app, "/downloads/blog").await;
        assert_eq!(location(&response), "/assets/downloads/blog-trunk-r42.tar.gz");

        let response = get(&f.app, "/assets/downloads/blog-trunk-r42.tar.gz").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(f.pipeline.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_generate_with_url_override() {
        let f = fixture();
        let tag = "http%3A%2F%2Fsvn.example.com%2Fmodules%2Fblog%2Ftags%2F0.2";
        let response = get(&f.app, &format!("/downloads/blog/generate?url={tag}")).await;
        assert_eq!(location(&response), "/assets/downloads/blog-v0.2.tar.gz");

        let response = get(&f.app, "/downloads/blog/generate?url=--config-dir%3D%2Ftmp").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_build_failure_renders_error_page() {
        let f = fixture();
        f.pipeline.failing.store(true, Ordering::SeqCst);

        let response = get(&f.app, "/downloads/blog/generate").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("&lt;path&gt;"));
        assert!(!body.contains("<path>"));
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let f = fixture();
        let response = get(&f.app, "/downloads/calendar").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_manual_refresh() {
        let f = fixture();
        get(&f.app, "/downloads/blog").await;

        let response = f
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/refresh")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let summary: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(summary["refreshed"], 1);
        assert_eq!(summary["failed"], 0);
    }

    #[test]
    fn test_public_mount() {
        assert_eq!(public_mount("/assets/downloads/").as_deref(), Some("/assets/downloads"));
        assert_eq!(public_mount("https://cdn.example.com/downloads"), None);
        assert_eq!(public_mount("/"), None);
    }
}
