use axum::{
    Router,
    response::Redirect,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

use crate::correlator::RequestCorrelator;
use crate::handlers;
use crate::hub::PreviewHub;
use crate::metrics::PreviewMetrics;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<PreviewHub>,
    /// Turns virtual-server requests into relay round trips.
    pub correlator: Arc<RequestCorrelator>,
    pub metrics: Arc<PreviewMetrics>,
}

impl AppState {
    pub fn new(hub: Arc<PreviewHub>) -> Self {
        let correlator = Arc::new(RequestCorrelator::new(
            hub.router().clone(),
            hub.urls().origin(),
            hub.config().request_timeout,
            hub.metrics().clone(),
        ));
        Self {
            metrics: hub.metrics().clone(),
            hub,
            correlator,
        }
    }

    /// Start the hub loops and the correlator's relay listener.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut handles = self.hub.start();
        handles.push(self.correlator.spawn_listener(self.hub.cancellation()));
        handles
    }
}

pub fn router(state: AppState) -> Router {
    let loader = state
        .hub
        .urls()
        .loader_url()
        .strip_prefix(state.hub.urls().base())
        .map(str::to_string)
        .unwrap_or_else(|| "/".to_string());

    Router::new()
        .route(
            "/",
            get(move || {
                let loader = loader.clone();
                async move { Redirect::temporary(&loader) }
            }),
        )
        // Virtual server and surface socket
        .route("/preview/{instance}/{*path}", get(handlers::serve_preview))
        .route("/api/preview/ws", get(handlers::surface_socket_handler))
        // Editor API
        .route("/api/editor/status", get(handlers::status_handler))
        .route(
            "/api/editor/project",
            post(handlers::open_project_handler).delete(handlers::close_project_handler),
        )
        .route("/api/editor/select", post(handlers::select_file_handler))
        .route(
            "/api/editor/document",
            post(handlers::update_document_handler),
        )
        .route(
            "/api/editor/document/close",
            post(handlers::close_document_handler),
        )
        .route("/api/editor/overlay", post(handlers::set_overlay_handler))
        .route(
            "/api/editor/overlay/remove",
            post(handlers::remove_overlay_handler),
        )
        .route("/api/editor/trust", post(handlers::trust_handler))
        // Health endpoints
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .with_state(state)
}
