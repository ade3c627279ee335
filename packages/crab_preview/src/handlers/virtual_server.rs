//! `GET /preview/{instance}/{*path}`: the virtual server.
//!
//! Requests are turned into `GET_CONTENT` on the relay and answered with
//! whatever the hub resolves. Pages under the reserved segment are rendered
//! directly.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri, header},
    response::{Html, IntoResponse, Response},
};
use preview_protocol::{PreviewRequest, PreviewResponse};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

use crate::correlator::RequestCorrelator;
use crate::error::PreviewError;
use crate::server::AppState;
use crate::session::{RESERVED_SEGMENT, ReservedPage};

#[derive(Debug, Default, Deserialize)]
pub struct ServeQuery {
    /// Tab the page is being loaded into, when the surface knows it.
    #[serde(default)]
    pub tab_id: Option<String>,
    /// Set by surfaces opened in their own window.
    #[serde(default)]
    pub popout: bool,
}

pub async fn serve_preview(
    State(state): State<AppState>,
    Query(query): Query<ServeQuery>,
    uri: Uri,
) -> Response {
    let urls = state.hub.urls();
    let Some(route) = uri.path().strip_prefix(&urls.prefix()) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !route.starts_with('/') {
        return StatusCode::NOT_FOUND.into_response();
    }

    if let Some(slug) = route
        .strip_prefix('/')
        .and_then(|r| r.strip_prefix(RESERVED_SEGMENT))
        .and_then(|r| r.strip_prefix('/'))
    {
        return match ReservedPage::from_slug(slug) {
            Some(page) => no_store(Html(state.hub.reserved_page(page)).into_response()),
            None => StatusCode::NOT_FOUND.into_response(),
        };
    }

    let Some(path) = urls.path_for_route(route) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let request = PreviewRequest {
        request_id: RequestCorrelator::next_request_id(),
        path: path.display().to_string(),
        url: format!("{}{}", urls.base(), uri),
        source_tab_id: query.tab_id.filter(|t| !t.is_empty()),
        popped_out: query.popout,
    };
    debug!(
        request_id = %request.request_id,
        path = %request.path,
        "[SERVE] Virtual request"
    );

    match state.correlator.send(request).await {
        Ok(response) if response.is_not_found() => no_store(
            (
                StatusCode::NOT_FOUND,
                Html(state.hub.reserved_page(ReservedPage::NoPreview)),
            )
                .into_response(),
        ),
        Ok(response) => content_response(&path, response),
        Err(e) => error_response(e),
    }
}

fn content_response(path: &Path, response: PreviewResponse) -> Response {
    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("[SERVE] Dropping invalid response header {:?}", name),
        }
    }
    if !headers.contains_key(header::CONTENT_TYPE) {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
            headers.insert(header::CONTENT_TYPE, value);
        }
    }

    let body = response
        .contents
        .map(|c| c.into_bytes())
        .unwrap_or_default();
    no_store((StatusCode::OK, headers, Body::from(body)).into_response())
}

fn error_response(e: PreviewError) -> Response {
    let status = match &e {
        PreviewError::ContentUnavailable { .. } => StatusCode::GATEWAY_TIMEOUT,
        PreviewError::SecurityRejected { .. } => StatusCode::FORBIDDEN,
        PreviewError::ChannelClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
        PreviewError::DuplicateRequest { .. } => StatusCode::CONFLICT,
        PreviewError::NotFound { .. } => StatusCode::NOT_FOUND,
        PreviewError::ProtocolMismatch { .. }
        | PreviewError::RenderFailure(_)
        | PreviewError::MalformedMessage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!("[SERVE] Request failed ({}): {}", e.error_code(), e);
    (status, e.to_string()).into_response()
}

fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreviewConfig;
    use crate::hub::PreviewHub;
    use crate::metrics::PreviewMetrics;
    use crate::session::{InstanceId, PreviewUrls};
    use axum::{Router, http::Request, routing::get};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state(config: PreviewConfig) -> AppState {
        let urls = PreviewUrls::new(
            &url::Url::parse("http://127.0.0.1:4173").unwrap(),
            InstanceId::from("test"),
        );
        let hub = PreviewHub::new(urls, config, Arc::new(PreviewMetrics::new()));
        AppState::new(hub)
    }

    fn test_router(state: AppState) -> Router {
        Router::new()
            .route("/preview/{instance}/{*path}", get(serve_preview))
            .with_state(state)
    }

    fn local_uri(state: &AppState, path: &Path) -> String {
        let url = state.hub.urls().url_for_path(path);
        url.strip_prefix(state.hub.urls().base()).unwrap().to_string()
    }

    async fn get_uri(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_text(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn serves_instrumented_html_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let index = root.join("index.html");
        std::fs::write(&index, "<html><head></head><body>hello</body></html>").unwrap();

        let state = test_state(PreviewConfig::default());
        state.start();
        state.hub.open_project(&root);
        state.hub.mark_trusted();
        // Selected but never edited: the saved file stands in for the buffer.
        state.hub.select_file(&index);

        let uri = local_uri(&state, &index);
        let resp = get_uri(test_router(state.clone()), &uri).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");
        assert!(resp.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        let body = body_text(resp).await;
        assert!(body.contains("hello"));
        assert!(body.contains(crate::views::LIVE_PREVIEW_MARKER));
        state.hub.shutdown();
    }

    #[tokio::test]
    async fn guesses_content_type_for_assets() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let css = root.join("site.css");
        std::fs::write(&css, "body { color: red }").unwrap();

        let state = test_state(PreviewConfig::default());
        state.start();
        state.hub.open_project(&root);
        state.hub.mark_trusted();

        let uri = local_uri(&state, &css);
        let resp = get_uri(test_router(state.clone()), &uri).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/css");
        state.hub.shutdown();
    }

    #[tokio::test]
    async fn untrusted_project_gets_placeholder() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let index = root.join("index.html");
        std::fs::write(&index, "secret").unwrap();

        let state = test_state(PreviewConfig::default());
        state.start();
        state.hub.open_project(&root);

        let uri = local_uri(&state, &index);
        let resp = get_uri(test_router(state.clone()), &uri).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = body_text(resp).await;
        assert!(!body.contains("secret"));
        state.hub.shutdown();
    }

    #[tokio::test]
    async fn other_instances_are_not_served() {
        let state = test_state(PreviewConfig::default());
        let resp = get_uri(test_router(state), "/preview/someone-else/tmp/index.html").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn reserved_pages_are_rendered_directly() {
        let state = test_state(PreviewConfig::default());
        let resp = get_uri(test_router(state), "/preview/test/_preview/loader").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_text(resp).await.contains("crab-preview-frame"));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_requests_time_out() {
        let config = PreviewConfig {
            request_timeout: Duration::from_secs(2),
            ..PreviewConfig::default()
        };
        // Hub loops never started: nobody answers GET_CONTENT.
        let state = test_state(config);
        let resp = get_uri(test_router(state), "/preview/test/tmp/index.html").await;
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
