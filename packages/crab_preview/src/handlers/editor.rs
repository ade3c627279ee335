//! JSON API the editor drives the hub with.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use preview_protocol::Contents;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ProjectBody {
    pub root: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct PathBody {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct DocumentBody {
    pub path: PathBuf,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct OverlayBody {
    pub path: PathBuf,
    pub contents: Contents,
}

/// Snapshot of what the hub is serving.
#[derive(Debug, Serialize, Deserialize)]
pub struct EditorStatus {
    pub instance_id: String,
    pub project_root: Option<String>,
    pub trusted: bool,
    pub current_url: Option<String>,
    pub loader_url: String,
    pub content_surfaces: usize,
}

pub async fn status_handler(State(state): State<AppState>) -> Json<EditorStatus> {
    let hub = &state.hub;
    let project_root = hub.project_root();
    Json(EditorStatus {
        instance_id: hub.instance_id().to_string(),
        trusted: project_root.as_deref().is_some_and(|r| hub.is_trusted(r)),
        project_root: project_root.map(|r| r.display().to_string()),
        current_url: hub.current_url(),
        loader_url: hub.urls().loader_url(),
        content_surfaces: hub.content_surface_count(),
    })
}

pub async fn open_project_handler(
    State(state): State<AppState>,
    Json(body): Json<ProjectBody>,
) -> Result<Json<EditorStatus>, (StatusCode, String)> {
    if !body.root.is_absolute() {
        return Err((
            StatusCode::BAD_REQUEST,
            "project root must be an absolute path".to_string(),
        ));
    }
    state.hub.open_project(&body.root);
    Ok(status_handler(State(state)).await)
}

pub async fn close_project_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.hub.close_project();
    StatusCode::NO_CONTENT
}

pub async fn select_file_handler(
    State(state): State<AppState>,
    Json(body): Json<PathBody>,
) -> Json<EditorStatus> {
    state.hub.select_file(&body.path);
    status_handler(State(state)).await
}

pub async fn update_document_handler(
    State(state): State<AppState>,
    Json(body): Json<DocumentBody>,
) -> impl IntoResponse {
    state.hub.update_document(&body.path, body.text);
    StatusCode::NO_CONTENT
}

pub async fn close_document_handler(
    State(state): State<AppState>,
    Json(body): Json<PathBody>,
) -> impl IntoResponse {
    state.hub.close_document(&body.path);
    StatusCode::NO_CONTENT
}

pub async fn set_overlay_handler(
    State(state): State<AppState>,
    Json(body): Json<OverlayBody>,
) -> impl IntoResponse {
    state.hub.set_overlay(&body.path, body.contents);
    StatusCode::NO_CONTENT
}

pub async fn remove_overlay_handler(
    State(state): State<AppState>,
    Json(body): Json<PathBody>,
) -> impl IntoResponse {
    if state.hub.remove_overlay(&body.path) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn trust_handler(
    State(state): State<AppState>,
) -> Result<Json<EditorStatus>, (StatusCode, String)> {
    if state.hub.project_root().is_none() {
        return Err((StatusCode::CONFLICT, "no project is open".to_string()));
    }
    state.hub.mark_trusted();
    Ok(status_handler(State(state)).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreviewConfig;
    use crate::hub::PreviewHub;
    use crate::metrics::PreviewMetrics;
    use crate::session::{InstanceId, PreviewUrls};
    use axum::{
        Router,
        body::Body,
        http::Request,
        routing::{get, post},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_router() -> (Router, AppState) {
        let urls = PreviewUrls::new(
            &url::Url::parse("http://127.0.0.1:4173").unwrap(),
            InstanceId::from("test"),
        );
        let hub = PreviewHub::new(urls, PreviewConfig::default(), Arc::new(PreviewMetrics::new()));
        let state = AppState::new(hub);
        let router = Router::new()
            .route("/status", get(status_handler))
            .route("/project", post(open_project_handler).delete(close_project_handler))
            .route("/select", post(select_file_handler))
            .route("/trust", post(trust_handler))
            .with_state(state.clone());
        (router, state)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_status_when_idle() {
        let (app, _) = test_router();
        let resp = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert_eq!(json["instance_id"], "test");
        assert!(json["project_root"].is_null());
        assert_eq!(json["trusted"], false);
    }

    #[tokio::test]
    async fn test_open_trust_and_select() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let (app, state) = test_router();

        let resp = app
            .clone()
            .oneshot(post_json("/project", serde_json::json!({ "root": root })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert_eq!(json["trusted"], false);
        assert_eq!(json["current_url"], state.hub.urls().trust_url());

        let resp = app
            .clone()
            .oneshot(post_json("/trust", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(json_body(resp).await["trusted"], true);

        let page = root.join("readme.md");
        let resp = app
            .oneshot(post_json("/select", serde_json::json!({ "path": page })))
            .await
            .unwrap();
        assert_eq!(
            json_body(resp).await["current_url"],
            state.hub.urls().url_for_path(&page)
        );
    }

    #[tokio::test]
    async fn test_relative_root_is_rejected() {
        let (app, _) = test_router();
        let resp = app
            .oneshot(post_json("/project", serde_json::json!({ "root": "relative/dir" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_trust_without_project_conflicts() {
        let (app, _) = test_router();
        let resp = app
            .oneshot(post_json("/trust", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
