//! WebSocket endpoint preview surfaces connect to.
//!
//! Each connection speaks for at most one tab. Frames from the surface are
//! ingested through the channel router under the connection's Origin; frames
//! the hub publishes are forwarded when they are broadcast or scoped to this
//! connection's tab. Answers (`REQUEST_RESPONSE`, `INSTANCE_ID`,
//! `INITIAL_URL_NAVIGATE`) are only ever forwarded scoped.

use axum::{
    extract::ws::{Message, WebSocket},
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use preview_protocol::{Frame, MessageKind};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::correlator::RequestCorrelator;
use crate::hub::PreviewHub;
use crate::router::{Envelope, FrameSource};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SurfaceQuery {
    pub tab_id: Option<String>,
}

pub async fn surface_socket_handler(
    State(state): State<AppState>,
    Query(query): Query<SurfaceQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let Some(origin) = origin.filter(|o| state.hub.router().allows(o)) else {
        state.metrics.security_rejection();
        warn!("[SURFACE] Refused socket from disallowed origin");
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    };

    let hub = state.hub.clone();
    let tab_id = query.tab_id.filter(|t| is_surface_tab(t));
    ws.on_upgrade(move |socket| handle_surface(socket, hub, origin, tab_id))
}

/// Tab IDs a connection may speak for. Bridge scopes belong to the virtual
/// server.
fn is_surface_tab(tab_id: &str) -> bool {
    !tab_id.is_empty() && !RequestCorrelator::is_bridge_scope(tab_id)
}

enum Outgoing {
    Frame(String),
    Skip,
    Closed,
}

/// Serialize a hub publication if this connection should see it.
fn outgoing<M: MessageKind>(
    result: Result<Envelope<M>, broadcast::error::RecvError>,
    tab_id: Option<&str>,
) -> Outgoing {
    match result {
        Ok(envelope) => {
            if envelope.source != FrameSource::Hub {
                return Outgoing::Skip;
            }
            match envelope.tab_id.as_deref() {
                Some(scope) if tab_id != Some(scope) => return Outgoing::Skip,
                None if envelope.message.unicast_only() => return Outgoing::Skip,
                _ => {}
            }
            match serde_json::to_string(&Frame::new(envelope.tab_id, envelope.message)) {
                Ok(json) => Outgoing::Frame(json),
                Err(e) => {
                    error!("[SURFACE] Failed to serialize {} frame: {}", M::CHANNEL, e);
                    Outgoing::Skip
                }
            }
        }
        Err(broadcast::error::RecvError::Lagged(n)) => {
            warn!("[SURFACE] {} forwarding lagged by {} messages", M::CHANNEL, n);
            Outgoing::Skip
        }
        Err(broadcast::error::RecvError::Closed) => Outgoing::Closed,
    }
}

async fn handle_surface(
    socket: WebSocket,
    hub: Arc<PreviewHub>,
    origin: String,
    mut tab_id: Option<String>,
) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    let metrics = hub.metrics().clone();
    metrics.connection_opened();
    info!(conn_id = %connection_id, "[SURFACE] Connected from {}", origin);

    let router = hub.router().clone();
    let mut nav_rx = router.subscribe_navigation();
    let mut relay_rx = router.subscribe_relay();
    let mut out_rx = router.subscribe_broadcast_out();
    let cancel = hub.cancellation();

    let (mut ws_sender, mut ws_receiver) = socket.split();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match router.ingest_text(&origin, text.as_str()) {
                        Ok(Some(announced)) if tab_id.is_none() && is_surface_tab(&announced) => {
                            debug!(conn_id = %connection_id, "[SURFACE] Connection speaks for tab {}", announced);
                            tab_id = Some(announced);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            debug!(conn_id = %connection_id, "[SURFACE] Frame dropped ({}): {}", e.error_code(), e);
                        }
                    }
                    Outgoing::Skip
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => Outgoing::Skip,
                Some(Err(e)) => {
                    debug!(conn_id = %connection_id, "[SURFACE] Socket error: {}", e);
                    break;
                }
            },
            result = nav_rx.recv() => outgoing(result, tab_id.as_deref()),
            result = relay_rx.recv() => outgoing(result, tab_id.as_deref()),
            result = out_rx.recv() => outgoing(result, tab_id.as_deref()),
        };

        match next {
            Outgoing::Frame(json) => {
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Outgoing::Skip => {}
            Outgoing::Closed => break,
        }
    }

    metrics.connection_closed();
    info!(
        conn_id = %connection_id,
        "[SURFACE] Disconnected (tab {})",
        tab_id.as_deref().unwrap_or("unknown")
    );
}
