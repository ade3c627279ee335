//! Request/response over the fire-and-forget relay channel.
//!
//! Each outgoing `GET_CONTENT` is recorded under its request ID with a oneshot
//! completion handle. A hub-published `REQUEST_RESPONSE` carrying the same ID
//! completes and removes it; anything else is dropped.
//!
//! Relay frames for a bridged request are scoped to a private tab of their
//! own, so the answer never reaches a connected surface.

use parking_lot::Mutex;
use preview_protocol::{PreviewRequest, PreviewResponse, RelayMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::PreviewError;
use crate::metrics::PreviewMetrics;
use crate::router::{ChannelRouter, FrameSource};

/// Prefix of the private relay scope each bridged request travels under.
pub const BRIDGE_SCOPE_PREFIX: &str = "bridge:";

pub struct RequestCorrelator {
    pending: Mutex<HashMap<String, oneshot::Sender<PreviewResponse>>>,
    router: Arc<ChannelRouter>,
    /// Origin the correlator speaks with on the relay.
    origin: String,
    timeout: Duration,
    metrics: Arc<PreviewMetrics>,
}

/// Removes the pending entry when the waiting future finishes or is dropped.
struct PendingGuard<'a> {
    correlator: &'a RequestCorrelator,
    request_id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlator.pending.lock().remove(&self.request_id);
    }
}

impl RequestCorrelator {
    pub fn new(
        router: Arc<ChannelRouter>,
        origin: impl Into<String>,
        timeout: Duration,
        metrics: Arc<PreviewMetrics>,
    ) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            router,
            origin: origin.into(),
            timeout,
            metrics,
        }
    }

    pub fn next_request_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Relay scope for the round trip of `request_id`.
    pub fn bridge_scope(request_id: &str) -> String {
        format!("{BRIDGE_SCOPE_PREFIX}{request_id}")
    }

    pub fn is_bridge_scope(tab_id: &str) -> bool {
        tab_id.starts_with(BRIDGE_SCOPE_PREFIX)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Send `request` on the relay and wait for the matching response.
    ///
    /// Fails with `DuplicateRequest` if the ID is already outstanding and with
    /// `ContentUnavailable` if nothing answers within the timeout.
    pub async fn send(&self, request: PreviewRequest) -> Result<PreviewResponse, PreviewError> {
        let request_id = request.request_id.clone();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if pending.contains_key(&request_id) {
                return Err(PreviewError::DuplicateRequest { request_id });
            }
            pending.insert(request_id.clone(), tx);
        }
        let _guard = PendingGuard {
            correlator: self,
            request_id: request_id.clone(),
        };

        let scope = Self::bridge_scope(&request_id);
        self.router
            .ingest_relay(&self.origin, Some(scope), RelayMessage::GetContent(request))?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(PreviewError::ChannelClosed("relay")),
            Err(_) => {
                self.metrics.request_timed_out();
                warn!(
                    "[CORRELATOR] No response for request {} after {:?}",
                    request_id, self.timeout
                );
                Err(PreviewError::ContentUnavailable {
                    request_id,
                    waited: self.timeout,
                })
            }
        }
    }

    /// Complete the waiter for `response.request_id`. Returns false (and
    /// raises nothing) when no request with that ID is outstanding.
    pub fn complete(&self, response: PreviewResponse) -> bool {
        let waiter = self.pending.lock().remove(&response.request_id);
        match waiter {
            Some(tx) => tx.send(response).is_ok(),
            None => {
                self.metrics.protocol_mismatch();
                debug!(
                    "[CORRELATOR] Dropping response for unknown request {}",
                    response.request_id
                );
                false
            }
        }
    }

    /// Watch the relay for hub-published responses until `cancel` fires.
    ///
    /// Subscribes before returning, so no response published after this call
    /// is missed.
    pub fn spawn_listener(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let mut relay_rx = self.router.subscribe_relay();
        let correlator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = relay_rx.recv() => match result {
                        Ok(envelope) => {
                            if envelope.source != FrameSource::Hub {
                                continue;
                            }
                            if let RelayMessage::RequestResponse(response) = envelope.message {
                                correlator.complete(response);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("[CORRELATOR] Relay listener lagged by {} messages", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            debug!("[CORRELATOR] Relay listener stopped");
        })
    }
}
