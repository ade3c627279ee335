//! Hub-side handling of messages surfaces put on the navigation and relay
//! channels.
//!
//! The hub's own publications come back through the same broadcast channels;
//! they are ignored here.

use preview_protocol::{ConsoleLevel, NavigationMessage, RelayMessage, SurfaceEvent};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::hub::PreviewHub;
use crate::router::{Envelope, FrameSource};

/// Result of dispatching one channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchResult {
    /// The hub acted on the message.
    Handled,
    /// Hub-published, or a type only the hub may send.
    Unhandled,
}

pub(crate) fn dispatch_navigation(
    hub: &Arc<PreviewHub>,
    envelope: Envelope<NavigationMessage>,
) -> DispatchResult {
    if envelope.source == FrameSource::Hub {
        return DispatchResult::Unhandled;
    }

    match envelope.message {
        NavigationMessage::GetInitialUrl { tab_id } => {
            hub.answer_initial_url(&tab_id);
            DispatchResult::Handled
        }
        NavigationMessage::TabLoaderOnline { tab_id, url } => {
            hub.record_heartbeat(&tab_id, &url, true);
            DispatchResult::Handled
        }
        message @ NavigationMessage::UpdateTitleIcon { .. } => {
            hub.router().publish_navigation(None, message);
            DispatchResult::Handled
        }
        NavigationMessage::InitialUrlNavigate { .. }
        | NavigationMessage::RedirectPage { .. }
        | NavigationMessage::ProjectSwitch { .. } => {
            debug!(
                "[DISPATCH] Ignoring hub-only navigation message from {:?}",
                envelope.origin
            );
            DispatchResult::Unhandled
        }
    }
}

pub(crate) fn dispatch_relay(
    hub: &Arc<PreviewHub>,
    envelope: Envelope<RelayMessage>,
) -> DispatchResult {
    if envelope.source == FrameSource::Hub {
        return DispatchResult::Unhandled;
    }

    let tab_id = envelope.tab_id;
    match envelope.message {
        RelayMessage::GetContent(request) => {
            let hub = Arc::clone(hub);
            tokio::spawn(async move {
                hub.serve_content(tab_id, request).await;
            });
            DispatchResult::Handled
        }
        RelayMessage::TabOnline { tab_id, url } => {
            hub.record_heartbeat(&tab_id, &url, false);
            DispatchResult::Handled
        }
        RelayMessage::GetPhoenixInstanceId {} => {
            hub.router().publish_relay(
                tab_id,
                RelayMessage::InstanceId {
                    instance_id: hub.instance_id().to_string(),
                },
            );
            DispatchResult::Handled
        }
        RelayMessage::ReportError { message } => {
            warn!(
                "[DISPATCH] Surface {} reported: {}",
                tab_id.as_deref().unwrap_or("?"),
                message
            );
            DispatchResult::Handled
        }
        RelayMessage::Event(event) => {
            match event.classify() {
                SurfaceEvent::Console { level, message } => {
                    let tab = tab_id.as_deref().unwrap_or("?");
                    match level {
                        ConsoleLevel::Error => warn!("[SURFACE {}] console.error: {}", tab, message),
                        ConsoleLevel::Warn => warn!("[SURFACE {}] console.warn: {}", tab, message),
                        ConsoleLevel::Info | ConsoleLevel::Log => {
                            info!("[SURFACE {}] {}", tab, message)
                        }
                        ConsoleLevel::Debug => debug!("[SURFACE {}] {}", tab, message),
                    }
                }
                SurfaceEvent::Navigated { url } => {
                    if let Some(tab) = tab_id.as_deref() {
                        hub.update_tab_url(tab, &url);
                    }
                }
                SurfaceEvent::Unknown(event) => {
                    hub.router().publish_unhandled_event(tab_id, event);
                }
            }
            DispatchResult::Handled
        }
        RelayMessage::RequestResponse(_) | RelayMessage::InstanceId { .. } => {
            debug!(
                "[DISPATCH] Ignoring hub-only relay message from {:?}",
                envelope.origin
            );
            DispatchResult::Unhandled
        }
    }
}
