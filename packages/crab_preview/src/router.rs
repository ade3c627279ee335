//! The three per-session channels and the origin gate in front of them.
//!
//! Every inbound message passes the origin allowlist before it is decoded or
//! published. Known message types are published on their channel; unknown
//! types go to the catch-all stream.

use preview_protocol::{
    ChannelKind, Decoded, EditorEvent, ForwardedEvent, InboundMessage, MessageKind,
    NavigationMessage, RelayMessage, decode_frame,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::PreviewError;
use crate::metrics::PreviewMetrics;
use crate::session::InstanceId;
use crate::trust::OriginAllowlist;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    /// Came from a preview surface (or something speaking for one).
    Surface,
    /// Published by the hub itself.
    Hub,
}

/// A message on one of the channels.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<M> {
    /// Origin of the sender. `None` for hub-published frames.
    pub origin: Option<String>,
    /// Delivery scope. `None` reaches every surface.
    pub tab_id: Option<String>,
    pub source: FrameSource,
    pub message: M,
}

/// Anything that reached the catch-all: unknown message types on either
/// channel, and forwarded events whose name has no dedicated handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Unhandled {
    UnknownType {
        channel: ChannelKind,
        tab_id: Option<String>,
        type_name: String,
        payload: serde_json::Value,
    },
    Event {
        tab_id: Option<String>,
        event: ForwardedEvent,
    },
}

pub struct ChannelRouter {
    instance_id: InstanceId,
    navigation: broadcast::Sender<Envelope<NavigationMessage>>,
    relay: broadcast::Sender<Envelope<RelayMessage>>,
    broadcast_out: broadcast::Sender<Envelope<EditorEvent>>,
    unhandled: broadcast::Sender<Unhandled>,
    allowlist: OriginAllowlist,
    metrics: Arc<PreviewMetrics>,
}

impl ChannelRouter {
    pub fn new(
        instance_id: InstanceId,
        allowlist: OriginAllowlist,
        capacity: usize,
        metrics: Arc<PreviewMetrics>,
    ) -> Self {
        let (navigation, _) = broadcast::channel(capacity);
        let (relay, _) = broadcast::channel(capacity);
        let (broadcast_out, _) = broadcast::channel(capacity);
        let (unhandled, _) = broadcast::channel(capacity);
        Self {
            instance_id,
            navigation,
            relay,
            broadcast_out,
            unhandled,
            allowlist,
            metrics,
        }
    }

    pub fn allows(&self, origin: &str) -> bool {
        self.allowlist.allows(origin)
    }

    fn check_origin(&self, origin: &str, what: &str) -> Result<(), PreviewError> {
        if self.allowlist.allows(origin) {
            return Ok(());
        }
        self.metrics.security_rejection();
        warn!(
            "[ROUTER {}] Discarded {} from disallowed origin {:?}",
            self.instance_id, what, origin
        );
        Err(PreviewError::security("origin not allowlisted"))
    }

    /// Accept a raw text frame from a surface.
    ///
    /// Returns the tab the frame speaks for, if it names one.
    pub fn ingest_text(&self, origin: &str, text: &str) -> Result<Option<String>, PreviewError> {
        self.check_origin(origin, "frame")?;

        let frame = decode_frame(text).map_err(|e| {
            self.metrics.malformed_message();
            debug!("[ROUTER {}] Dropping frame: {}", self.instance_id, e);
            PreviewError::from(e)
        })?;

        let announced = frame.message.announced_tab().map(str::to_string);
        let tab_id = frame.tab_id.or_else(|| announced.clone());

        match frame.message {
            InboundMessage::Navigation(Decoded::Known(message)) => {
                self.publish(&self.navigation, Some(origin), tab_id.clone(), FrameSource::Surface, message);
            }
            InboundMessage::Relay(Decoded::Known(message)) => {
                self.publish(&self.relay, Some(origin), tab_id.clone(), FrameSource::Surface, message);
            }
            InboundMessage::Navigation(Decoded::Unknown { type_name, payload }) => {
                self.unhandled(ChannelKind::Navigation, tab_id.clone(), type_name, payload);
            }
            InboundMessage::Relay(Decoded::Unknown { type_name, payload }) => {
                self.unhandled(ChannelKind::Relay, tab_id.clone(), type_name, payload);
            }
        }

        Ok(announced.or(tab_id))
    }

    /// Accept a typed navigation message on behalf of a surface.
    pub fn ingest_navigation(
        &self,
        origin: &str,
        tab_id: Option<String>,
        message: NavigationMessage,
    ) -> Result<(), PreviewError> {
        self.check_origin(origin, message.type_name())?;
        check_direction(&message)?;
        self.publish(&self.navigation, Some(origin), tab_id, FrameSource::Surface, message);
        Ok(())
    }

    /// Accept a typed relay message on behalf of a surface.
    pub fn ingest_relay(
        &self,
        origin: &str,
        tab_id: Option<String>,
        message: RelayMessage,
    ) -> Result<(), PreviewError> {
        self.check_origin(origin, message.type_name())?;
        check_direction(&message)?;
        self.publish(&self.relay, Some(origin), tab_id, FrameSource::Surface, message);
        Ok(())
    }

    pub fn publish_navigation(&self, tab_id: Option<String>, message: NavigationMessage) {
        self.publish(&self.navigation, None, tab_id, FrameSource::Hub, message);
    }

    pub fn publish_relay(&self, tab_id: Option<String>, message: RelayMessage) {
        self.publish(&self.relay, None, tab_id, FrameSource::Hub, message);
    }

    pub fn publish_editor_event(&self, tab_id: Option<String>, message: EditorEvent) {
        self.publish(&self.broadcast_out, None, tab_id, FrameSource::Hub, message);
    }

    pub fn publish_unhandled_event(&self, tab_id: Option<String>, event: ForwardedEvent) {
        debug!(
            "[ROUTER {}] Unhandled event {} from {:?}",
            self.instance_id, event.event_name, tab_id
        );
        let _ = self.unhandled.send(Unhandled::Event { tab_id, event });
    }

    pub fn subscribe_navigation(&self) -> broadcast::Receiver<Envelope<NavigationMessage>> {
        self.navigation.subscribe()
    }

    pub fn subscribe_relay(&self) -> broadcast::Receiver<Envelope<RelayMessage>> {
        self.relay.subscribe()
    }

    pub fn subscribe_broadcast_out(&self) -> broadcast::Receiver<Envelope<EditorEvent>> {
        self.broadcast_out.subscribe()
    }

    /// Catch-all for messages no handler claims.
    pub fn subscribe_unhandled(&self) -> broadcast::Receiver<Unhandled> {
        self.unhandled.subscribe()
    }

    fn publish<M: MessageKind>(
        &self,
        sender: &broadcast::Sender<Envelope<M>>,
        origin: Option<&str>,
        tab_id: Option<String>,
        source: FrameSource,
        message: M,
    ) {
        debug!(
            "[ROUTER {}] {} {} (tab {:?}, {:?})",
            self.instance_id,
            M::CHANNEL,
            message.type_name(),
            tab_id,
            source
        );
        // No subscribers is not an error: nobody is listening yet.
        let _ = sender.send(Envelope {
            origin: origin.map(str::to_string),
            tab_id,
            source,
            message,
        });
    }

    fn unhandled(
        &self,
        channel: ChannelKind,
        tab_id: Option<String>,
        type_name: String,
        payload: serde_json::Value,
    ) {
        debug!(
            "[ROUTER {}] Unknown {} message type {}",
            self.instance_id, channel, type_name
        );
        let _ = self.unhandled.send(Unhandled::UnknownType {
            channel,
            tab_id,
            type_name,
            payload,
        });
    }
}

fn check_direction<M: MessageKind>(message: &M) -> Result<(), PreviewError> {
    if message.accepted_from_surface() {
        Ok(())
    } else {
        Err(PreviewError::MalformedMessage(format!(
            "{} cannot be sent by a preview surface",
            message.type_name()
        )))
    }
}
