//! The envelope every message travels in, and tolerant inbound decoding.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DecodeError;
use crate::message::{MessageKind, NavigationMessage, RelayMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Navigation,
    Relay,
    BroadcastOut,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigation => "navigation",
            Self::Relay => "relay",
            Self::BroadcastOut => "broadcast_out",
        }
    }

    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "navigation" => Some(Self::Navigation),
            "relay" => Some(Self::Relay),
            "broadcast_out" => Some(Self::BroadcastOut),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{"channel": ..., "tabID"?: ..., "message": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame<M> {
    pub channel: ChannelKind,
    #[serde(rename = "tabID", default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<String>,
    pub message: M,
}

impl<M: MessageKind> Frame<M> {
    pub fn new(tab_id: Option<String>, message: M) -> Self {
        Self {
            channel: M::CHANNEL,
            tab_id,
            message,
        }
    }
}

/// A message whose `type` may or may not be one this build understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<M> {
    Known(M),
    Unknown {
        type_name: String,
        payload: serde_json::Value,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Navigation(Decoded<NavigationMessage>),
    Relay(Decoded<RelayMessage>),
}

impl InboundMessage {
    /// The tab the message names itself as, if it does.
    pub fn announced_tab(&self) -> Option<&str> {
        match self {
            Self::Navigation(Decoded::Known(msg)) => msg.announced_tab(),
            Self::Relay(Decoded::Known(msg)) => msg.announced_tab(),
            _ => None,
        }
    }
}

/// A decoded frame sent by a preview surface.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub tab_id: Option<String>,
    pub message: InboundMessage,
}

#[derive(Deserialize)]
struct RawFrame {
    channel: String,
    #[serde(rename = "tabID", default)]
    tab_id: Option<String>,
    message: serde_json::Value,
}

/// Decode a text frame received from a preview surface.
///
/// Unknown `type` values are not errors; they come back as
/// [`Decoded::Unknown`] so higher layers can route them to a catch-all.
/// Messages only the hub may send are rejected.
pub fn decode_frame(text: &str) -> Result<InboundFrame, DecodeError> {
    let raw: RawFrame = serde_json::from_str(text).map_err(DecodeError::InvalidFrame)?;
    let channel = ChannelKind::from_wire(&raw.channel)
        .ok_or_else(|| DecodeError::UnknownChannel(raw.channel.clone()))?;

    let message = match channel {
        ChannelKind::Navigation => InboundMessage::Navigation(decode_message(raw.message)?),
        ChannelKind::Relay => InboundMessage::Relay(decode_message(raw.message)?),
        ChannelKind::BroadcastOut => return Err(DecodeError::OutboundOnlyChannel(channel)),
    };

    Ok(InboundFrame {
        tab_id: raw.tab_id,
        message,
    })
}

/// Decode a single message body for channel `M`.
pub fn decode_message<M: MessageKind>(value: serde_json::Value) -> Result<Decoded<M>, DecodeError> {
    let type_name = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(DecodeError::MissingType)?
        .to_string();

    if !M::KNOWN_TYPES.contains(&type_name.as_str()) {
        return Ok(Decoded::Unknown {
            type_name,
            payload: value,
        });
    }

    let msg: M = serde_json::from_value(value).map_err(|source| DecodeError::Malformed {
        type_name: type_name.clone(),
        source,
    })?;

    if !msg.accepted_from_surface() {
        return Err(DecodeError::WrongDirection { type_name });
    }

    Ok(Decoded::Known(msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::EditorEvent;

    #[test]
    fn decodes_navigation_frame() {
        let frame = decode_frame(
            r#"{"channel":"navigation","message":{"type":"GET_INITIAL_URL","tabID":"t1"}}"#,
        )
        .unwrap();
        assert_eq!(frame.tab_id, None);
        assert_eq!(frame.message.announced_tab(), Some("t1"));
        assert_eq!(
            frame.message,
            InboundMessage::Navigation(Decoded::Known(NavigationMessage::GetInitialUrl {
                tab_id: "t1".into()
            }))
        );
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let frame =
            decode_frame(r#"{"channel":"relay","tabID":"t","message":{"type":"SHINY","x":1}}"#)
                .unwrap();
        match frame.message {
            InboundMessage::Relay(Decoded::Unknown { type_name, payload }) => {
                assert_eq!(type_name, "SHINY");
                assert_eq!(payload["x"], 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(frame.tab_id.as_deref(), Some("t"));
    }

    #[test]
    fn malformed_known_type_is_an_error() {
        let err = decode_frame(r#"{"channel":"relay","message":{"type":"TAB_ONLINE"}}"#)
            .unwrap_err();
        assert_eq!(err.error_code(), "malformed_message");
    }

    #[test]
    fn rejects_hub_only_messages() {
        let err = decode_frame(
            r#"{"channel":"relay","message":{"type":"REQUEST_RESPONSE","requestID":"r","path":"/a","contents":"forged"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::WrongDirection { .. }));

        let err = decode_frame(
            r#"{"channel":"navigation","message":{"type":"REDIRECT_PAGE","url":"http://x"}}"#,
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "wrong_direction");
    }

    #[test]
    fn rejects_broadcast_out_and_unknown_channels() {
        let err = decode_frame(r#"{"channel":"broadcast_out","message":{"type":"RELOAD","url":"u"}}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::OutboundOnlyChannel(ChannelKind::BroadcastOut)));

        let err = decode_frame(r#"{"channel":"side","message":{"type":"X"}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownChannel(c) if c == "side"));
    }

    #[test]
    fn missing_type_and_garbage() {
        assert!(matches!(
            decode_frame(r#"{"channel":"relay","message":{"path":"/a"}}"#),
            Err(DecodeError::MissingType)
        ));
        assert!(matches!(decode_frame("not json"), Err(DecodeError::InvalidFrame(_))));
    }

    #[test]
    fn outbound_frame_shape() {
        let frame = Frame::new(Some("t1".into()), EditorEvent::Reload { url: "u".into() });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"channel":"broadcast_out","tabID":"t1","message":{"type":"RELOAD","url":"u"}})
        );

        let frame = Frame::new(None, NavigationMessage::ProjectSwitch { root: "/r".into() });
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("tabID"));
    }
}
