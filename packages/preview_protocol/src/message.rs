//! Typed messages for each channel.
//!
//! Each channel has its own enum, tagged by `type` in SCREAMING_SNAKE_CASE.
//! Field names follow the browser side (`tabID`, `iconData`, `instanceID`).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::content::{PreviewRequest, PreviewResponse};
use crate::frame::ChannelKind;

/// Which side of the boundary may originate a message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    SurfaceToHub,
    HubToSurface,
    /// Sent by a surface, then rebroadcast by the hub.
    Both,
}

/// Common behaviour of the per-channel message enums.
pub trait MessageKind: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const CHANNEL: ChannelKind;

    /// Every `type` value this channel understands. Anything else decodes as
    /// [`crate::Decoded::Unknown`].
    const KNOWN_TYPES: &'static [&'static str];

    fn type_name(&self) -> &'static str;

    fn direction(&self) -> Direction;

    /// The tab a message speaks for, when the message names one itself.
    fn announced_tab(&self) -> Option<&str> {
        None
    }

    fn accepted_from_surface(&self) -> bool {
        self.direction() != Direction::HubToSurface
    }

    /// Answers meant for one tab. Never delivered to a surface unless the
    /// frame is scoped to that surface's tab.
    fn unicast_only(&self) -> bool {
        false
    }
}

// =============================================================================
// Navigation
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NavigationMessage {
    /// A freshly opened surface asks which URL it should show.
    GetInitialUrl {
        #[serde(rename = "tabID")]
        tab_id: String,
    },
    /// Loader heartbeat.
    TabLoaderOnline {
        #[serde(rename = "tabID")]
        tab_id: String,
        url: String,
    },
    /// Unicast answer to [`NavigationMessage::GetInitialUrl`].
    InitialUrlNavigate {
        #[serde(rename = "tabID")]
        tab_id: String,
        url: String,
    },
    RedirectPage {
        url: String,
        #[serde(default)]
        force: bool,
    },
    ProjectSwitch {
        root: String,
    },
    UpdateTitleIcon {
        title: String,
        #[serde(rename = "iconData", default, skip_serializing_if = "Option::is_none")]
        icon_data: Option<String>,
    },
}

impl MessageKind for NavigationMessage {
    const CHANNEL: ChannelKind = ChannelKind::Navigation;
    const KNOWN_TYPES: &'static [&'static str] = &[
        "GET_INITIAL_URL",
        "TAB_LOADER_ONLINE",
        "INITIAL_URL_NAVIGATE",
        "REDIRECT_PAGE",
        "PROJECT_SWITCH",
        "UPDATE_TITLE_ICON",
    ];

    fn type_name(&self) -> &'static str {
        match self {
            Self::GetInitialUrl { .. } => "GET_INITIAL_URL",
            Self::TabLoaderOnline { .. } => "TAB_LOADER_ONLINE",
            Self::InitialUrlNavigate { .. } => "INITIAL_URL_NAVIGATE",
            Self::RedirectPage { .. } => "REDIRECT_PAGE",
            Self::ProjectSwitch { .. } => "PROJECT_SWITCH",
            Self::UpdateTitleIcon { .. } => "UPDATE_TITLE_ICON",
        }
    }

    fn direction(&self) -> Direction {
        match self {
            Self::GetInitialUrl { .. } | Self::TabLoaderOnline { .. } => Direction::SurfaceToHub,
            Self::InitialUrlNavigate { .. } | Self::RedirectPage { .. } | Self::ProjectSwitch { .. } => {
                Direction::HubToSurface
            }
            Self::UpdateTitleIcon { .. } => Direction::Both,
        }
    }

    fn announced_tab(&self) -> Option<&str> {
        match self {
            Self::GetInitialUrl { tab_id } | Self::TabLoaderOnline { tab_id, .. } => Some(tab_id),
            _ => None,
        }
    }

    fn unicast_only(&self) -> bool {
        matches!(self, Self::InitialUrlNavigate { .. })
    }
}

// =============================================================================
// Relay
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayMessage {
    GetContent(PreviewRequest),
    RequestResponse(PreviewResponse),
    /// Content surface heartbeat.
    TabOnline {
        #[serde(rename = "tabID")]
        tab_id: String,
        url: String,
    },
    GetPhoenixInstanceId {},
    InstanceId {
        #[serde(rename = "instanceID")]
        instance_id: String,
    },
    ReportError {
        message: String,
    },
    Event(ForwardedEvent),
}

impl MessageKind for RelayMessage {
    const CHANNEL: ChannelKind = ChannelKind::Relay;
    const KNOWN_TYPES: &'static [&'static str] = &[
        "GET_CONTENT",
        "REQUEST_RESPONSE",
        "TAB_ONLINE",
        "GET_PHOENIX_INSTANCE_ID",
        "INSTANCE_ID",
        "REPORT_ERROR",
        "EVENT",
    ];

    fn type_name(&self) -> &'static str {
        match self {
            Self::GetContent(_) => "GET_CONTENT",
            Self::RequestResponse(_) => "REQUEST_RESPONSE",
            Self::TabOnline { .. } => "TAB_ONLINE",
            Self::GetPhoenixInstanceId {} => "GET_PHOENIX_INSTANCE_ID",
            Self::InstanceId { .. } => "INSTANCE_ID",
            Self::ReportError { .. } => "REPORT_ERROR",
            Self::Event(_) => "EVENT",
        }
    }

    fn direction(&self) -> Direction {
        match self {
            Self::RequestResponse(_) | Self::InstanceId { .. } => Direction::HubToSurface,
            Self::GetContent(_)
            | Self::TabOnline { .. }
            | Self::GetPhoenixInstanceId {}
            | Self::ReportError { .. }
            | Self::Event(_) => Direction::SurfaceToHub,
        }
    }

    fn announced_tab(&self) -> Option<&str> {
        match self {
            Self::TabOnline { tab_id, .. } => Some(tab_id),
            Self::GetContent(req) => req.source_tab_id.as_deref(),
            _ => None,
        }
    }

    fn unicast_only(&self) -> bool {
        matches!(self, Self::RequestResponse(_) | Self::InstanceId { .. })
    }
}

/// A surface-side event forwarded over the relay, keyed by `eventName`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardedEvent {
    #[serde(rename = "eventName")]
    pub event_name: String,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Debug,
    #[default]
    Log,
    Info,
    Warn,
    Error,
}

impl ConsoleLevel {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "debug" | "trace" => Self::Debug,
            "info" => Self::Info,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Log,
        }
    }
}

/// Result of classifying a [`ForwardedEvent`] by its name.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Console { level: ConsoleLevel, message: String },
    Navigated { url: String },
    Unknown(ForwardedEvent),
}

impl ForwardedEvent {
    pub fn new(event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            payload: serde_json::Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    /// Known names with a missing required field fall through to `Unknown` so
    /// the catch-all still sees them.
    pub fn classify(self) -> SurfaceEvent {
        match self.event_name.as_str() {
            "CONSOLE" => {
                let level = self.str_field("level").map(ConsoleLevel::parse).unwrap_or_default();
                let message = match (self.str_field("message"), self.payload.get("args")) {
                    (Some(message), _) => message.to_string(),
                    (None, Some(serde_json::Value::Array(args))) => args
                        .iter()
                        .map(|arg| match arg {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(" "),
                    _ => return SurfaceEvent::Unknown(self),
                };
                SurfaceEvent::Console { level, message }
            }
            "NAVIGATED" => match self.str_field("url") {
                Some(url) => SurfaceEvent::Navigated { url: url.to_string() },
                None => SurfaceEvent::Unknown(self),
            },
            _ => SurfaceEvent::Unknown(self),
        }
    }
}

// =============================================================================
// Broadcast-out
// =============================================================================

/// Editor-originated events. Surfaces only ever receive these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditorEvent {
    Reload { url: String },
    ConnectionCount { count: usize },
}

impl MessageKind for EditorEvent {
    const CHANNEL: ChannelKind = ChannelKind::BroadcastOut;
    const KNOWN_TYPES: &'static [&'static str] = &["RELOAD", "CONNECTION_COUNT"];

    fn type_name(&self) -> &'static str {
        match self {
            Self::Reload { .. } => "RELOAD",
            Self::ConnectionCount { .. } => "CONNECTION_COUNT",
        }
    }

    fn direction(&self) -> Direction {
        Direction::HubToSurface
    }
}
