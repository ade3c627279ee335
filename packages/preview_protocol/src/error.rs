use thiserror::Error;

use crate::frame::ChannelKind;

/// Why an inbound frame could not be turned into a typed message.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    InvalidFrame(#[source] serde_json::Error),

    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("channel {0} does not accept inbound messages")]
    OutboundOnlyChannel(ChannelKind),

    #[error("message has no type")]
    MissingType,

    #[error("malformed {type_name} message: {source}")]
    Malformed {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{type_name} cannot be sent by a preview surface")]
    WrongDirection { type_name: String },
}

impl DecodeError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidFrame(_) => "invalid_frame",
            Self::UnknownChannel(_) => "unknown_channel",
            Self::OutboundOnlyChannel(_) => "outbound_only_channel",
            Self::MissingType => "missing_type",
            Self::Malformed { .. } => "malformed_message",
            Self::WrongDirection { .. } => "wrong_direction",
        }
    }
}
