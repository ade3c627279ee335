//! Error types for the preview subsystem.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreviewError {
    #[error("not found: {path}")]
    NotFound { path: String },

    /// Path escapes the project root or the sender's origin is not allowlisted.
    /// The reason is for logs only and never sent to a surface.
    #[error("security rejected: {reason}")]
    SecurityRejected { reason: String },

    #[error("no outstanding request with id {request_id}")]
    ProtocolMismatch { request_id: String },

    #[error("markdown render failed: {0}")]
    RenderFailure(String),

    #[error("no response for request {request_id} within {waited:?}")]
    ContentUnavailable { request_id: String, waited: Duration },

    #[error("request id {request_id} is already outstanding")]
    DuplicateRequest { request_id: String },

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("{0} channel closed")]
    ChannelClosed(&'static str),
}

impl PreviewError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::SecurityRejected { .. } => "security_rejected",
            Self::ProtocolMismatch { .. } => "protocol_mismatch",
            Self::RenderFailure(_) => "render_failure",
            Self::ContentUnavailable { .. } => "content_unavailable",
            Self::DuplicateRequest { .. } => "duplicate_request",
            Self::MalformedMessage(_) => "malformed_message",
            Self::ChannelClosed(_) => "channel_closed",
        }
    }

    pub fn security(reason: impl Into<String>) -> Self {
        Self::SecurityRejected {
            reason: reason.into(),
        }
    }
}

impl From<preview_protocol::DecodeError> for PreviewError {
    fn from(err: preview_protocol::DecodeError) -> Self {
        Self::MalformedMessage(err.to_string())
    }
}
