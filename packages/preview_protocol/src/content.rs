//! Content request/response payloads carried on the relay channel.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A request for the bytes a preview surface should see at `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewRequest {
    /// Unique per outstanding request. Reusing an ID is a protocol violation.
    #[serde(rename = "requestID")]
    pub request_id: String,
    /// Absolute logical path of the file inside the project.
    pub path: String,
    /// Absolute URL the surface navigated to.
    pub url: String,
    #[serde(
        rename = "sourceTabID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_tab_id: Option<String>,
    /// Set by tabs that were popped out to navigate independently of the editor.
    #[serde(
        rename = "poppedOut",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub popped_out: bool,
}

/// Served body: text or raw bytes.
///
/// Serialized untagged: a JSON string is text, a JSON array of numbers is bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Contents {
    Text(String),
    Bytes(Vec<u8>),
}

impl Contents {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Contents::Text(text) => text.as_bytes(),
            Contents::Bytes(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Contents::Text(text) => text.into_bytes(),
            Contents::Bytes(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lossy text view, used when scanning bodies for markers or references.
    pub fn to_text_lossy(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Contents::Text(text) => std::borrow::Cow::Borrowed(text.as_str()),
            Contents::Bytes(bytes) => String::from_utf8_lossy(bytes),
        }
    }
}

impl From<String> for Contents {
    fn from(text: String) -> Self {
        Contents::Text(text)
    }
}

impl From<&str> for Contents {
    fn from(text: &str) -> Self {
        Contents::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Contents {
    fn from(bytes: Vec<u8>) -> Self {
        Contents::Bytes(bytes)
    }
}

/// Answer to a [`PreviewRequest`].
///
/// `contents: None` means "not found" and serializes as `null`; it is distinct
/// from an empty body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewResponse {
    #[serde(rename = "requestID")]
    pub request_id: String,
    pub path: String,
    pub contents: Option<Contents>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl PreviewResponse {
    pub fn not_found(request_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            path: path.into(),
            contents: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn found(
        request_id: impl Into<String>,
        path: impl Into<String>,
        contents: Contents,
        headers: BTreeMap<String, String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            path: path.into(),
            contents: Some(contents),
            headers,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.contents.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case_ids() {
        let req = PreviewRequest {
            request_id: "r1".into(),
            path: "/p/index.html".into(),
            url: "http://127.0.0.1:1/preview/x/p/index.html".into(),
            source_tab_id: Some("t1".into()),
            popped_out: true,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["requestID"], "r1");
        assert_eq!(json["sourceTabID"], "t1");
        assert_eq!(json["poppedOut"], true);
    }

    #[test]
    fn request_optional_fields_default() {
        let req: PreviewRequest =
            serde_json::from_str(r#"{"requestID":"r1","path":"/a","url":"http://h/a"}"#).unwrap();
        assert!(req.source_tab_id.is_none());
        assert!(!req.popped_out);

        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("sourceTabID"));
        assert!(!json.contains("poppedOut"));
    }

    #[test]
    fn not_found_serializes_null_contents() {
        let resp = PreviewResponse::not_found("r1", "/a");
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json["contents"].is_null());
        assert!(json.get("headers").is_none());
    }

    #[test]
    fn empty_text_is_not_not_found() {
        let resp = PreviewResponse::found("r1", "/a", Contents::from(""), BTreeMap::new());
        assert!(!resp.is_not_found());
        let back: PreviewResponse =
            serde_json::from_str(&serde_json::to_string(&resp).unwrap()).unwrap();
        assert_eq!(back.contents, Some(Contents::Text(String::new())));
    }

    #[test]
    fn bytes_deserialize_from_number_array() {
        let resp: PreviewResponse =
            serde_json::from_str(r#"{"requestID":"r","path":"/a.png","contents":[137,80,78,71]}"#)
                .unwrap();
        assert_eq!(resp.contents, Some(Contents::Bytes(vec![137, 80, 78, 71])));
    }

    #[test]
    fn lossy_text_of_bytes() {
        let c = Contents::Bytes(b"<h1>x</h1>".to_vec());
        assert_eq!(c.to_text_lossy(), "<h1>x</h1>");
        assert_eq!(c.len(), 10);
    }
}
