//! Per-process session identity and the URLs served under it.

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Characters escaped inside a single URL path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Reserved segment for pages the hub serves itself.
pub const RESERVED_SEGMENT: &str = "_preview";

/// Opaque identifier generated once per process. Namespaces served URLs so
/// two editor processes never cross-talk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstanceId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pages the hub serves under `/preview/{id}/_preview/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedPage {
    Loader,
    NoPreview,
    Trust,
}

impl ReservedPage {
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Loader => "loader",
            Self::NoPreview => "no-preview",
            Self::Trust => "trust",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "loader" => Some(Self::Loader),
            "no-preview" => Some(Self::NoPreview),
            "trust" => Some(Self::Trust),
            _ => None,
        }
    }
}

/// Maps between absolute project file paths and served preview URLs.
///
/// A file at `/home/u/site/index.html` is served at
/// `{base}/preview/{instance}/home/u/site/index.html`.
#[derive(Debug, Clone)]
pub struct PreviewUrls {
    base: String,
    instance_id: InstanceId,
}

impl PreviewUrls {
    /// `base` is the externally visible server URL, e.g. `http://127.0.0.1:4173`.
    /// A trailing slash is ignored; a path prefix is kept.
    pub fn new(base: &Url, instance_id: InstanceId) -> Self {
        Self {
            base: base.as_str().trim_end_matches('/').to_string(),
            instance_id,
        }
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// The origin surfaces served by us will report, e.g. `http://127.0.0.1:4173`.
    pub fn origin(&self) -> String {
        Url::parse(&self.base)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_else(|_| self.base.clone())
    }

    /// `/preview/{instance}` relative to the base.
    pub fn prefix(&self) -> String {
        format!("/preview/{}", self.instance_id)
    }

    pub fn url_for_path(&self, path: &Path) -> String {
        let mut encoded = String::new();
        for part in path.to_string_lossy().split('/').filter(|p| !p.is_empty()) {
            encoded.push('/');
            encoded.extend(utf8_percent_encode(part, SEGMENT));
        }
        if encoded.is_empty() {
            encoded.push('/');
        }
        format!("{}{}{}", self.base, self.prefix(), encoded)
    }

    /// Inverse of [`PreviewUrls::url_for_path`]. Query strings and fragments are
    /// ignored. Returns `None` for URLs outside this instance or for reserved pages.
    pub fn path_for_url(&self, url: &str) -> Option<PathBuf> {
        let rest = url.strip_prefix(&self.base)?;
        let rest = rest.split(['?', '#']).next().unwrap_or_default();
        self.path_for_route(rest.strip_prefix(&self.prefix())?)
    }

    /// Map the part of a request path after `/preview/{instance}` to a file path.
    pub fn path_for_route(&self, route: &str) -> Option<PathBuf> {
        if !route.starts_with('/') {
            return None;
        }
        let decoded = percent_decode_str(route).decode_utf8().ok()?;
        if decoded.trim_start_matches('/').starts_with(RESERVED_SEGMENT) {
            let after = &decoded.trim_start_matches('/')[RESERVED_SEGMENT.len()..];
            if after.is_empty() || after.starts_with('/') {
                return None;
            }
        }
        Some(PathBuf::from(decoded.into_owned()))
    }

    pub fn reserved_url(&self, page: ReservedPage) -> String {
        format!(
            "{}{}/{}/{}",
            self.base,
            self.prefix(),
            RESERVED_SEGMENT,
            page.slug()
        )
    }

    pub fn no_preview_url(&self) -> String {
        self.reserved_url(ReservedPage::NoPreview)
    }

    pub fn trust_url(&self) -> String {
        self.reserved_url(ReservedPage::Trust)
    }

    pub fn loader_url(&self) -> String {
        self.reserved_url(ReservedPage::Loader)
    }

    /// WebSocket endpoint for surfaces (`ws://` or `wss://`).
    pub fn socket_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base.clone()
        };
        format!("{ws_base}/api/preview/ws")
    }
}
