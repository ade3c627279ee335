//! Per-project trust and the origin allowlist.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::info;
use url::Url;

use crate::paths;

/// Acknowledgment for one project root. Lives for the process only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustRecord {
    pub root: PathBuf,
    pub acknowledged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustState {
    Unacknowledged,
    Trusted,
}

/// Unacknowledged → Trusted, never back for the same root within a session.
#[derive(Debug, Default)]
pub struct TrustGate {
    records: HashMap<PathBuf, TrustRecord>,
    active_root: Option<PathBuf>,
    /// Root the user is currently being asked about.
    pending_prompt: Option<PathBuf>,
}

impl TrustGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_trusted(&self, root: &Path) -> bool {
        self.records.contains_key(&paths::normalize(root))
    }

    pub fn record(&self, root: &Path) -> Option<&TrustRecord> {
        self.records.get(&paths::normalize(root))
    }

    /// Returns true when `root` was not trusted before.
    pub fn mark_trusted(&mut self, root: &Path) -> bool {
        let root = paths::normalize(root);
        if self.pending_prompt.as_deref() == Some(root.as_path()) {
            self.pending_prompt = None;
        }
        if self.records.contains_key(&root) {
            return false;
        }
        info!("[TRUST] Project trusted: {}", root.display());
        self.records.insert(
            root.clone(),
            TrustRecord {
                root,
                acknowledged_at: Utc::now(),
            },
        );
        true
    }

    /// Make `new_root` the active root. Pending acknowledgment for the previous
    /// root is cleared; trust already granted to any root is kept.
    pub fn on_project_switch(&mut self, new_root: &Path) -> TrustState {
        let new_root = paths::normalize(new_root);
        self.active_root = Some(new_root.clone());
        if self.records.contains_key(&new_root) {
            self.pending_prompt = None;
            TrustState::Trusted
        } else {
            self.pending_prompt = Some(new_root);
            TrustState::Unacknowledged
        }
    }

    pub fn on_project_close(&mut self) {
        self.active_root = None;
        self.pending_prompt = None;
    }

    pub fn active_root(&self) -> Option<&Path> {
        self.active_root.as_deref()
    }

    pub fn pending_prompt(&self) -> Option<&Path> {
        self.pending_prompt.as_deref()
    }

    /// Trust state of the active root, `None` when no project is open.
    pub fn active_state(&self) -> Option<TrustState> {
        self.active_root.as_ref().map(|root| {
            if self.records.contains_key(root) {
                TrustState::Trusted
            } else {
                TrustState::Unacknowledged
            }
        })
    }
}

/// Reduce an `Origin` header value to `scheme://host[:port]`, lowercased.
/// Opaque and empty origins yield `None`.
pub fn normalize_origin(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
        return None;
    }
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;
    let mut origin = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        origin.push_str(&format!(":{port}"));
    }
    Some(origin.to_ascii_lowercase())
}

/// Origins allowed to put messages on the channels.
#[derive(Debug, Clone)]
pub struct OriginAllowlist {
    origins: HashSet<String>,
}

/// Embedding shells that host the editor itself.
const SHELL_ORIGINS: &[&str] = &["tauri://localhost", "http://tauri.localhost", "https://tauri.localhost"];

impl OriginAllowlist {
    /// The server's own origin (plus its loopback aliases), the desktop shell
    /// origins, and `extra`.
    pub fn new(server_origin: &str, extra: &[String]) -> Self {
        let mut origins = HashSet::new();
        if let Some(own) = normalize_origin(server_origin) {
            for alias in ["://127.0.0.1", "://localhost", "://[::1]"] {
                for from in ["://127.0.0.1", "://localhost", "://[::1]"] {
                    if own.contains(from) {
                        origins.insert(own.replacen(from, alias, 1));
                    }
                }
            }
            origins.insert(own);
        }
        for origin in SHELL_ORIGINS.iter().copied().map(str::to_string).chain(extra.iter().cloned()) {
            if let Some(normalized) = normalize_origin(&origin) {
                origins.insert(normalized);
            }
        }
        Self { origins }
    }

    pub fn allows(&self, origin: &str) -> bool {
        normalize_origin(origin).is_some_and(|o| self.origins.contains(&o))
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}
