//! Content resolution: which bytes a surface sees for a logical path.
//!
//! Precedence, highest first:
//! 1. virtual overlay entry, verbatim
//! 2. the live document (markdown rendered, HTML instrumented); a live
//!    markdown or HTML file the editor holds no text for is read from disk
//! 3. redirect for popped-out tabs asking for a stale, uninstrumented page
//! 4. text open in any editor tab
//! 5. disk
//!
//! Containment in the project root is checked before any tier is consulted.

use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use preview_protocol::{Contents, PreviewRequest, PreviewResponse};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::coordinator::PreviewTarget;
use crate::documents::{DocumentSource, FileReadError, LiveDocument, ProjectFiles};
use crate::error::PreviewError;
use crate::markdown::{self, MarkdownRenderer};
use crate::paths::{self, FileKind};
use crate::views::{self, LIVE_PREVIEW_MARKER, LiveReloadScript};

pub const HTML_CONTENT_TYPE: &str = "text/html;charset=UTF-8";

/// In-memory overrides keyed by logical path. Owned by the hub; surfaces never
/// write to it.
#[derive(Debug, Default)]
pub struct VirtualOverlay {
    entries: RwLock<HashMap<PathBuf, Contents>>,
}

impl VirtualOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &Path, contents: Contents) -> Option<Contents> {
        self.entries.write().insert(paths::normalize(path), contents)
    }

    pub fn remove(&self, path: &Path) -> Option<Contents> {
        self.entries.write().remove(&paths::normalize(path))
    }

    pub fn get(&self, path: &Path) -> Option<Contents> {
        self.entries.read().get(&paths::normalize(path)).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which tier answered a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    Overlay,
    LiveDocument,
    StaleRedirect,
    OpenDocument,
    Disk,
    /// Null content because the path was refused.
    Rejected,
    /// Null content because nothing had the path.
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub response: PreviewResponse,
    pub source: ContentSource,
}

/// Collaborators shared by every resolver the hub installs.
#[derive(Clone)]
pub struct ResolverDeps {
    pub overlay: Arc<VirtualOverlay>,
    pub documents: Arc<dyn DocumentSource>,
    pub files: Arc<dyn ProjectFiles>,
    pub renderer: Arc<dyn MarkdownRenderer>,
    pub script: LiveReloadScript,
    pub target: watch::Receiver<Option<PreviewTarget>>,
}

/// Resolves content for one project root.
pub struct ContentResolver {
    project_root: PathBuf,
    deps: ResolverDeps,
}

enum Stored {
    Text(String, ContentSource),
    Bytes(Vec<u8>),
    Escaped,
    Missing,
}

impl ContentResolver {
    pub fn new(project_root: &Path, deps: ResolverDeps) -> Self {
        Self {
            project_root: paths::normalize(project_root),
            deps,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Resolve `request` to a response. Only a markdown render failure is an
    /// error; every other miss is a null-content response.
    pub fn resolve(&self, request: &PreviewRequest) -> Result<Resolution, PreviewError> {
        let path = paths::normalize(Path::new(&request.path));

        if !paths::is_within(&path, &self.project_root) {
            warn!(
                request_id = %request.request_id,
                path = %request.path,
                "[RESOLVER] Rejected path outside project root"
            );
            return Ok(self.rejected(request));
        }

        let kind = FileKind::of(&path);
        let target = self.deps.target.borrow().clone();
        let target_path = target.as_ref().and_then(|t| t.path()).map(Path::to_path_buf);

        if let Some(contents) = self.deps.overlay.get(&path) {
            return Ok(self.found(request, contents, kind, ContentSource::Overlay));
        }

        let live = self
            .deps
            .documents
            .live_document()
            .or_else(|| self.live_from_disk(&path, kind));
        if let Some(live) = live {
            if live.path == path {
                let from_editing_context = target_path.as_deref() == Some(path.as_path());
                let contents = match kind {
                    FileKind::Markdown if from_editing_context => {
                        let body = self.deps.renderer.render(&live.text)?;
                        let title = markdown::title_of(&live.text).unwrap_or_else(|| file_name(&path));
                        let page = views::markdown_page(&title, &body, &self.deps.script);
                        return Ok(self.html(request, page, ContentSource::LiveDocument));
                    }
                    FileKind::Html => {
                        views::instrument_html(&live.text, &self.deps.script.render())
                    }
                    _ => live.text,
                };
                return Ok(self.found(request, contents.into(), kind, ContentSource::LiveDocument));
            }
        }

        let stored = self.stored(&path);

        if request.popped_out && kind == FileKind::Html {
            if let Some(PreviewTarget::File { path: current, url }) = target.as_ref() {
                let instrumented = match &stored {
                    Stored::Text(text, _) => text.contains(LIVE_PREVIEW_MARKER),
                    Stored::Bytes(bytes) => String::from_utf8_lossy(bytes).contains(LIVE_PREVIEW_MARKER),
                    Stored::Escaped | Stored::Missing => false,
                };
                if *current != path && !instrumented && !matches!(stored, Stored::Escaped) {
                    debug!(
                        request_id = %request.request_id,
                        stale = %path.display(),
                        current = %url,
                        "[RESOLVER] Redirecting popped-out tab to current preview"
                    );
                    return Ok(self.html(
                        request,
                        views::redirect_page(url),
                        ContentSource::StaleRedirect,
                    ));
                }
            }
        }

        Ok(match stored {
            Stored::Text(text, source) => self.found(request, text.into(), kind, source),
            Stored::Bytes(bytes) => self.found(request, bytes.into(), kind, ContentSource::Disk),
            Stored::Escaped => {
                warn!(
                    request_id = %request.request_id,
                    path = %request.path,
                    "[RESOLVER] Rejected path resolving outside project root"
                );
                self.rejected(request)
            }
            Stored::Missing => Resolution {
                response: PreviewResponse::not_found(&request.request_id, &request.path),
                source: ContentSource::Missing,
            },
        })
    }

    /// The saved text of the live document, when the editor has none.
    fn live_from_disk(&self, path: &Path, kind: FileKind) -> Option<LiveDocument> {
        if !matches!(kind, FileKind::Markdown | FileKind::Html) {
            return None;
        }
        if self.deps.documents.live_path().as_deref() != Some(path) {
            return None;
        }
        let bytes = self.deps.files.read(&self.project_root, path).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        Some(LiveDocument {
            path: path.to_path_buf(),
            text,
        })
    }

    /// Tiers 4 and 5.
    fn stored(&self, path: &Path) -> Stored {
        if let Some(text) = self.deps.documents.open_document_text(path) {
            return Stored::Text(text, ContentSource::OpenDocument);
        }
        match self.deps.files.read(&self.project_root, path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Stored::Text(text, ContentSource::Disk),
                Err(e) => Stored::Bytes(e.into_bytes()),
            },
            Err(FileReadError::Escapes) => Stored::Escaped,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "[RESOLVER] Disk read failed");
                Stored::Missing
            }
        }
    }

    fn found(
        &self,
        request: &PreviewRequest,
        contents: Contents,
        kind: FileKind,
        source: ContentSource,
    ) -> Resolution {
        let mut headers = BTreeMap::new();
        if kind == FileKind::Html {
            headers.insert("Content-Type".to_string(), HTML_CONTENT_TYPE.to_string());
        }
        Resolution {
            response: PreviewResponse::found(&request.request_id, &request.path, contents, headers),
            source,
        }
    }

    fn html(&self, request: &PreviewRequest, page: String, source: ContentSource) -> Resolution {
        self.found(request, page.into(), FileKind::Html, source)
    }

    fn rejected(&self, request: &PreviewRequest) -> Resolution {
        Resolution {
            response: PreviewResponse::not_found(&request.request_id, &request.path),
            source: ContentSource::Rejected,
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Holds the single authoritative resolver.
#[derive(Default)]
pub struct ResolverSlot {
    current: ArcSwapOption<ContentResolver>,
}

impl ResolverSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically install `new`, returning the resolver it replaced.
    pub fn set_active_resolver(
        &self,
        new: Option<Arc<ContentResolver>>,
    ) -> Option<Arc<ContentResolver>> {
        self.current.swap(new)
    }

    pub fn active(&self) -> Option<Arc<ContentResolver>> {
        self.current.load_full()
    }
}
