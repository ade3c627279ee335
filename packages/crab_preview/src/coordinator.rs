//! Decides which URL every preview surface should be showing.
//!
//! The coordinator is a synchronous state machine. Each transition returns the
//! navigation messages to publish; the hub owns the channels.

use percent_encoding::percent_decode_str;
use preview_protocol::NavigationMessage;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::paths::{self, FileKind};
use crate::session::PreviewUrls;

/// What the surfaces should display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewTarget {
    File { path: PathBuf, url: String },
    NoPreview { url: String },
    /// The project is not trusted yet. `pending` is the file that will be
    /// previewed once it is.
    AwaitingTrust { url: String, pending: Option<PathBuf> },
}

impl PreviewTarget {
    pub fn url(&self) -> &str {
        match self {
            Self::File { url, .. } | Self::NoPreview { url } | Self::AwaitingTrust { url, .. } => {
                url
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// A navigation message and, for unicast, the tab it is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub tab_id: Option<String>,
    pub message: NavigationMessage,
}

impl Outbound {
    fn broadcast(message: NavigationMessage) -> Self {
        Self {
            tab_id: None,
            message,
        }
    }
}

#[derive(Debug)]
enum State {
    Idle,
    Serving {
        project_root: PathBuf,
        active_file: Option<PathBuf>,
        target: PreviewTarget,
        /// Most recently selected previewable file, kept as a fallback for
        /// files it references.
        last_previewable: Option<PathBuf>,
    },
}

pub struct NavigationCoordinator {
    urls: PreviewUrls,
    state: State,
    target_tx: watch::Sender<Option<PreviewTarget>>,
}

impl NavigationCoordinator {
    pub fn new(urls: PreviewUrls) -> Self {
        let (target_tx, _) = watch::channel(None);
        Self {
            urls,
            state: State::Idle,
            target_tx,
        }
    }

    /// Follow the current target. `None` while idle.
    pub fn subscribe_target(&self) -> watch::Receiver<Option<PreviewTarget>> {
        self.target_tx.subscribe()
    }

    pub fn target(&self) -> Option<&PreviewTarget> {
        match &self.state {
            State::Idle => None,
            State::Serving { target, .. } => Some(target),
        }
    }

    pub fn current_url(&self) -> Option<&str> {
        self.target().map(PreviewTarget::url)
    }

    pub fn project_root(&self) -> Option<&Path> {
        match &self.state {
            State::Idle => None,
            State::Serving { project_root, .. } => Some(project_root),
        }
    }

    pub fn active_file(&self) -> Option<&Path> {
        match &self.state {
            State::Idle => None,
            State::Serving { active_file, .. } => active_file.as_deref(),
        }
    }

    /// The page whose text a selection may need to decide the fallback.
    pub fn fallback_candidate(&self) -> Option<&Path> {
        match &self.state {
            State::Idle => None,
            State::Serving {
                last_previewable, ..
            } => last_previewable.as_deref(),
        }
    }

    pub fn is_serving(&self) -> bool {
        matches!(self.state, State::Serving { .. })
    }

    /// Open `root` (from idle, or replacing the current project). Re-opening
    /// the current root is a no-op.
    pub fn open_project(&mut self, root: &Path, trusted: bool) -> Vec<Outbound> {
        let root = paths::normalize(root);
        if self.project_root() == Some(root.as_path()) {
            return Vec::new();
        }

        let target = if trusted {
            PreviewTarget::NoPreview {
                url: self.urls.no_preview_url(),
            }
        } else {
            PreviewTarget::AwaitingTrust {
                url: self.urls.trust_url(),
                pending: None,
            }
        };

        info!(
            "[COORDINATOR] Serving project {} (trusted={})",
            root.display(),
            trusted
        );

        let root_display = root.display().to_string();
        self.state = State::Serving {
            project_root: root,
            active_file: None,
            target: target.clone(),
            last_previewable: None,
        };
        self.target_tx.send_replace(Some(target));

        vec![Outbound::broadcast(NavigationMessage::ProjectSwitch {
            root: root_display,
        })]
    }

    pub fn close_project(&mut self) {
        if let State::Serving { project_root, .. } = &self.state {
            info!("[COORDINATOR] Closed project {}", project_root.display());
        }
        self.state = State::Idle;
        self.target_tx.send_replace(None);
    }

    /// The editor selected `path`. `read_text` gives the current text of a
    /// project file, used to decide whether a previewable page references it.
    ///
    /// `REDIRECT_PAGE` is only broadcast when the target URL changes.
    pub fn select_file(
        &mut self,
        path: &Path,
        trusted: bool,
        read_text: impl Fn(&Path) -> Option<String>,
    ) -> Vec<Outbound> {
        let path = paths::normalize(path);
        let State::Serving {
            project_root,
            active_file,
            target,
            last_previewable,
        } = &mut self.state
        else {
            debug!("[COORDINATOR] Ignoring selection of {} while idle", path.display());
            return Vec::new();
        };

        *active_file = Some(path.clone());
        let next = if trusted {
            choose_target(&self.urls, project_root, &path, last_previewable, read_text)
        } else {
            PreviewTarget::AwaitingTrust {
                url: self.urls.trust_url(),
                pending: Some(path),
            }
        };

        let changed = next.url() != target.url();
        *target = next.clone();
        self.target_tx.send_replace(Some(next.clone()));

        if changed {
            debug!("[COORDINATOR] Preview target now {}", next.url());
            vec![Outbound::broadcast(NavigationMessage::RedirectPage {
                url: next.url().to_string(),
                force: false,
            })]
        } else {
            Vec::new()
        }
    }

    /// The active project was acknowledged. Surfaces sitting on the trust
    /// placeholder are forced onto the real URL.
    pub fn mark_trusted(&mut self, read_text: impl Fn(&Path) -> Option<String>) -> Vec<Outbound> {
        let State::Serving {
            project_root,
            target,
            last_previewable,
            ..
        } = &mut self.state
        else {
            return Vec::new();
        };
        let PreviewTarget::AwaitingTrust { pending, .. } = target else {
            return Vec::new();
        };

        let next = match pending.take() {
            Some(path) => choose_target(&self.urls, project_root, &path, last_previewable, read_text),
            None => PreviewTarget::NoPreview {
                url: self.urls.no_preview_url(),
            },
        };

        *target = next.clone();
        self.target_tx.send_replace(Some(next.clone()));

        vec![Outbound::broadcast(NavigationMessage::RedirectPage {
            url: next.url().to_string(),
            force: true,
        })]
    }

    /// Unicast the current URL to the tab that asked.
    pub fn handle_get_initial_url(&self, tab_id: &str) -> Outbound {
        let url = self
            .current_url()
            .map(str::to_string)
            .unwrap_or_else(|| self.urls.no_preview_url());
        Outbound {
            tab_id: Some(tab_id.to_string()),
            message: NavigationMessage::InitialUrlNavigate {
                tab_id: tab_id.to_string(),
                url,
            },
        }
    }
}

/// Selection policy: the active file if previewable; otherwise the last
/// previewable file when it references the active one; otherwise nothing.
fn choose_target(
    urls: &PreviewUrls,
    project_root: &Path,
    active: &Path,
    last_previewable: &mut Option<PathBuf>,
    read_text: impl Fn(&Path) -> Option<String>,
) -> PreviewTarget {
    let no_preview = || PreviewTarget::NoPreview {
        url: urls.no_preview_url(),
    };

    if !paths::is_within(active, project_root) {
        return no_preview();
    }

    if FileKind::of(active).is_previewable() {
        *last_previewable = Some(active.to_path_buf());
        return PreviewTarget::File {
            path: active.to_path_buf(),
            url: urls.url_for_path(active),
        };
    }

    if let Some(last) = last_previewable.as_deref() {
        let links = matches!(FileKind::of(last), FileKind::Html | FileKind::Markdown);
        if links && paths::is_within(last, project_root) {
            if let Some(text) = read_text(last) {
                if references(&text, last, active, project_root) {
                    return PreviewTarget::File {
                        path: last.to_path_buf(),
                        url: urls.url_for_path(last),
                    };
                }
            }
        }
    }

    no_preview()
}

const REFERENCE_MARKERS: &[&str] = &["href=", "src=", "@import", "url(", "]("];

/// Whether the document at `doc_path` links, embeds or imports `target`.
///
/// Relative references resolve against the document's directory; references
/// starting with `/` resolve against the project root.
pub fn references(text: &str, doc_path: &Path, target: &Path, project_root: &Path) -> bool {
    let base = doc_path.parent().unwrap_or(project_root);
    let target = paths::normalize(target);

    REFERENCE_MARKERS.iter().any(|marker| {
        text.match_indices(marker).any(|(at, _)| {
            let Some(raw) = reference_after(&text[at + marker.len()..]) else {
                return false;
            };
            let Some(resolved) = resolve_reference(raw, base, project_root) else {
                return false;
            };
            resolved == target
        })
    })
}

/// Extract the reference following a marker: skips whitespace, an optional
/// `url(` and an optional quote.
fn reference_after(rest: &str) -> Option<&str> {
    let rest = rest.trim_start();
    let rest = rest.strip_prefix("url(").unwrap_or(rest).trim_start();
    let (quote, rest) = match rest.chars().next() {
        Some(q @ ('"' | '\'')) => (Some(q), &rest[1..]),
        _ => (None, rest),
    };
    let end = rest
        .find(|c: char| match quote {
            Some(q) => c == q,
            None => c.is_whitespace() || matches!(c, ')' | '>' | ';' | '"' | '\''),
        })
        .unwrap_or(rest.len());
    let reference = rest[..end].trim();
    (!reference.is_empty()).then_some(reference)
}

fn resolve_reference(raw: &str, base: &Path, project_root: &Path) -> Option<PathBuf> {
    let raw = raw.split(['?', '#']).next().unwrap_or_default();
    if raw.is_empty()
        || raw.contains("://")
        || raw.starts_with("//")
        || raw.starts_with("data:")
        || raw.starts_with("mailto:")
        || raw.starts_with("javascript:")
    {
        return None;
    }
    let decoded = percent_decode_str(raw).decode_utf8().ok()?;
    let resolved = match decoded.strip_prefix('/') {
        Some(from_root) => project_root.join(from_root),
        None => base.join(decoded.as_ref()),
    };
    Some(paths::normalize(&resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InstanceId;
    use std::collections::HashMap;
    use url::Url;

    fn coordinator() -> NavigationCoordinator {
        let base = Url::parse("http://127.0.0.1:4173").unwrap();
        NavigationCoordinator::new(PreviewUrls::new(&base, InstanceId::from("i")))
    }

    fn url_of(path: &str) -> String {
        format!("http://127.0.0.1:4173/preview/i{path}")
    }

    fn no_files(_: &Path) -> Option<String> {
        None
    }

    fn redirect(outbound: &[Outbound]) -> Option<(&str, bool)> {
        outbound.iter().find_map(|o| match &o.message {
            NavigationMessage::RedirectPage { url, force } => Some((url.as_str(), *force)),
            _ => None,
        })
    }

    #[test]
    fn idle_to_serving_broadcasts_project_switch() {
        let mut coord = coordinator();
        assert!(!coord.is_serving());
        let rx = coord.subscribe_target();

        let out = coord.open_project(Path::new("/work/site"), true);
        assert_eq!(
            out,
            vec![Outbound {
                tab_id: None,
                message: NavigationMessage::ProjectSwitch {
                    root: "/work/site".into()
                }
            }]
        );
        assert!(coord.is_serving());
        assert!(matches!(&*rx.borrow(), Some(PreviewTarget::NoPreview { .. })));

        assert!(coord.open_project(Path::new("/work/site/"), true).is_empty());
    }

    #[test]
    fn selecting_previewable_file_redirects_once() {
        let mut coord = coordinator();
        coord.open_project(Path::new("/work/site"), true);

        let out = coord.select_file(Path::new("/work/site/index.html"), true, no_files);
        assert_eq!(redirect(&out), Some((url_of("/work/site/index.html").as_str(), false)));

        let again = coord.select_file(Path::new("/work/site/index.html"), true, no_files);
        assert!(again.is_empty());
        assert_eq!(coord.active_file(), Some(Path::new("/work/site/index.html")));
    }

    #[test]
    fn stylesheet_falls_back_to_linking_page() {
        let files: HashMap<PathBuf, String> = [(
            PathBuf::from("/work/site/index.html"),
            r#"<link rel="stylesheet" href="css/main.css?v=2"><img src=/img/logo.png>"#.to_string(),
        )]
        .into_iter()
        .collect();
        let read = |p: &Path| files.get(p).cloned();

        let mut coord = coordinator();
        coord.open_project(Path::new("/work/site"), true);
        coord.select_file(Path::new("/work/site/index.html"), true, read);

        let out = coord.select_file(Path::new("/work/site/css/main.css"), true, read);
        assert!(out.is_empty(), "target unchanged, no redirect");
        assert_eq!(
            coord.target().and_then(PreviewTarget::path),
            Some(Path::new("/work/site/index.html"))
        );

        let out = coord.select_file(Path::new("/work/site/app.rs"), true, read);
        assert_eq!(
            redirect(&out),
            Some(("http://127.0.0.1:4173/preview/i/_preview/no-preview", false))
        );
    }

    #[test]
    fn unrelated_stylesheet_shows_no_preview() {
        let read = |_: &Path| Some("<p>no links</p>".to_string());
        let mut coord = coordinator();
        coord.open_project(Path::new("/work/site"), true);
        coord.select_file(Path::new("/work/site/index.html"), true, read);

        coord.select_file(Path::new("/work/site/other.css"), true, read);
        assert!(matches!(coord.target(), Some(PreviewTarget::NoPreview { .. })));
    }

    #[test]
    fn untrusted_project_waits_then_forces_real_url() {
        let mut coord = coordinator();
        coord.open_project(Path::new("/work/site"), false);
        assert_eq!(
            coord.current_url(),
            Some("http://127.0.0.1:4173/preview/i/_preview/trust")
        );

        let out = coord.select_file(Path::new("/work/site/index.html"), false, no_files);
        assert!(out.is_empty(), "still on the trust page");

        let out = coord.mark_trusted(no_files);
        assert_eq!(redirect(&out), Some((url_of("/work/site/index.html").as_str(), true)));
        assert!(coord.mark_trusted(no_files).is_empty());
    }

    #[test]
    fn initial_url_is_unicast() {
        let mut coord = coordinator();
        let out = coord.handle_get_initial_url("tab-1");
        assert_eq!(out.tab_id.as_deref(), Some("tab-1"));
        assert_eq!(
            out.message,
            NavigationMessage::InitialUrlNavigate {
                tab_id: "tab-1".into(),
                url: "http://127.0.0.1:4173/preview/i/_preview/no-preview".into()
            }
        );

        coord.open_project(Path::new("/work/site"), true);
        coord.select_file(Path::new("/work/site/a.md"), true, no_files);
        let out = coord.handle_get_initial_url("tab-2");
        assert!(matches!(
            out.message,
            NavigationMessage::InitialUrlNavigate { ref url, .. } if *url == url_of("/work/site/a.md")
        ));
    }

    #[test]
    fn selection_outside_root_is_not_previewed() {
        let mut coord = coordinator();
        coord.open_project(Path::new("/work/site"), true);
        coord.select_file(Path::new("/etc/index.html"), true, no_files);
        assert!(matches!(coord.target(), Some(PreviewTarget::NoPreview { .. })));
    }

    #[test]
    fn close_returns_to_idle() {
        let mut coord = coordinator();
        let rx = coord.subscribe_target();
        coord.open_project(Path::new("/work/site"), true);
        coord.close_project();
        assert!(!coord.is_serving());
        assert!(rx.borrow().is_none());
        assert!(coord.select_file(Path::new("/work/site/a.html"), true, no_files).is_empty());
    }

    #[test]
    fn reference_forms() {
        let root = Path::new("/p");
        let doc = Path::new("/p/pages/index.html");
        let css = Path::new("/p/pages/style.css");

        assert!(references(r#"<link href="style.css">"#, doc, css, root));
        assert!(references("<link href='./style.css'>", doc, css, root));
        assert!(references("@import url(\"style.css\");", doc, css, root));
        assert!(references("@import 'style.css';", doc, css, root));
        assert!(references("<div style=\"background: url(style.css)\">", doc, css, root));
        assert!(references("<link href=/pages/style.css>", doc, css, root));
        assert!(references("[styles](style%2Ecss)", doc, css, root));
        assert!(!references("<link href=\"https://cdn/x/style.css\">", doc, css, root));
        assert!(!references("<link href=\"../style.css\">", doc, css, root));
    }
}
