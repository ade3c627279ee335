//! The live preview hub: one per editor process.
//!
//! Owns the channel router, the surface registry, the trust gate and the
//! navigation coordinator, and keeps the active content resolver in step with
//! the open project. Editor-facing operations are synchronous; the channel
//! loops run on tokio tasks started by [`PreviewHub::start`].
//!
//! Lock order when more than one is held: coordinator, then trust. The
//! registry lock is never held together with either.

use parking_lot::Mutex;
use preview_protocol::{
    Contents, EditorEvent, NavigationMessage, PreviewRequest, PreviewResponse, RelayMessage,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PreviewConfig;
use crate::coordinator::{NavigationCoordinator, Outbound, PreviewTarget, references};
use crate::dispatch::{dispatch_navigation, dispatch_relay};
use crate::documents::{DiskFiles, DocumentSource, OpenDocuments, ProjectFiles};
use crate::error::PreviewError;
use crate::markdown::{CommonMarkRenderer, MarkdownRenderer};
use crate::metrics::{HealthStatus, PreviewMetrics};
use crate::paths;
use crate::registry::{HeartbeatOutcome, TabRegistry};
use crate::resolver::{
    ContentResolver, ContentSource, Resolution, ResolverDeps, ResolverSlot, VirtualOverlay,
};
use crate::router::ChannelRouter;
use crate::session::{InstanceId, PreviewUrls, ReservedPage};
use crate::trust::{OriginAllowlist, TrustGate, TrustState};
use crate::views::{self, LiveReloadScript};

/// Surface lifecycle notifications for the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    SurfaceOpened { tab_id: String, url: String },
    SurfaceClosed { tab_id: String },
}

pub struct PreviewHub {
    urls: PreviewUrls,
    config: PreviewConfig,
    router: Arc<ChannelRouter>,
    coordinator: Mutex<NavigationCoordinator>,
    trust: Mutex<TrustGate>,
    registry: Mutex<TabRegistry>,
    overlay: Arc<VirtualOverlay>,
    documents: Arc<OpenDocuments>,
    files: Arc<dyn ProjectFiles>,
    renderer: Arc<dyn MarkdownRenderer>,
    resolvers: ResolverSlot,
    target_rx: watch::Receiver<Option<PreviewTarget>>,
    script: LiveReloadScript,
    events: broadcast::Sender<HubEvent>,
    metrics: Arc<PreviewMetrics>,
    cancel: CancellationToken,
}

impl PreviewHub {
    pub fn new(urls: PreviewUrls, config: PreviewConfig, metrics: Arc<PreviewMetrics>) -> Arc<Self> {
        let files = Arc::new(DiskFiles::new(config.max_file_bytes));
        Self::with_collaborators(urls, config, metrics, files, Arc::new(CommonMarkRenderer))
    }

    /// Build a hub reading project files and rendering markdown through the
    /// given collaborators.
    pub fn with_collaborators(
        urls: PreviewUrls,
        config: PreviewConfig,
        metrics: Arc<PreviewMetrics>,
        files: Arc<dyn ProjectFiles>,
        renderer: Arc<dyn MarkdownRenderer>,
    ) -> Arc<Self> {
        let allowlist = OriginAllowlist::new(&urls.origin(), &config.allowed_origins);
        let router = Arc::new(ChannelRouter::new(
            urls.instance_id().clone(),
            allowlist,
            config.channel_capacity,
            metrics.clone(),
        ));
        let coordinator = NavigationCoordinator::new(urls.clone());
        let target_rx = coordinator.subscribe_target();
        let script = LiveReloadScript::new(
            urls.socket_url(),
            config.heartbeat_interval.as_millis() as u64,
        );
        let (events, _) = broadcast::channel(config.channel_capacity);

        info!(
            "[HUB {}] Live preview hub ready at {}",
            urls.instance_id(),
            urls.base()
        );

        Arc::new(Self {
            registry: Mutex::new(TabRegistry::new(config.liveness_timeout)),
            urls,
            config,
            router,
            coordinator: Mutex::new(coordinator),
            trust: Mutex::new(TrustGate::new()),
            overlay: Arc::new(VirtualOverlay::new()),
            documents: Arc::new(OpenDocuments::new()),
            files,
            renderer,
            resolvers: ResolverSlot::new(),
            target_rx,
            script,
            events,
            metrics,
            cancel: CancellationToken::new(),
        })
    }

    pub fn instance_id(&self) -> &InstanceId {
        self.urls.instance_id()
    }

    pub fn urls(&self) -> &PreviewUrls {
        &self.urls
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<ChannelRouter> {
        &self.router
    }

    pub fn metrics(&self) -> &Arc<PreviewMetrics> {
        &self.metrics
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // Editor-facing operations
    // =========================================================================

    /// Serve `root`, replacing whatever project was open. Surfaces are told
    /// about the switch and land on a placeholder until a file is selected.
    pub fn open_project(&self, root: &Path) {
        let root = paths::normalize(root);
        let outbound = {
            let mut coordinator = self.coordinator.lock();
            if coordinator.project_root() == Some(root.as_path()) {
                debug!("[HUB] Project {} already open", root.display());
                return;
            }
            let state = self.trust.lock().on_project_switch(&root);
            coordinator.open_project(&root, state == TrustState::Trusted)
        };

        self.documents.set_live(None);
        let resolver = Arc::new(ContentResolver::new(&root, self.resolver_deps()));
        if let Some(previous) = self.resolvers.set_active_resolver(Some(resolver)) {
            debug!(
                "[HUB] Replaced resolver for {}",
                previous.project_root().display()
            );
        }
        self.publish(outbound);
    }

    pub fn close_project(&self) {
        {
            let mut coordinator = self.coordinator.lock();
            coordinator.close_project();
            self.trust.lock().on_project_close();
        }
        self.documents.set_live(None);
        self.resolvers.set_active_resolver(None);
    }

    /// The editor focused `path`. It becomes the live document when the
    /// editor has its text.
    pub fn select_file(&self, path: &Path) {
        let path = paths::normalize(path);
        self.documents.set_live(Some(&path));
        let fallback = self.prefetch_fallback();
        let outbound = {
            let mut coordinator = self.coordinator.lock();
            let trusted = coordinator
                .project_root()
                .is_some_and(|root| self.trust.lock().is_trusted(root));
            coordinator.select_file(&path, trusted, |p| fallback.text_of(p))
        };
        self.publish(outbound);
    }

    /// New editor text for `path`. Surfaces showing it are told to reload.
    pub fn update_document(&self, path: &Path, text: String) {
        let path = paths::normalize(path);
        if self.documents.update(&path, text) {
            self.reload_if_shown(&path);
        }
    }

    pub fn close_document(&self, path: &Path) {
        let path = paths::normalize(path);
        if self.documents.close(&path) {
            self.reload_if_shown(&path);
        }
    }

    /// Serve `contents` for `path` ahead of every other source.
    pub fn set_overlay(&self, path: &Path, contents: Contents) {
        let path = paths::normalize(path);
        self.overlay.insert(&path, contents);
        self.reload_if_shown(&path);
    }

    pub fn remove_overlay(&self, path: &Path) -> bool {
        let path = paths::normalize(path);
        let removed = self.overlay.remove(&path).is_some();
        if removed {
            self.reload_if_shown(&path);
        }
        removed
    }

    /// The user acknowledged the open project. Returns false when no project
    /// is open or it was already trusted.
    pub fn mark_trusted(&self) -> bool {
        let fallback = self.prefetch_fallback();
        let (newly_trusted, outbound) = {
            let mut coordinator = self.coordinator.lock();
            let Some(root) = coordinator.project_root().map(Path::to_path_buf) else {
                return false;
            };
            let newly_trusted = self.trust.lock().mark_trusted(&root);
            (newly_trusted, coordinator.mark_trusted(|p| fallback.text_of(p)))
        };
        self.publish(outbound);
        newly_trusted
    }

    pub fn is_trusted(&self, root: &Path) -> bool {
        self.trust.lock().is_trusted(root)
    }

    pub fn project_root(&self) -> Option<PathBuf> {
        self.coordinator.lock().project_root().map(Path::to_path_buf)
    }

    pub fn current_url(&self) -> Option<String> {
        self.coordinator.lock().current_url().map(str::to_string)
    }

    pub fn target(&self) -> Option<PreviewTarget> {
        self.target_rx.borrow().clone()
    }

    /// No surface is connected.
    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }

    pub fn content_surface_count(&self) -> usize {
        self.registry.lock().content_surface_count()
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "ok".to_string(),
            instance_id: self.instance_id().to_string(),
            project_root: self.project_root().map(|r| r.display().to_string()),
            content_surfaces: self.content_surface_count(),
            connections: self.metrics.snapshot().connections.active,
            uptime_secs: self.metrics.uptime_secs(),
        }
    }

    /// Body of a page the hub serves itself.
    pub fn reserved_page(&self, page: ReservedPage) -> String {
        match page {
            ReservedPage::Loader => views::loader_page(
                &self.urls.socket_url(),
                self.config.heartbeat_interval.as_millis() as u64,
            ),
            ReservedPage::NoPreview => views::no_preview_page(&self.script),
            ReservedPage::Trust => {
                let root = self.project_root().map(|r| r.display().to_string());
                views::trust_page(root.as_deref(), &self.script)
            }
        }
    }

    // =========================================================================
    // Content
    // =========================================================================

    /// Resolve a request against the active project. Untrusted projects and
    /// the idle hub answer with null content.
    pub fn resolve(&self, request: &PreviewRequest) -> Result<Resolution, PreviewError> {
        let Some(resolver) = self.resolvers.active() else {
            debug!(
                request_id = %request.request_id,
                "[HUB] No project open; nothing to serve"
            );
            return Ok(Resolution {
                response: PreviewResponse::not_found(&request.request_id, &request.path),
                source: ContentSource::Missing,
            });
        };

        if !self.trust.lock().is_trusted(resolver.project_root()) {
            self.metrics.security_rejection();
            warn!(
                request_id = %request.request_id,
                path = %request.path,
                "[HUB] Refusing content from untrusted project"
            );
            return Ok(Resolution {
                response: PreviewResponse::not_found(&request.request_id, &request.path),
                source: ContentSource::Rejected,
            });
        }

        let resolution = resolver.resolve(request)?;
        if resolution.source == ContentSource::Rejected {
            self.metrics.security_rejection();
        }
        Ok(resolution)
    }

    /// Answer a `GET_CONTENT` on the relay, scoped to the asking tab.
    pub(crate) async fn serve_content(self: Arc<Self>, tab_id: Option<String>, request: PreviewRequest) {
        let hub = Arc::clone(&self);
        let req = request.clone();
        let response = match tokio::task::spawn_blocking(move || hub.resolve(&req)).await {
            Ok(Ok(resolution)) => resolution.response,
            Ok(Err(e)) => {
                if matches!(e, PreviewError::RenderFailure(_)) {
                    self.metrics.render_failure();
                }
                error!(
                    request_id = %request.request_id,
                    path = %request.path,
                    "[HUB] Failed to resolve content: {}", e
                );
                PreviewResponse::not_found(&request.request_id, &request.path)
            }
            Err(e) => {
                error!(
                    request_id = %request.request_id,
                    "[HUB] Resolver task failed: {}", e
                );
                PreviewResponse::not_found(&request.request_id, &request.path)
            }
        };

        self.metrics.request_served(!response.is_not_found());
        self.router
            .publish_relay(tab_id, RelayMessage::RequestResponse(response));
    }

    // =========================================================================
    // Surfaces
    // =========================================================================

    pub(crate) fn record_heartbeat(&self, tab_id: &str, url: &str, is_loader: bool) {
        let (outcome, before, count) = {
            let mut registry = self.registry.lock();
            let before = registry.content_surface_count();
            let outcome = registry.record_heartbeat(tab_id, url, is_loader, Instant::now());
            (outcome, before, registry.content_surface_count())
        };

        match outcome {
            HeartbeatOutcome::New | HeartbeatOutcome::KindChanged if !is_loader => {
                self.metrics.surface_opened();
                info!("[HUB] Preview surface {} opened at {}", tab_id, url);
                let _ = self.events.send(HubEvent::SurfaceOpened {
                    tab_id: tab_id.to_string(),
                    url: url.to_string(),
                });
            }
            HeartbeatOutcome::KindChanged => {
                self.metrics.surface_closed();
                info!("[HUB] Preview surface {} became a loader", tab_id);
                let _ = self.events.send(HubEvent::SurfaceClosed {
                    tab_id: tab_id.to_string(),
                });
            }
            HeartbeatOutcome::New | HeartbeatOutcome::Refreshed => {}
        }

        if count != before {
            self.router
                .publish_editor_event(None, EditorEvent::ConnectionCount { count });
        }
    }

    pub(crate) fn update_tab_url(&self, tab_id: &str, url: &str) {
        if !self.registry.lock().update_url(tab_id, url) {
            debug!("[HUB] Navigation from unknown tab {}", tab_id);
        }
    }

    pub(crate) fn answer_initial_url(&self, tab_id: &str) {
        let outbound = self.coordinator.lock().handle_get_initial_url(tab_id);
        self.publish(vec![outbound]);
    }

    /// Evict surfaces that stopped heartbeating.
    pub fn sweep(&self) {
        let (evicted, count) = {
            let mut registry = self.registry.lock();
            let evicted = registry.sweep(Instant::now());
            (evicted, registry.content_surface_count())
        };

        let mut content_closed = false;
        for record in evicted {
            if record.is_loader {
                self.metrics.loader_evicted();
                debug!("[HUB] Loader {} went silent", record.tab_id);
                continue;
            }
            content_closed = true;
            self.metrics.surface_closed();
            info!("[HUB] Preview surface {} closed", record.tab_id);
            let _ = self.events.send(HubEvent::SurfaceClosed {
                tab_id: record.tab_id,
            });
        }

        if content_closed {
            self.router
                .publish_editor_event(None, EditorEvent::ConnectionCount { count });
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawn the channel loops and the liveness sweep. They run until
    /// [`PreviewHub::shutdown`].
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(3);

        let mut nav_rx = self.router.subscribe_navigation();
        let hub = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = hub.cancel.cancelled() => break,
                    result = nav_rx.recv() => match result {
                        Ok(envelope) => {
                            dispatch_navigation(&hub, envelope);
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("[HUB] Navigation loop lagged by {} messages", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            debug!("[HUB] Navigation loop stopped");
        }));

        let mut relay_rx = self.router.subscribe_relay();
        let hub = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = hub.cancel.cancelled() => break,
                    result = relay_rx.recv() => match result {
                        Ok(envelope) => {
                            dispatch_relay(&hub, envelope);
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("[HUB] Relay loop lagged by {} messages", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            debug!("[HUB] Relay loop stopped");
        }));

        let hub = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(hub.config.heartbeat_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = hub.cancel.cancelled() => break,
                    _ = interval.tick() => hub.sweep(),
                }
            }
            debug!("[HUB] Liveness sweep stopped");
        }));

        handles
    }

    /// Token cancelled on shutdown, for tasks that should stop with the hub.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn shutdown(&self) {
        info!("[HUB {}] Shutting down", self.instance_id());
        self.cancel.cancel();
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn resolver_deps(&self) -> ResolverDeps {
        ResolverDeps {
            overlay: self.overlay.clone(),
            documents: self.documents.clone() as Arc<dyn DocumentSource>,
            files: self.files.clone(),
            renderer: self.renderer.clone(),
            script: self.script.clone(),
            target: self.target_rx.clone(),
        }
    }

    /// Read the coordinator's fallback page before its lock is taken again,
    /// so no file I/O happens under the lock.
    fn prefetch_fallback(&self) -> Prefetched {
        let candidate = self
            .coordinator
            .lock()
            .fallback_candidate()
            .map(Path::to_path_buf);
        match candidate {
            Some(path) => Prefetched {
                text: self.read_text(&path),
                path: Some(path),
            },
            None => Prefetched::default(),
        }
    }

    /// Current text of a project file: editor buffer first, then disk.
    fn read_text(&self, path: &Path) -> Option<String> {
        if let Some(text) = self.documents.text(path) {
            return Some(text);
        }
        let root = self.resolvers.active()?.project_root().to_path_buf();
        let bytes = self.files.read(&root, path).ok()?;
        String::from_utf8(bytes).ok()
    }

    /// Ask surfaces to reload when `path` is what they show, or what the
    /// preview was chosen for.
    fn reload_if_shown(&self, path: &Path) {
        let (target, url, root) = {
            let coordinator = self.coordinator.lock();
            let Some(PreviewTarget::File { path: target, url }) = coordinator.target() else {
                return;
            };
            if target == path || coordinator.active_file() == Some(path) {
                (None, url.clone(), None)
            } else {
                (
                    Some(target.clone()),
                    url.clone(),
                    coordinator.project_root().map(Path::to_path_buf),
                )
            }
        };

        // A dependency of the previewed page changed.
        if let (Some(target), Some(root)) = (target, root) {
            let linked = self
                .read_text(&target)
                .is_some_and(|text| references(&text, &target, path, &root));
            if !linked {
                return;
            }
        }

        debug!("[HUB] Reloading surfaces showing {}", url);
        self.router
            .publish_editor_event(None, EditorEvent::Reload { url });
    }

    fn publish(&self, outbound: Vec<Outbound>) {
        for Outbound { tab_id, message } in outbound {
            if let NavigationMessage::ProjectSwitch { root } = &message {
                info!("[HUB] Project switch to {}", root);
            }
            self.router.publish_navigation(tab_id, message);
        }
    }
}

/// Text read ahead of a coordinator transition.
#[derive(Default)]
struct Prefetched {
    path: Option<PathBuf>,
    text: Option<String>,
}

impl Prefetched {
    fn text_of(&self, path: &Path) -> Option<String> {
        if self.path.as_deref() == Some(path) {
            self.text.clone()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::FileReadError;
    use crate::router::FrameSource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{OnceLock, Weak};
    use std::time::Duration;
    use url::Url;

    const OWN: &str = "http://127.0.0.1:4173";

    fn hub() -> Arc<PreviewHub> {
        let urls = PreviewUrls::new(&Url::parse(OWN).unwrap(), InstanceId::from("test"));
        PreviewHub::new(urls, PreviewConfig::default(), Arc::new(PreviewMetrics::new()))
    }

    fn request(id: &str, path: &Path) -> PreviewRequest {
        PreviewRequest {
            request_id: id.into(),
            path: path.display().to_string(),
            url: String::new(),
            source_tab_id: None,
            popped_out: false,
        }
    }

    #[test]
    fn untrusted_project_serves_nothing_until_acknowledged() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        std::fs::write(root.join("index.html"), "<p>hi</p>").unwrap();
        let hub = hub();
        let mut nav = hub.router().subscribe_navigation();

        hub.open_project(&root);
        assert!(matches!(
            nav.try_recv().unwrap().message,
            NavigationMessage::ProjectSwitch { .. }
        ));
        assert!(matches!(hub.target(), Some(PreviewTarget::AwaitingTrust { .. })));

        let index = root.join("index.html");
        hub.select_file(&index);
        let res = hub.resolve(&request("r1", &index)).unwrap();
        assert_eq!(res.source, ContentSource::Rejected);

        assert!(hub.mark_trusted());
        let env = nav.try_recv().unwrap();
        assert_eq!(
            env.message,
            NavigationMessage::RedirectPage {
                url: hub.urls().url_for_path(&index),
                force: true,
            }
        );

        let res = hub.resolve(&request("r2", &index)).unwrap();
        assert_eq!(res.source, ContentSource::LiveDocument);
        assert!(!hub.mark_trusted());
    }

    /// Disk access that notes whether the coordinator lock was held.
    struct LockAwareFiles {
        inner: DiskFiles,
        hub: OnceLock<Weak<PreviewHub>>,
        reads: AtomicUsize,
        reads_under_lock: AtomicUsize,
    }

    impl ProjectFiles for LockAwareFiles {
        fn read(&self, root: &Path, path: &Path) -> Result<Vec<u8>, FileReadError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if let Some(hub) = self.hub.get().and_then(Weak::upgrade) {
                if hub.coordinator.is_locked() {
                    self.reads_under_lock.fetch_add(1, Ordering::SeqCst);
                }
            }
            self.inner.read(root, path)
        }
    }

    #[test]
    fn selection_reads_files_outside_the_coordinator_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let index = root.join("index.html");
        let style = root.join("style.css");
        std::fs::write(&index, r#"<link rel="stylesheet" href="style.css">"#).unwrap();
        std::fs::write(&style, "body{}").unwrap();

        let files = Arc::new(LockAwareFiles {
            inner: DiskFiles::new(1024 * 1024),
            hub: OnceLock::new(),
            reads: AtomicUsize::new(0),
            reads_under_lock: AtomicUsize::new(0),
        });
        let urls = PreviewUrls::new(&Url::parse(OWN).unwrap(), InstanceId::from("test"));
        let hub = PreviewHub::with_collaborators(
            urls,
            PreviewConfig::default(),
            Arc::new(PreviewMetrics::new()),
            files.clone(),
            Arc::new(CommonMarkRenderer),
        );
        let _ = files.hub.set(Arc::downgrade(&hub));

        hub.open_project(&root);
        hub.mark_trusted();
        hub.select_file(&index);
        hub.select_file(&style);

        // The stylesheet keeps the page that links it on screen.
        assert_eq!(
            hub.target().and_then(|t| t.path().map(Path::to_path_buf)),
            Some(index)
        );

        assert!(files.reads.load(Ordering::SeqCst) >= 1);
        assert_eq!(files.reads_under_lock.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn switching_projects_retires_the_old_resolver() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let a_root = a.path().canonicalize().unwrap();
        let b_root = b.path().canonicalize().unwrap();
        std::fs::write(a_root.join("a.html"), "a").unwrap();

        let hub = hub();
        hub.open_project(&a_root);
        hub.mark_trusted();
        assert!(!hub.resolve(&request("1", &a_root.join("a.html"))).unwrap().response.is_not_found());

        hub.open_project(&b_root);
        hub.mark_trusted();
        let res = hub.resolve(&request("2", &a_root.join("a.html"))).unwrap();
        assert_eq!(res.source, ContentSource::Rejected);
        assert!(hub.is_trusted(&a_root));
    }

    #[test]
    fn editing_the_previewed_file_reloads_surfaces() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let page = root.join("page.md");
        let hub = hub();
        hub.open_project(&root);
        hub.mark_trusted();
        hub.select_file(&page);

        let mut out = hub.router().subscribe_broadcast_out();
        hub.update_document(&page, "# One".into());
        let env = out.try_recv().unwrap();
        assert_eq!(
            env.message,
            EditorEvent::Reload {
                url: hub.urls().url_for_path(&page)
            }
        );

        // Same text again is not a change.
        hub.update_document(&page, "# One".into());
        assert!(out.try_recv().is_err());

        let res = hub.resolve(&request("r", &page)).unwrap();
        assert_eq!(res.source, ContentSource::LiveDocument);
    }

    #[tokio::test(start_paused = true)]
    async fn surfaces_open_and_expire() {
        let hub = hub();
        let mut events = hub.subscribe_events();
        let mut out = hub.router().subscribe_broadcast_out();

        hub.record_heartbeat("loader", "u", true);
        hub.record_heartbeat("t1", "u", false);
        assert_eq!(
            events.try_recv().unwrap(),
            HubEvent::SurfaceOpened {
                tab_id: "t1".into(),
                url: "u".into()
            }
        );
        assert_eq!(
            out.try_recv().unwrap().message,
            EditorEvent::ConnectionCount { count: 1 }
        );
        assert!(!hub.is_empty());

        tokio::time::advance(hub.config().liveness_timeout + Duration::from_millis(1)).await;
        hub.sweep();

        assert_eq!(
            events.try_recv().unwrap(),
            HubEvent::SurfaceClosed { tab_id: "t1".into() }
        );
        assert_eq!(
            out.try_recv().unwrap().message,
            EditorEvent::ConnectionCount { count: 0 }
        );
        assert!(hub.is_empty());
        let snap = hub.metrics().snapshot();
        assert_eq!(snap.surfaces.opened, 1);
        assert_eq!(snap.surfaces.closed, 1);
        assert_eq!(snap.surfaces.loaders_evicted, 1);
    }

    #[test]
    fn loader_turning_into_content_counts_as_a_surface() {
        let hub = hub();
        let mut events = hub.subscribe_events();
        let mut out = hub.router().subscribe_broadcast_out();

        hub.record_heartbeat("t1", "loader", true);
        assert!(events.try_recv().is_err());
        assert_eq!(hub.content_surface_count(), 0);

        hub.record_heartbeat("t1", "page", false);
        assert_eq!(
            events.try_recv().unwrap(),
            HubEvent::SurfaceOpened {
                tab_id: "t1".into(),
                url: "page".into()
            }
        );
        assert_eq!(
            out.try_recv().unwrap().message,
            EditorEvent::ConnectionCount { count: 1 }
        );
        assert_eq!(hub.content_surface_count(), 1);

        hub.record_heartbeat("t1", "page", false);
        assert!(out.try_recv().is_err());
    }

    #[tokio::test]
    async fn get_content_is_answered_on_the_relay() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        std::fs::write(root.join("style.css"), "body{}").unwrap();
        let hub = hub();
        hub.open_project(&root);
        hub.mark_trusted();
        let _loops = hub.start();

        let mut relay = hub.router().subscribe_relay();
        let mut req = request("req-1", &root.join("style.css"));
        req.source_tab_id = Some("t9".into());
        hub.router()
            .ingest_relay(OWN, Some("t9".into()), RelayMessage::GetContent(req))
            .unwrap();

        let response = loop {
            let env = relay.recv().await.unwrap();
            if env.source == FrameSource::Hub {
                assert_eq!(env.tab_id.as_deref(), Some("t9"));
                match env.message {
                    RelayMessage::RequestResponse(resp) => break resp,
                    other => panic!("unexpected {other:?}"),
                }
            }
        };
        assert_eq!(response.request_id, "req-1");
        assert_eq!(response.contents, Some("body{}".into()));
        assert!(response.headers.is_empty());
        hub.shutdown();
    }

    #[tokio::test]
    async fn instance_id_requests_are_answered_to_the_tab() {
        let hub = hub();
        let _loops = hub.start();
        let mut relay = hub.router().subscribe_relay();

        hub.router()
            .ingest_text(
                OWN,
                r#"{"channel":"relay","tabID":"t2","message":{"type":"GET_PHOENIX_INSTANCE_ID"}}"#,
            )
            .unwrap();

        loop {
            let env = relay.recv().await.unwrap();
            if let RelayMessage::InstanceId { instance_id } = env.message {
                assert_eq!(instance_id, "test");
                assert_eq!(env.tab_id.as_deref(), Some("t2"));
                break;
            }
        }
        hub.shutdown();
    }

    #[test]
    fn reserved_pages_render() {
        let hub = hub();
        assert!(hub.reserved_page(ReservedPage::Loader).contains("crab-preview-frame"));
        assert!(hub
            .reserved_page(ReservedPage::NoPreview)
            .contains("No preview available"));
    }
}
