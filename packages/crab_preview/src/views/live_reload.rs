use maud::{Markup, PreEscaped, html};

/// Attribute carried by the injected script tag. A body containing it is known
/// to follow navigation on its own.
pub const LIVE_PREVIEW_MARKER: &str = "data-crab-live-preview";

const SCRIPT_TEMPLATE: &str = r#"
(function () {
    if (window.__crabLivePreview) { return; }
    window.__crabLivePreview = true;

    var params = new URLSearchParams(location.search);
    var poppedOut = params.get("popout") === "true";
    var embedded = window.parent !== window;
    var tabId = params.get("tab_id") || sessionStorage.getItem("crabPreviewTab");
    if (!tabId) {
        tabId = window.crypto && crypto.randomUUID
            ? crypto.randomUUID()
            : String(Date.now()) + String(Math.random()).slice(2);
    }
    sessionStorage.setItem("crabPreviewTab", tabId);

    var ws = null;
    function send(channel, message) {
        if (ws && ws.readyState === 1) {
            ws.send(JSON.stringify({ channel: channel, tabID: tabId, message: message }));
        }
    }
    function here() { return location.origin + location.pathname; }
    function online() { send("relay", { type: "TAB_ONLINE", tabID: tabId, url: location.href }); }

    function connect() {
        ws = new WebSocket(__SOCKET_URL__ + "?tab_id=" + encodeURIComponent(tabId));
        ws.onopen = online;
        ws.onmessage = function (event) {
            var frame;
            try { frame = JSON.parse(event.data); } catch (e) { return; }
            var msg = frame.message || {};
            if (msg.type === "RELOAD" && msg.url === here()) {
                location.reload();
            } else if (msg.type === "REDIRECT_PAGE" && !embedded && (msg.force || !poppedOut)) {
                if (msg.url !== location.href) { location.replace(msg.url); }
            }
        };
        ws.onclose = function () { setTimeout(connect, __HEARTBEAT_MS__); };
    }

    connect();
    setInterval(online, __HEARTBEAT_MS__);

    ["debug", "log", "info", "warn", "error"].forEach(function (level) {
        var original = console[level];
        console[level] = function () {
            var args = Array.prototype.slice.call(arguments).map(function (a) {
                try { return typeof a === "string" ? a : JSON.stringify(a); } catch (e) { return String(a); }
            });
            send("relay", { type: "EVENT", eventName: "CONSOLE", level: level, args: args });
            return original.apply(console, arguments);
        };
    });

    window.addEventListener("error", function (event) {
        send("relay", { type: "REPORT_ERROR", message: String(event.message) });
    });
    window.addEventListener("load", function () {
        send("relay", { type: "EVENT", eventName: "NAVIGATED", url: location.href });
    });
})();
"#;

/// The client-side half of live preview, configured for one server.
#[derive(Debug, Clone)]
pub struct LiveReloadScript {
    socket_url: String,
    heartbeat_ms: u64,
}

impl LiveReloadScript {
    pub fn new(socket_url: impl Into<String>, heartbeat_ms: u64) -> Self {
        Self {
            socket_url: socket_url.into(),
            heartbeat_ms,
        }
    }

    fn source(&self) -> String {
        let socket_url =
            serde_json::to_string(&self.socket_url).unwrap_or_else(|_| "\"\"".to_string());
        SCRIPT_TEMPLATE
            .replace("__SOCKET_URL__", &socket_url.replace("</", "<\\/"))
            .replace("__HEARTBEAT_MS__", &self.heartbeat_ms.to_string())
    }

    pub fn markup(&self) -> Markup {
        html! {
            script data-crab-live-preview="" { (PreEscaped(self.source())) }
        }
    }

    pub fn render(&self) -> String {
        self.markup().into_string()
    }
}

/// Inject `script` into an HTML document: before `</head>` when present,
/// otherwise before `</body>`, otherwise at the end. Documents that already
/// carry the marker are returned unchanged.
pub fn instrument_html(html: &str, script: &str) -> String {
    if html.contains(LIVE_PREVIEW_MARKER) {
        return html.to_string();
    }
    let lower = html.to_ascii_lowercase();
    let at = lower
        .find("</head>")
        .or_else(|| lower.rfind("</body>"))
        .unwrap_or(html.len());

    let mut out = String::with_capacity(html.len() + script.len());
    out.push_str(&html[..at]);
    out.push_str(script);
    out.push_str(&html[at..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script() -> LiveReloadScript {
        LiveReloadScript::new("ws://127.0.0.1:9/api/preview/ws", 1000)
    }

    #[test]
    fn script_carries_marker_and_config() {
        let rendered = script().render();
        assert!(rendered.starts_with("<script data-crab-live-preview=\"\">"));
        assert!(rendered.contains("new WebSocket(\"ws://127.0.0.1:9/api/preview/ws\""));
        assert!(rendered.contains("setInterval(online, 1000)"));
        assert!(!rendered.contains("__SOCKET_URL__"));
    }

    #[test]
    fn injects_before_head_close() {
        let out = instrument_html("<html><HEAD><title>x</title></HEAD><body></body></html>", "<s/>");
        assert_eq!(out, "<html><HEAD><title>x</title><s/></HEAD><body></body></html>");
    }

    #[test]
    fn falls_back_to_body_then_end() {
        assert_eq!(instrument_html("<p>a</p></body>", "<s/>"), "<p>a</p><s/></body>");
        assert_eq!(instrument_html("<p>a</p>", "<s/>"), "<p>a</p><s/>");
    }

    #[test]
    fn already_instrumented_is_untouched() {
        let once = instrument_html("<head></head>", &script().render());
        assert_eq!(instrument_html(&once, &script().render()), once);
    }
}
