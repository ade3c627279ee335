use maud::{DOCTYPE, Markup, PreEscaped, html};

use super::{CSS, LiveReloadScript};

fn placeholder(title: &str, body: Markup, script: &LiveReloadScript) -> String {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) }
                style { (PreEscaped(CSS)) }
                (script.markup())
            }
            body {
                div class="placeholder" { (body) }
            }
        }
    }
    .into_string()
}

/// Shown when the selected file cannot be previewed and nothing related can.
pub fn no_preview_page(script: &LiveReloadScript) -> String {
    placeholder(
        "No preview available",
        html! {
            h1 { "No preview available" }
            p { "Select an HTML, Markdown, SVG or image file in the editor to preview it here." }
        },
        script,
    )
}

/// Blocking placeholder while the project root is not yet trusted.
pub fn trust_page(project_root: Option<&str>, script: &LiveReloadScript) -> String {
    placeholder(
        "Waiting for trust",
        html! {
            h1 { "Is this project trusted?" }
            @if let Some(root) = project_root {
                p { "Live preview runs code from " code { (root) } "." }
            }
            p { "Confirm that you trust this project in the editor. The preview will load automatically." }
        },
        script,
    )
}

const LOADER_SCRIPT: &str = r#"
(function () {
    var frame = document.getElementById("crab-preview-frame");
    var tabId = window.crypto && crypto.randomUUID
        ? crypto.randomUUID()
        : String(Date.now()) + String(Math.random()).slice(2);
    var ws = null;
    function send(channel, message) {
        if (ws && ws.readyState === 1) {
            ws.send(JSON.stringify({ channel: channel, tabID: tabId, message: message }));
        }
    }
    function show(url) {
        if (frame.src !== url) { frame.src = url; }
    }
    function beat() { send("navigation", { type: "TAB_LOADER_ONLINE", tabID: tabId, url: location.href }); }
    function connect() {
        ws = new WebSocket(__SOCKET_URL__ + "?tab_id=" + encodeURIComponent(tabId));
        ws.onopen = function () {
            beat();
            send("navigation", { type: "GET_INITIAL_URL", tabID: tabId });
        };
        ws.onmessage = function (event) {
            var frameMsg;
            try { frameMsg = JSON.parse(event.data); } catch (e) { return; }
            var msg = frameMsg.message || {};
            if (msg.type === "INITIAL_URL_NAVIGATE" && msg.tabID === tabId) {
                show(msg.url);
            } else if (msg.type === "REDIRECT_PAGE") {
                show(msg.url);
            } else if (msg.type === "PROJECT_SWITCH") {
                send("navigation", { type: "GET_INITIAL_URL", tabID: tabId });
            } else if (msg.type === "UPDATE_TITLE_ICON") {
                document.title = msg.title;
            }
        };
        ws.onclose = function () { setTimeout(connect, __HEARTBEAT_MS__); };
    }
    connect();
    setInterval(beat, __HEARTBEAT_MS__);
})();
"#;

/// Loader surface: a full-window frame that follows navigation.
pub fn loader_page(socket_url: &str, heartbeat_ms: u64) -> String {
    let socket_url = serde_json::to_string(socket_url)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace("</", "<\\/");
    let script = LOADER_SCRIPT
        .replace("__SOCKET_URL__", &socket_url)
        .replace("__HEARTBEAT_MS__", &heartbeat_ms.to_string());
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { "Live Preview" }
                style { (PreEscaped("html, body, iframe { margin: 0; border: 0; width: 100%; height: 100%; display: block; }")) }
            }
            body {
                iframe id="crab-preview-frame" title="Live Preview" {}
                script { (PreEscaped(script)) }
            }
        }
    }
    .into_string()
}
