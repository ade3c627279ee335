//! Pages and scripts the hub generates itself.
//!
//! Everything here renders to a `String` so the resolver can hand it to the
//! relay as ordinary text content.

mod live_reload;
mod markdown_page;
mod placeholders;
mod redirect;

pub use live_reload::{LIVE_PREVIEW_MARKER, LiveReloadScript, instrument_html};
pub use markdown_page::markdown_page;
pub use placeholders::{loader_page, no_preview_page, trust_page};
pub use redirect::redirect_page;

// Shared CSS constant
pub const CSS: &str = r#"
    :root {
        color-scheme: light dark;
        --crab-fg: #1f2328;
        --crab-bg: #ffffff;
        --crab-muted: #59636e;
        --crab-border: #d1d9e0;
        --crab-code-bg: #f6f8fa;
        --crab-accent: #0969da;
    }

    @media (prefers-color-scheme: dark) {
        :root {
            --crab-fg: #e6edf3;
            --crab-bg: #0d1117;
            --crab-muted: #9198a1;
            --crab-border: #3d444d;
            --crab-code-bg: #151b23;
            --crab-accent: #4493f8;
        }
    }

    body {
        margin: 0;
        background: var(--crab-bg);
        color: var(--crab-fg);
        font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Helvetica, Arial, sans-serif;
        line-height: 1.6;
    }

    .placeholder {
        display: flex;
        flex-direction: column;
        align-items: center;
        justify-content: center;
        min-height: 100vh;
        padding: 0 2rem;
        text-align: center;
    }

    .placeholder h1 {
        font-size: 1.25rem;
        font-weight: 600;
        margin-bottom: 0.5rem;
    }

    .placeholder p {
        color: var(--crab-muted);
        max-width: 32rem;
    }

    .placeholder code {
        font-family: 'SF Mono', Monaco, 'Cascadia Code', 'Roboto Mono', monospace;
        background: var(--crab-code-bg);
        padding: 0.1rem 0.4rem;
        border-radius: 4px;
    }
"#;

pub const MARKDOWN_CSS: &str = r#"
    .markdown-body {
        box-sizing: border-box;
        max-width: 980px;
        margin: 0 auto;
        padding: 32px 45px;
    }

    .markdown-body h1, .markdown-body h2 {
        border-bottom: 1px solid var(--crab-border);
        padding-bottom: 0.3em;
    }

    .markdown-body a { color: var(--crab-accent); }

    .markdown-body code, .markdown-body pre {
        font-family: 'SF Mono', Monaco, 'Cascadia Code', 'Roboto Mono', monospace;
        background: var(--crab-code-bg);
        border-radius: 6px;
    }

    .markdown-body code { padding: 0.2em 0.4em; font-size: 85%; }
    .markdown-body pre { padding: 16px; overflow: auto; }
    .markdown-body pre code { padding: 0; background: transparent; }

    .markdown-body table { border-collapse: collapse; }
    .markdown-body th, .markdown-body td {
        border: 1px solid var(--crab-border);
        padding: 6px 13px;
    }

    .markdown-body blockquote {
        margin: 0;
        padding: 0 1em;
        color: var(--crab-muted);
        border-left: 0.25em solid var(--crab-border);
    }

    .markdown-body img { max-width: 100%; }

    @media (max-width: 767px) {
        .markdown-body { padding: 15px; }
    }
"#;
