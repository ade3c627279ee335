use maud::{DOCTYPE, PreEscaped, html};

use super::{CSS, LiveReloadScript, MARKDOWN_CSS};

/// Wrap rendered markdown in the preview template. Style and script are
/// inlined so the page needs nothing else from the server.
pub fn markdown_page(title: &str, body_html: &str, script: &LiveReloadScript) -> String {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) }
                style { (PreEscaped(CSS)) (PreEscaped(MARKDOWN_CSS)) }
                (script.markup())
            }
            body {
                article class="markdown-body" {
                    (PreEscaped(body_html))
                }
            }
        }
    }
    .into_string()
}
