use maud::{DOCTYPE, PreEscaped, html};

/// Tiny page that sends the surface to `url`. Works with scripts disabled via
/// the meta refresh.
pub fn redirect_page(url: &str) -> String {
    let target = serde_json::to_string(url)
        .unwrap_or_else(|_| "\"/\"".to_string())
        .replace("</", "<\\/");
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                meta http-equiv="refresh" content=(format!("0; url={url}"));
                title { "Redirecting" }
                script { (PreEscaped(format!("location.replace({target});"))) }
            }
            body {
                p { "Redirecting to " a href=(url) { (url) } }
            }
        }
    }
    .into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_at_target() {
        let page = redirect_page("http://h/preview/x/site/new.html");
        assert!(page.contains("content=\"0; url=http://h/preview/x/site/new.html\""));
        assert!(page.contains("location.replace(\"http://h/preview/x/site/new.html\");"));
        assert!(!page.contains(crate::views::LIVE_PREVIEW_MARKER));
    }

    #[test]
    fn target_cannot_close_script() {
        let page = redirect_page("http://h/</script><script>alert(1)</script>");
        assert!(!page.contains("</script><script>alert"));
    }
}
