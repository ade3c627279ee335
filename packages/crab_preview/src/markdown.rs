//! Markdown → HTML collaborator.

use crate::error::PreviewError;

/// Pure text → HTML rendering. Implementations must not touch the filesystem.
pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, source: &str) -> Result<String, PreviewError>;
}

/// CommonMark with the GFM extensions and raw HTML passthrough.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonMarkRenderer;

impl MarkdownRenderer for CommonMarkRenderer {
    fn render(&self, source: &str) -> Result<String, PreviewError> {
        markdown::to_html_with_options(
            source,
            &markdown::Options {
                compile: markdown::CompileOptions {
                    allow_dangerous_html: true,
                    allow_dangerous_protocol: false,
                    ..markdown::CompileOptions::gfm()
                },
                parse: markdown::ParseOptions {
                    constructs: markdown::Constructs {
                        frontmatter: true,
                        ..markdown::Constructs::gfm()
                    },
                    ..markdown::ParseOptions::gfm()
                },
            },
        )
        .map_err(|e| PreviewError::RenderFailure(e.to_string()))
    }
}

/// First ATX heading, used as the page title.
pub fn title_of(source: &str) -> Option<String> {
    source.lines().find_map(|line| {
        let line = line.trim_start();
        let rest = line.strip_prefix('#')?;
        let rest = rest.trim_start_matches('#');
        if !rest.starts_with(' ') {
            return None;
        }
        let title = rest.trim().trim_end_matches('#').trim();
        (!title.is_empty()).then(|| title.to_string())
    })
}
