//! Lexical path handling for logical project paths.
//!
//! Overlay and document lookups never touch the disk, so containment is decided
//! on the normalized path. Disk reads additionally canonicalize (see
//! [`crate::documents::DiskFiles`]).

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` without consulting the filesystem.
///
/// `..` at the root stays at the root, so `/a/../../b` normalizes to `/b`.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// True when `path` names `root` itself or something beneath it.
///
/// Both sides are normalized first. Relative paths are never within an
/// absolute root.
pub fn is_within(path: &Path, root: &Path) -> bool {
    let path = normalize(path);
    let root = normalize(root);
    path.has_root() == root.has_root() && path.starts_with(&root)
}

/// Lowercased extension without the dot.
pub fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// How the preview treats a file, by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Html,
    Markdown,
    Svg,
    Image,
    Stylesheet,
    Script,
    Other,
}

impl FileKind {
    pub fn of(path: &Path) -> Self {
        match extension(path).as_deref() {
            Some("html" | "htm" | "xhtml" | "shtml") => Self::Html,
            Some("md" | "markdown" | "mdown" | "mkd" | "mkdn") => Self::Markdown,
            Some("svg") => Self::Svg,
            Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "ico" | "avif") => Self::Image,
            Some("css" | "less" | "scss") => Self::Stylesheet,
            Some("js" | "mjs" | "cjs") => Self::Script,
            _ => Self::Other,
        }
    }

    /// Can be shown on its own in a preview surface.
    pub fn is_previewable(&self) -> bool {
        matches!(self, Self::Html | Self::Markdown | Self::Svg | Self::Image)
    }
}
