use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::classify::Classification;
use crate::error::{PropertyError, PropertyResult};
use crate::paths::{display_path, normalize_pathbuf};

pub const DEFAULT_BASE_URL: &str = "/notes";

/// Where notes come from and where their published copies go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLayout {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    base_url: String,
}

impl SiteLayout {
    pub fn new(input_root: &Path, output_root: &Path, base_url: &str) -> Self {
        Self {
            input_root: normalize_pathbuf(input_root),
            output_root: normalize_pathbuf(output_root),
            base_url: normalize_base_url(base_url),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.input_root)
    }

    fn relative<'a>(&self, path: &'a Path) -> PropertyResult<&'a Path> {
        path.strip_prefix(&self.input_root)
            .map_err(|_| PropertyError::OutsideRoot {
                path: path.to_path_buf(),
                root: self.input_root.clone(),
            })
    }

    fn web_path(&self, relative: &Path) -> String {
        let relative = display_path(relative);
        let relative = relative.trim_matches('/');
        match (self.base_url.is_empty(), relative.is_empty()) {
            (true, true) => "/".to_string(),
            (true, false) => format!("/{relative}"),
            (false, true) => self.base_url.clone(),
            (false, false) => format!("{}/{relative}", self.base_url),
        }
    }
}

/// `/notes/` and `notes` both become `/notes`; absolute URLs keep their scheme.
fn normalize_base_url(value: &str) -> String {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() || trimmed.contains("://") || trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPaths {
    pub raw: PathBuf,
    pub html: Option<PathBuf>,
    pub web: String,
}

impl OutputPaths {
    /// Output files this entry writes, for collision bookkeeping.
    pub fn claimed(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.raw.as_path()).chain(self.html.as_deref())
    }
}

pub fn resolve_output_paths(
    path: &Path,
    classification: Classification,
    layout: &SiteLayout,
) -> PropertyResult<OutputPaths> {
    let relative = layout.relative(path)?;
    let raw = layout.output_root.join(relative);

    let html_relative = match classification {
        Classification::Directory | Classification::Opaque => None,
        Classification::Markdown => Some(relative.with_extension("html")),
        Classification::Plaintext => Some(append_html_suffix(relative)),
    };

    let web = match &html_relative {
        Some(html_relative) => layout.web_path(html_relative),
        None => layout.web_path(relative),
    };

    Ok(OutputPaths {
        raw,
        html: html_relative.map(|html_relative| layout.output_root.join(html_relative)),
        web,
    })
}

fn append_html_suffix(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(OsString::new);
    name.push(".html");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> SiteLayout {
        SiteLayout::new(Path::new("/notes"), Path::new("/output/notes"), "/notes")
    }

    #[test]
    fn markdown_replaces_extension() {
        let paths = resolve_output_paths(
            Path::new("/notes/a/b.md"),
            Classification::Markdown,
            &layout(),
        )
        .expect("resolve");
        assert_eq!(paths.raw, PathBuf::from("/output/notes/a/b.md"));
        assert_eq!(paths.html, Some(PathBuf::from("/output/notes/a/b.html")));
        assert_eq!(paths.web, "/notes/a/b.html");
    }

    #[test]
    fn plaintext_appends_html() {
        let paths = resolve_output_paths(
            Path::new("/notes/a/readme.txt"),
            Classification::Plaintext,
            &layout(),
        )
        .expect("resolve");
        assert_eq!(paths.raw, PathBuf::from("/output/notes/a/readme.txt"));
        assert_eq!(
            paths.html,
            Some(PathBuf::from("/output/notes/a/readme.txt.html"))
        );
        assert_eq!(paths.web, "/notes/a/readme.txt.html");
    }

    #[test]
    fn opaque_and_directories_link_to_raw() {
        let opaque = resolve_output_paths(
            Path::new("/notes/img/cat.png"),
            Classification::Opaque,
            &layout(),
        )
        .expect("resolve");
        assert_eq!(opaque.html, None);
        assert_eq!(opaque.web, "/notes/img/cat.png");

        let dir =
            resolve_output_paths(Path::new("/notes/img"), Classification::Directory, &layout())
                .expect("resolve");
        assert_eq!(dir.raw, PathBuf::from("/output/notes/img"));
        assert_eq!(dir.html, None);
        assert_eq!(dir.web, "/notes/img");

        let root = resolve_output_paths(Path::new("/notes"), Classification::Directory, &layout())
            .expect("resolve");
        assert_eq!(root.raw, PathBuf::from("/output/notes"));
        assert_eq!(root.web, "/notes");
    }

    #[test]
    fn resolution_is_deterministic() {
        let first = resolve_output_paths(
            Path::new("/notes/x/y.md"),
            Classification::Markdown,
            &layout(),
        )
        .expect("first");
        let second = resolve_output_paths(
            Path::new("/notes/x/y.md"),
            Classification::Markdown,
            &layout(),
        )
        .expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn relative_roots_resolve_like_the_examples() {
        let layout = SiteLayout::new(Path::new("notes"), Path::new("output/notes"), "/notes");
        let paths = resolve_output_paths(
            Path::new("notes/a/b.md"),
            Classification::Markdown,
            &layout,
        )
        .expect("resolve");
        assert_eq!(paths.html, Some(PathBuf::from("output/notes/a/b.html")));
    }

    #[test]
    fn paths_outside_root_are_rejected() {
        let error = resolve_output_paths(
            Path::new("/elsewhere/a.md"),
            Classification::Markdown,
            &layout(),
        )
        .expect_err("must fail");
        assert!(matches!(error, PropertyError::OutsideRoot { .. }));
    }

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(normalize_base_url("notes/"), "/notes");
        assert_eq!(normalize_base_url("/"), "");
        assert_eq!(
            normalize_base_url("https://example.org/notes/"),
            "https://example.org/notes"
        );

        let layout = SiteLayout::new(Path::new("/n"), Path::new("/o"), "/");
        let paths = resolve_output_paths(Path::new("/n/a.png"), Classification::Opaque, &layout)
            .expect("resolve");
        assert_eq!(paths.web, "/a.png");
    }
}
