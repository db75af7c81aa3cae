use std::fs::{self, File};
use std::io;
use std::path::Path;

use serde::Serialize;

use crate::error::{PropertyError, PropertyResult};

pub const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Directory,
    Markdown,
    Plaintext,
    Opaque,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::Markdown => "markdown",
            Self::Plaintext => "plaintext",
            Self::Opaque => "opaque",
        }
    }

    pub fn is_directory(self) -> bool {
        self == Self::Directory
    }
}

/// Content-type detection used to tell plaintext from opaque files.
pub trait ContentSniffer: Send + Sync {
    fn mime_type(&self, path: &Path) -> io::Result<String>;
}

/// Sniffs file contents through the shared-mime-info magic database.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagicSniffer;

impl ContentSniffer for MagicSniffer {
    fn mime_type(&self, path: &Path) -> io::Result<String> {
        // tree_magic_mini reports unreadable files as `None`; open first so the
        // real I/O error surfaces.
        File::open(path)?;
        Ok(tree_magic_mini::from_filepath(path)
            .unwrap_or(FALLBACK_MIME)
            .to_string())
    }
}

pub struct Classifier {
    sniffer: Box<dyn ContentSniffer>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(Box::new(MagicSniffer))
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier").finish_non_exhaustive()
    }
}

impl Classifier {
    pub fn new(sniffer: Box<dyn ContentSniffer>) -> Self {
        Self { sniffer }
    }

    pub fn classify(&self, path: &Path) -> PropertyResult<Classification> {
        let metadata = fs::metadata(path).map_err(|source| PropertyError::from_io(path, source))?;
        if metadata.is_dir() {
            return Ok(Classification::Directory);
        }
        if is_markdown_path(path) {
            return Ok(Classification::Markdown);
        }
        let mime = self
            .sniffer
            .mime_type(path)
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => PropertyError::NotFound {
                    path: path.to_path_buf(),
                },
                _ => PropertyError::Classification {
                    path: path.to_path_buf(),
                    source,
                },
            })?;
        if mime.starts_with("text/") {
            Ok(Classification::Plaintext)
        } else {
            Ok(Classification::Opaque)
        }
    }
}

pub fn is_markdown_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            MARKDOWN_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io;
    use std::path::Path;

    use super::ContentSniffer;

    /// Treats `.txt`, `.css` and `.html` as text and everything else as binary,
    /// so tests don't depend on the host's MIME database.
    pub struct ExtensionSniffer;

    impl ContentSniffer for ExtensionSniffer {
        fn mime_type(&self, path: &Path) -> io::Result<String> {
            std::fs::File::open(path)?;
            let ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
            Ok(match ext {
                "txt" => "text/plain",
                "css" => "text/css",
                "html" => "text/html",
                _ => "application/octet-stream",
            }
            .to_string())
        }
    }
}
