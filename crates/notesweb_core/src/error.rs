use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures raised while classifying, extracting or memoizing a single entry.
///
/// Everything except [`PropertyError::PathCollision`] is scoped to one input
/// path and can be skipped by a tree walk. A collision means two inputs were
/// mapped onto the same output file, so continuing would silently overwrite
/// one of them.
#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("path not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("malformed front matter in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("failed to determine content type of {}: {source}", path.display())]
    Classification {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "output path collision at {}: claimed by {} and {}",
        output.display(),
        first.display(),
        second.display()
    )]
    PathCollision {
        output: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("{} is outside the notes root {}", path.display(), root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PropertyError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PathCollision { .. })
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound { path }
            | Self::Parse { path, .. }
            | Self::Classification { path, .. }
            | Self::OutsideRoot { path, .. }
            | Self::Io { path, .. } => path,
            Self::PathCollision { second, .. } => second,
        }
    }

    pub(crate) fn parse(path: &Path, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Map an I/O failure on `path`, folding `NotFound` into its own variant.
    pub(crate) fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

pub type PropertyResult<T> = Result<T, PropertyError>;
