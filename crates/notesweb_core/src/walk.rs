use std::ffi::OsStr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::paths::{display_path, is_hidden_name};
use crate::store::PropertyStore;

#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WalkReport {
    pub directories: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
    pub skipped: Vec<SkippedEntry>,
}

impl WalkReport {
    pub fn visited(&self) -> usize {
        self.directories.len() + self.files.len()
    }
}

/// Visit every directory and file under the notes root once, memoizing each in
/// `store`. Per-entry failures are logged and reported; output collisions and a
/// missing root abort the walk.
pub fn walk_notes(store: &mut PropertyStore) -> Result<WalkReport> {
    let root = store.layout().input_root.clone();
    if !root.is_dir() {
        bail!("notes directory not found: {}", display_path(&root));
    }
    let index_filename = store.index_filename().to_string();

    let mut report = WalkReport::default();
    let walker = WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !is_hidden_name(&entry.file_name().to_string_lossy())
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                let path = error
                    .path()
                    .map(display_path)
                    .unwrap_or_else(|| display_path(&root));
                warn!(path = %path, %error, "skipping unreadable entry");
                report.skipped.push(SkippedEntry {
                    path,
                    reason: error.to_string(),
                });
                continue;
            }
        };

        let is_dir = entry.file_type().is_dir();
        if !is_dir && entry.depth() > 0 && entry.file_name() == OsStr::new(&index_filename) {
            continue;
        }

        let path = entry.path();
        match store.get(path) {
            Ok(_) if is_dir => report.directories.push(path.to_path_buf()),
            Ok(_) => report.files.push(path.to_path_buf()),
            Err(error) if error.is_fatal() => {
                return Err(error).with_context(|| {
                    format!(
                        "aborting build while mapping {}",
                        display_path(entry.path())
                    )
                });
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping entry");
                report.skipped.push(SkippedEntry {
                    path: display_path(path),
                    reason: error.to_string(),
                });
            }
        }
    }

    info!(
        directories = report.directories.len(),
        files = report.files.len(),
        skipped = report.skipped.len(),
        "walked notes tree"
    );
    Ok(report)
}
