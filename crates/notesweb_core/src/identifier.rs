use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::classify::is_markdown_path;
use crate::frontmatter::{new_identifier, parse, with_identifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierReport {
    pub identifier: String,
    /// False when the document already declared an identifier.
    pub assigned: bool,
    pub written: bool,
    /// The document with its identifier in place.
    pub content: String,
}

/// Ensure the Markdown document at `path` declares a `uuid`, generating a v4
/// identifier when it has none. The file is only modified when `write` is set.
pub fn ensure_identifier(path: &Path, write: bool) -> Result<IdentifierReport> {
    if !is_markdown_path(path) {
        bail!("not a markdown document: {}", path.display());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;

    let identifier = new_identifier();
    let Some(updated) = with_identifier(path, &content, &identifier)? else {
        let existing = parse(path, &content)?
            .identifier
            .with_context(|| format!("failed to read identifier from {}", path.display()))?;
        return Ok(IdentifierReport {
            identifier: existing,
            assigned: false,
            written: false,
            content,
        });
    };

    if write {
        fs::write(path, &updated).with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), %identifier, "assigned identifier");
    }
    Ok(IdentifierReport {
        identifier,
        assigned: true,
        written: write,
        content: updated,
    })
}
