use std::collections::BTreeMap;
use std::path::Path;

use serde_yaml::Value;

use crate::classify::Classification;
use crate::error::PropertyResult;
use crate::frontmatter::{FrontMatter, read_front_matter};
use crate::output_paths::{SiteLayout, resolve_output_paths};
use crate::record::Record;

pub const DEFAULT_INDEX_FILENAME: &str = "readme.md";

/// Display flags every directory page starts with; its index document may
/// override any of them.
const DIRECTORY_DEFAULTS: &[(&str, bool)] = &[
    ("content_after_search", false),
    ("automatic_index", true),
    ("search_bar", true),
];

/// Build the own-properties record for `path`. No ancestor tags are applied.
pub fn extract_record(
    path: &Path,
    classification: Classification,
    layout: &SiteLayout,
    index_filename: &str,
) -> PropertyResult<Record> {
    let front_matter = extract_front_matter(path, classification, index_filename)?;
    let output = resolve_output_paths(path, classification, layout)?;

    let mut extra = BTreeMap::new();
    if classification.is_directory() {
        for (key, value) in DIRECTORY_DEFAULTS {
            extra.insert((*key).to_string(), Value::Bool(*value));
        }
    }
    extra.extend(front_matter.extra);

    Ok(Record {
        title: front_matter
            .title
            .unwrap_or_else(|| default_title(path)),
        is_directory: classification.is_directory(),
        tags: front_matter.tags,
        identifier: front_matter.identifier,
        extra,
        source_path: path.to_path_buf(),
        classification,
        output,
        index_entries: None,
    })
}

fn extract_front_matter(
    path: &Path,
    classification: Classification,
    index_filename: &str,
) -> PropertyResult<FrontMatter> {
    match classification {
        Classification::Directory => {
            let index_document = path.join(index_filename);
            if index_document.is_file() {
                read_front_matter(&index_document)
            } else {
                Ok(FrontMatter::default())
            }
        }
        Classification::Markdown => read_front_matter(path),
        Classification::Plaintext | Classification::Opaque => Ok(FrontMatter::default()),
    }
}

fn default_title(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
