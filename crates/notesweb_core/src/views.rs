//! Aggregate views built from a fully populated [`PropertyStore`].

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::warn;

use crate::error::{PropertyError, PropertyResult};
use crate::paths::is_hidden_name;
use crate::record::Record;
use crate::store::PropertyStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchEntry {
    pub title: String,
    pub tags: Vec<String>,
    pub path: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagEntry {
    pub title: String,
    pub is_dir: bool,
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SiteViews {
    pub search_index: Vec<SearchEntry>,
    pub tag_groups: BTreeMap<String, Vec<TagEntry>>,
    pub permalinks: BTreeMap<String, String>,
}

pub fn build_views(store: &mut PropertyStore) -> PropertyResult<SiteViews> {
    let records = store.records()?;
    Ok(SiteViews {
        search_index: search_index(&records),
        tag_groups: tag_groups(&records),
        permalinks: permalink_table(&records),
    })
}

/// Immediate children of `dir`, directories first, then by case-insensitive
/// title. Hidden entries and the directory's own index document are left out.
/// Children that fail to extract are logged and skipped.
pub fn directory_listing(store: &PropertyStore, dir: &Path) -> PropertyResult<Vec<Record>> {
    let entries = fs::read_dir(dir).map_err(|source| PropertyError::from_io(dir, source))?;
    let mut listing = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| PropertyError::from_io(dir, source))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if is_hidden_name(&name) {
            continue;
        }
        let path = entry.path();
        if name == store.index_filename() && path.is_file() {
            continue;
        }
        match store.extract_detached(&path) {
            Ok(record) => listing.push(record),
            Err(error) => warn!(path = %path.display(), %error, "skipping listing entry"),
        }
    }
    sort_listing(&mut listing);
    Ok(listing)
}

pub fn sort_listing(entries: &mut [Record]) {
    entries.sort_by(|left, right| {
        right
            .is_directory
            .cmp(&left.is_directory)
            .then_with(|| left.title.to_lowercase().cmp(&right.title.to_lowercase()))
    });
}

pub fn search_index(records: &[Record]) -> Vec<SearchEntry> {
    records
        .iter()
        .map(|record| SearchEntry {
            title: record.title.clone(),
            tags: record.tags.clone(),
            path: record.output.web.clone(),
            is_dir: record.is_directory,
        })
        .collect()
}

/// Tag to the records carrying it. A record appears once per tag even when the
/// tag reaches it through several ancestors.
pub fn tag_groups(records: &[Record]) -> BTreeMap<String, Vec<TagEntry>> {
    let mut groups: BTreeMap<String, Vec<TagEntry>> = BTreeMap::new();
    for record in records {
        let mut seen = HashSet::new();
        for tag in &record.tags {
            if !seen.insert(tag.as_str()) {
                continue;
            }
            groups.entry(tag.clone()).or_default().push(TagEntry {
                title: record.title.clone(),
                is_dir: record.is_directory,
                path: record.output.web.clone(),
            });
        }
    }
    groups
}

/// Stable identifier to web path. The first record (in path order) wins when
/// two records share an identifier.
pub fn permalink_table(records: &[Record]) -> BTreeMap<String, String> {
    let mut table = BTreeMap::new();
    for record in records {
        let Some(identifier) = record.identifier.as_deref() else {
            continue;
        };
        if let Some(existing) = table.get(identifier) {
            warn!(
                identifier,
                kept = %existing,
                ignored = %record.output.web,
                "duplicate permalink identifier"
            );
            continue;
        }
        table.insert(identifier.to_string(), record.output.web.clone());
    }
    table
}
