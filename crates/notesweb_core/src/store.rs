//! Memoized property store.
//!
//! Every entry under the notes root is classified, extracted and mapped to its
//! output paths at most once per build. Callers always receive clones, so no
//! caller can alter what another caller (or a later lookup) sees.
//!
//! The store is single-writer: `add` and `get` take `&mut self`. Resolve
//! metadata first, then hand the cloned records to a parallel render stage.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::Classifier;
use crate::error::{PropertyError, PropertyResult};
use crate::extract::{DEFAULT_INDEX_FILENAME, extract_record};
use crate::output_paths::SiteLayout;
use crate::paths::canonical_key;
use crate::record::Record;
use crate::views::directory_listing;

/// File name of the listing page written into every output directory.
pub const DIRECTORY_PAGE_FILENAME: &str = "index.html";

/// How inherited tags are combined with a record's own tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagPolicy {
    /// Own tags followed by each ancestor's tags, nearest first. Repeats kept.
    #[default]
    Concatenate,
    /// Same order as `Concatenate`, keeping only the first occurrence of a tag.
    Deduplicate,
}

impl TagPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Concatenate => "concatenate",
            Self::Deduplicate => "deduplicate",
        }
    }

    fn apply(self, tags: Vec<String>) -> Vec<String> {
        match self {
            Self::Concatenate => tags,
            Self::Deduplicate => {
                let mut seen = HashSet::new();
                tags.into_iter()
                    .filter(|tag| seen.insert(tag.clone()))
                    .collect()
            }
        }
    }
}

#[derive(Debug)]
pub struct PropertyStore {
    layout: SiteLayout,
    index_filename: String,
    tag_policy: TagPolicy,
    classifier: Classifier,
    records: BTreeMap<PathBuf, Record>,
    claims: HashMap<PathBuf, PathBuf>,
    /// Output directories owned wholesale, with their owner.
    reserved_trees: Vec<(PathBuf, PathBuf)>,
}

impl PropertyStore {
    pub fn new(layout: SiteLayout) -> Self {
        let layout = SiteLayout::new(
            &canonical_key(&layout.input_root),
            &canonical_key(&layout.output_root),
            layout.base_url(),
        );
        Self {
            layout,
            index_filename: DEFAULT_INDEX_FILENAME.to_string(),
            tag_policy: TagPolicy::default(),
            classifier: Classifier::default(),
            records: BTreeMap::new(),
            claims: HashMap::new(),
            reserved_trees: Vec::new(),
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_index_filename(mut self, index_filename: impl Into<String>) -> Self {
        self.index_filename = index_filename.into();
        self
    }

    pub fn with_tag_policy(mut self, tag_policy: TagPolicy) -> Self {
        self.tag_policy = tag_policy;
        self
    }

    pub fn layout(&self) -> &SiteLayout {
        &self.layout
    }

    pub fn index_filename(&self) -> &str {
        &self.index_filename
    }

    pub fn tag_policy(&self) -> TagPolicy {
        self.tag_policy
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.records.contains_key(&canonical_key(path))
    }

    /// Compute and memoize the record for `path`, replacing any earlier one.
    pub fn add(&mut self, path: &Path) -> PropertyResult<()> {
        let key = canonical_key(path);
        self.insert(&key)
    }

    /// Own properties only, with no ancestor tags.
    pub fn get_raw(&mut self, path: &Path) -> PropertyResult<Record> {
        let key = canonical_key(path);
        Ok(self.memoized(&key)?.clone())
    }

    /// Record for `path` with tags inherited from every ancestor directory up
    /// to and including the notes root.
    pub fn get(&mut self, path: &Path) -> PropertyResult<Record> {
        let key = canonical_key(path);
        let mut record = self.memoized(&key)?.clone();

        let mut tags = std::mem::take(&mut record.tags);
        let mut cursor = key.parent();
        while let Some(parent) = cursor {
            if !self.layout.contains(parent) {
                break;
            }
            let parent_record = self.memoized(parent)?;
            tags.extend(parent_record.tags.iter().cloned());
            if parent == self.layout.input_root {
                break;
            }
            cursor = parent.parent();
        }

        record.tags = self.tag_policy.apply(tags);
        Ok(record)
    }

    /// `get`, plus the sorted one-level listing for directories.
    pub fn get_with_index_entries(&mut self, path: &Path) -> PropertyResult<Record> {
        let mut record = self.get(path)?;
        if record.is_directory {
            record.index_entries = Some(directory_listing(self, &record.source_path)?);
        }
        Ok(record)
    }

    /// Inheritance-resolved clones of every memoized record, in path order.
    pub fn records(&mut self) -> PropertyResult<Vec<Record>> {
        let keys: Vec<PathBuf> = self.records.keys().cloned().collect();
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Classify and extract `path` without memoizing it or claiming outputs.
    pub fn extract_detached(&self, path: &Path) -> PropertyResult<Record> {
        let key = canonical_key(path);
        let classification = self.classifier.classify(&key)?;
        extract_record(&key, classification, &self.layout, &self.index_filename)
    }

    /// Claim a single output file for `owner` ahead of the walk, so an entry
    /// mapped onto it fails with `PathCollision`.
    pub fn reserve_output(&mut self, output: &Path, owner: &Path) -> PropertyResult<()> {
        let output = canonical_key(output);
        if let Some(first) = self.claims.get(&output)
            && first != owner
        {
            return Err(PropertyError::PathCollision {
                output,
                first: first.clone(),
                second: owner.to_path_buf(),
            });
        }
        self.claims.insert(output, owner.to_path_buf());
        Ok(())
    }

    /// Claim `dir` and everything below it for `owner`.
    pub fn reserve_tree(&mut self, dir: &Path, owner: &Path) -> PropertyResult<()> {
        let dir = canonical_key(dir);
        if let Some((output, first)) = self
            .claims
            .iter()
            .find(|(output, first)| output.starts_with(&dir) && first.as_path() != owner)
        {
            return Err(PropertyError::PathCollision {
                output: output.clone(),
                first: first.clone(),
                second: owner.to_path_buf(),
            });
        }
        if !self.reserved_trees.iter().any(|(reserved, _)| reserved == &dir) {
            self.reserved_trees.push((dir, owner.to_path_buf()));
        }
        Ok(())
    }

    fn owner_of(&self, output: &Path) -> Option<&PathBuf> {
        self.claims.get(output).or_else(|| {
            self.reserved_trees
                .iter()
                .find(|(dir, _)| output.starts_with(dir))
                .map(|(_, owner)| owner)
        })
    }

    fn memoized(&mut self, key: &Path) -> PropertyResult<&Record> {
        if !self.records.contains_key(key) {
            self.insert(key)?;
        }
        self.records.get(key).ok_or_else(|| PropertyError::NotFound {
            path: key.to_path_buf(),
        })
    }

    fn insert(&mut self, key: &Path) -> PropertyResult<()> {
        let record = self.extract_detached(key)?;
        self.claim_outputs(&record)?;
        debug!(
            path = %key.display(),
            kind = record.classification.as_str(),
            web = %record.output.web,
            "memoized entry"
        );
        self.records.insert(key.to_path_buf(), record);
        Ok(())
    }

    /// Register every output file `record` writes. Nothing is registered if any
    /// of them already belongs to another source.
    fn claim_outputs(&mut self, record: &Record) -> PropertyResult<()> {
        let mut outputs: Vec<PathBuf> = record
            .output
            .claimed()
            .map(Path::to_path_buf)
            .collect();
        if record.is_directory {
            outputs.push(record.output.raw.join(DIRECTORY_PAGE_FILENAME));
        }

        for output in &outputs {
            if let Some(owner) = self.owner_of(output)
                && owner != &record.source_path
            {
                return Err(PropertyError::PathCollision {
                    output: output.clone(),
                    first: owner.clone(),
                    second: record.source_path.clone(),
                });
            }
        }

        if let Some(previous) = self.records.get(&record.source_path) {
            let stale: Vec<PathBuf> = previous.output.claimed().map(Path::to_path_buf).collect();
            for output in stale {
                self.claims.remove(&output);
            }
        }
        for output in outputs {
            self.claims.insert(output, record.source_path.clone());
        }
        Ok(())
    }
}
