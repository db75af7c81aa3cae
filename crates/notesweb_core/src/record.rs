use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use serde_yaml::Value;

use crate::classify::Classification;
use crate::frontmatter::scalar_to_string;
use crate::output_paths::OutputPaths;

/// Resolved metadata for one file or directory under the notes root.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub title: String,
    #[serde(rename = "is_dir")]
    pub is_directory: bool,
    pub tags: Vec<String>,
    #[serde(rename = "uuid", skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub extra: BTreeMap<String, Value>,
    pub source_path: PathBuf,
    pub classification: Classification,
    pub output: OutputPaths,
    /// Immediate children, only populated on explicit request. Children never
    /// carry their own entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_entries: Option<Vec<Record>>,
}

impl Record {
    pub fn extra_bool(&self, key: &str, default: bool) -> bool {
        self.extra
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    pub fn extra_string(&self, key: &str) -> Option<String> {
        self.extra.get(key).and_then(scalar_to_string)
    }
}
