//! YAML front matter: the `---` fenced block at the top of a Markdown note.
//!
//! Only the metadata is kept. Bodies are re-read on demand by the renderer so a
//! full store never holds note contents in memory.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_yaml::{Mapping, Value};
use uuid::Uuid;

use crate::error::{PropertyError, PropertyResult};

pub const TITLE_KEY: &str = "title";
pub const TAGS_KEY: &str = "tags";
pub const IDENTIFIER_KEY: &str = "uuid";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub identifier: Option<String>,
    pub extra: BTreeMap<String, Value>,
}

/// Split a document into `(front matter yaml, body)`.
///
/// The opening fence must be the first line. A document with an opening fence
/// but no closing `---`/`...` line has no front matter.
pub fn split(content: &str) -> (Option<&str>, &str) {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let Some(first_end) = content.find('\n') else {
        return (None, content);
    };
    if content[..first_end].trim_end() != "---" {
        return (None, content);
    }

    let yaml_start = first_end + 1;
    let mut offset = yaml_start;
    while offset < content.len() {
        let line_end = content[offset..].find('\n').map(|index| offset + index);
        let line = &content[offset..line_end.unwrap_or(content.len())];
        if matches!(line.trim_end(), "---" | "...") {
            let body = match line_end {
                Some(end) => &content[end + 1..],
                None => "",
            };
            return (Some(&content[yaml_start..offset]), body);
        }
        match line_end {
            Some(end) => offset = end + 1,
            None => break,
        }
    }
    (None, content)
}

pub fn parse(path: &Path, content: &str) -> PropertyResult<FrontMatter> {
    match split(content).0 {
        Some(yaml) => parse_yaml(path, yaml),
        None => Ok(FrontMatter::default()),
    }
}

pub fn read_front_matter(path: &Path) -> PropertyResult<FrontMatter> {
    let content = read_utf8(path)?;
    parse(path, &content)
}

/// Document body with the front matter stripped.
pub fn read_body(path: &Path) -> PropertyResult<String> {
    let content = read_utf8(path)?;
    Ok(split(&content).1.to_string())
}

fn read_utf8(path: &Path) -> PropertyResult<String> {
    let bytes = fs::read(path).map_err(|source| PropertyError::from_io(path, source))?;
    String::from_utf8(bytes).map_err(|_| PropertyError::parse(path, "document is not valid UTF-8"))
}

fn parse_mapping(path: &Path, yaml: &str) -> PropertyResult<Mapping> {
    if yaml.trim().is_empty() {
        return Ok(Mapping::new());
    }
    let value: Value =
        serde_yaml::from_str(yaml).map_err(|error| PropertyError::parse(path, error.to_string()))?;
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(mapping) => Ok(mapping),
        _ => Err(PropertyError::parse(
            path,
            "front matter must be a mapping of keys to values",
        )),
    }
}

fn parse_yaml(path: &Path, yaml: &str) -> PropertyResult<FrontMatter> {
    let mut front_matter = FrontMatter::default();
    for (key, value) in parse_mapping(path, yaml)? {
        let Some(key) = scalar_to_string(&key) else {
            return Err(PropertyError::parse(path, "front matter keys must be scalars"));
        };
        match key.as_str() {
            TITLE_KEY => front_matter.title = optional_scalar(path, TITLE_KEY, &value)?,
            TAGS_KEY => front_matter.tags = tag_list(path, &value)?,
            IDENTIFIER_KEY => {
                front_matter.identifier = optional_scalar(path, IDENTIFIER_KEY, &value)?
            }
            _ => {
                front_matter.extra.insert(key, value);
            }
        }
    }
    Ok(front_matter)
}

fn optional_scalar(path: &Path, key: &str, value: &Value) -> PropertyResult<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    scalar_to_string(value)
        .map(Some)
        .ok_or_else(|| PropertyError::parse(path, format!("`{key}` must be a scalar value")))
}

fn tag_list(path: &Path, value: &Value) -> PropertyResult<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                scalar_to_string(item).ok_or_else(|| {
                    PropertyError::parse(path, "`tags` entries must be scalar values")
                })
            })
            .collect(),
        other => scalar_to_string(other)
            .map(|tag| vec![tag])
            .ok_or_else(|| PropertyError::parse(path, "`tags` must be a list or a single tag")),
    }
}

pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

pub fn new_identifier() -> String {
    Uuid::new_v4().to_string()
}

/// Return `content` with `identifier` inserted as its `uuid`, or `None` when
/// the document already declares one. Other keys and the body are kept as-is.
pub fn with_identifier(
    path: &Path,
    content: &str,
    identifier: &str,
) -> PropertyResult<Option<String>> {
    let (yaml, body) = split(content);
    let mut mapping = match yaml {
        Some(yaml) => parse_mapping(path, yaml)?,
        None => Mapping::new(),
    };
    let key = Value::String(IDENTIFIER_KEY.to_string());
    if mapping.get(&key).is_some_and(|value| !value.is_null()) {
        return Ok(None);
    }
    mapping.insert(key, Value::String(identifier.to_string()));

    let rendered = serde_yaml::to_string(&mapping)
        .map_err(|error| PropertyError::parse(path, error.to_string()))?;
    Ok(Some(format!("---\n{rendered}---\n{body}")))
}
