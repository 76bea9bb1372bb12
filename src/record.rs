/// NoteQuery Record Implementation
///
/// A Record is the flat property bag of one document: its frontmatter plus
/// the synthetic `file.*` identity fields. Records are collected once per
/// query from the content tree and are never mutated by the query engine;
/// derived columns are attached to copies.
///
/// # Examples
///
/// ```
/// use notequery::{ContentTree, Value};
///
/// let tree = ContentTree::from_json_str(r#"{
///     "music": {
///         "foxing": { "path": "Music/Foxing.md", "title": "Foxing", "rating": 4.5 },
///         "_meta": { "__originalName": "Music" }
///     },
///     "index": { "path": "index.md", "title": "Home" }
/// }"#).unwrap();
///
/// let records = tree.collect_records();
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].get("file.url"), Some(&Value::from("/music/foxing")));
/// assert_eq!(records[0].get("rating"), Some(&Value::Number(4.5)));
/// ```

use crate::error::Result;
use crate::value::Value;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;

pub const FILE_NAME: &str = "file.name";
pub const FILE_PATH: &str = "file.path";
pub const FILE_FULLNAME: &str = "file.fullname";
pub const FILE_URL: &str = "file.url";
pub const FILE_EXT: &str = "file.ext";

/// Flat property bag for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    properties: IndexMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Raw access by exact key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Resolve a property name the way expressions see it.
    ///
    /// Exact keys win. Otherwise `file.ext` is derived from `file.path`, and
    /// `note.<name>` falls back to the frontmatter property `<name>`.
    pub fn lookup(&self, name: &str) -> Option<Cow<'_, Value>> {
        if let Some(value) = self.properties.get(name) {
            return Some(Cow::Borrowed(value));
        }
        if name == FILE_EXT {
            let path = self.properties.get(FILE_PATH)?.to_display();
            return Some(Cow::Owned(Value::String(extension(&path).to_string())));
        }
        name.strip_prefix("note.")
            .and_then(|rest| self.properties.get(rest))
            .map(Cow::Borrowed)
    }

    /// Insert or replace a property. Replacing keeps the key's position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.properties.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.properties.shift_remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Record {
            properties: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

fn extension(path: &str) -> &str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("")
}

// ============================================================================
// Content tree
// ============================================================================

/// Nested mapping from slug to document or folder, as produced by the
/// directory scanner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentTree {
    nodes: IndexMap<String, ContentNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentNode {
    Document(Document),
    Folder(Folder),
}

/// A leaf document: its source path plus every frontmatter property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub path: String,
    #[serde(flatten)]
    pub properties: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Folder {
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<IndexMap<String, serde_json::Value>>,
    #[serde(flatten)]
    pub children: IndexMap<String, ContentNode>,
}

/// Obsidian property type hint (`.obsidian/types.json`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Text,
    Multitext,
    Number,
    #[serde(other)]
    Other,
}

pub type PropertyTypes = HashMap<String, PropertyType>;

const META_KEY: &str = "_meta";
const INDEX_KEY: &str = "index";

impl ContentTree {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_nodes(nodes: IndexMap<String, ContentNode>) -> Self {
        ContentTree { nodes }
    }

    pub fn nodes(&self) -> &IndexMap<String, ContentNode> {
        &self.nodes
    }

    /// Find a document by its slug path, e.g. `music/some-great-albums`.
    pub fn document(&self, slug_path: &str) -> Option<&Document> {
        let mut nodes = &self.nodes;
        let mut segments = slug_path.trim_matches('/').split('/').peekable();
        while let Some(segment) = segments.next() {
            match (nodes.get(segment)?, segments.peek()) {
                (ContentNode::Document(doc), None) => return Some(doc),
                (ContentNode::Folder(folder), Some(_)) => nodes = &folder.children,
                _ => return None,
            }
        }
        None
    }

    /// Flatten the tree into one record per document, in tree order.
    ///
    /// Folder metadata and `index` documents are skipped.
    pub fn collect_records(&self) -> Vec<Record> {
        let mut records = Vec::new();
        collect_into(&self.nodes, "", None, &mut records);
        log::debug!("collected {} records", records.len());
        records
    }

    /// Like `collect_records`, converting property values by type hint.
    pub fn collect_records_with_types(&self, types: &PropertyTypes) -> Vec<Record> {
        let mut records = Vec::new();
        collect_into(&self.nodes, "", Some(types), &mut records);
        log::debug!("collected {} records", records.len());
        records
    }
}

fn collect_into(
    nodes: &IndexMap<String, ContentNode>,
    parent_slug: &str,
    types: Option<&PropertyTypes>,
    records: &mut Vec<Record>,
) {
    for (key, node) in nodes {
        if key == META_KEY || key == INDEX_KEY {
            continue;
        }
        let slug = if parent_slug.is_empty() {
            key.clone()
        } else {
            format!("{}/{}", parent_slug, key)
        };
        match node {
            ContentNode::Document(doc) => records.push(doc.to_record(key, &slug, types)),
            ContentNode::Folder(folder) => collect_into(&folder.children, &slug, types, records),
        }
    }
}

impl Document {
    /// Build the public record for this document.
    ///
    /// `file.name` is the title (or the slug when untitled), `file.path` the
    /// source path, `file.fullname` its last segment and `file.url` the route.
    /// Frontmatter properties follow and may shadow the synthetic fields.
    pub fn to_record(&self, key: &str, slug: &str, types: Option<&PropertyTypes>) -> Record {
        let name = match self.properties.get("title").map(|t| Value::from(t.clone())) {
            Some(title) if title.is_truthy() => title,
            _ => Value::from(key),
        };
        let fullname = self.path.rsplit('/').next().unwrap_or(&self.path);

        let mut record = Record::new();
        record.insert(FILE_NAME, name);
        record.insert(FILE_PATH, self.path.as_str());
        record.insert(FILE_FULLNAME, fullname);
        record.insert(FILE_URL, format!("/{}", slug));
        for (prop, raw) in &self.properties {
            let value = Value::from(raw.clone());
            let value = match types {
                Some(types) => convert_property(prop, value, types),
                None => value,
            };
            record.insert(prop.as_str(), value);
        }
        record
    }
}

static NUMERIC_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").expect("valid numeric pattern"));

/// Apply a property's type hint, or the numeric-text default when it has none.
pub fn convert_property(key: &str, value: Value, types: &PropertyTypes) -> Value {
    if value.is_null() {
        return value;
    }
    match types.get(key) {
        Some(PropertyType::Text) | Some(PropertyType::Multitext) => {
            Value::String(value.to_display())
        }
        Some(PropertyType::Number) => {
            let n = value.to_number();
            if n.is_nan() {
                value
            } else {
                Value::Number(n)
            }
        }
        _ => match &value {
            Value::String(s) if NUMERIC_TEXT.is_match(s.trim()) => {
                Value::Number(s.trim().parse().unwrap_or(f64::NAN))
            }
            _ => value,
        },
    }
}
