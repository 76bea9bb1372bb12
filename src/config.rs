/// NoteQuery Base Configuration
///
/// A base bundles base-level filters, formulas and a list of views. It is
/// read from a `.base` YAML file, from JSON, or from the frontmatter of a
/// document in the content tree.
///
/// Processing order for a base: base filters, then formulas in declaration
/// order, then each view's own filter, sort, grouping and summaries.

use crate::error::{Error, Result};
use crate::filter::{passes, FilterSpec};
use crate::formula::{FormulaSet, Formulas};
use crate::record::{ContentTree, Document, Record};
use crate::view::{apply_view, ViewResult, ViewSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Keys of a document's frontmatter that make up a base.
const BASE_KEYS: [&str; 3] = ["filters", "formulas", "views"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formulas: Option<Formulas>,
    #[serde(default)]
    pub views: Vec<ViewSpec>,
}

impl BaseConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a base file. `.json` files are read as JSON, anything else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_yaml_str(&contents),
        }
    }

    /// Read the base keys from a document's frontmatter.
    pub fn from_document(doc: &Document) -> Result<Self> {
        let fields: serde_json::Map<String, serde_json::Value> = BASE_KEYS
            .iter()
            .filter_map(|key| doc.properties.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect();
        Ok(serde_json::from_value(serde_json::Value::Object(fields))?)
    }

    /// Find a document by slug path and read its base keys.
    pub fn from_tree(tree: &ContentTree, slug_path: &str) -> Result<Self> {
        let doc = tree
            .document(slug_path)
            .ok_or_else(|| Error::DocumentNotFound(slug_path.to_string()))?;
        Self::from_document(doc)
    }

    pub fn formula_set(&self) -> FormulaSet {
        self.formulas
            .as_ref()
            .map(|formulas| FormulaSet::compile(&formulas.definitions()))
            .unwrap_or_default()
    }

    /// Apply the base filters and attach formula columns.
    ///
    /// Returns copies; the input records are left untouched.
    pub fn process(&self, records: &[Record]) -> Vec<Record> {
        let formulas = self.formula_set();
        let processed: Vec<Record> = records
            .iter()
            .filter(|record| passes(record, self.filters.as_ref()))
            .map(|record| formulas.apply(record))
            .collect();
        log::debug!(
            "Base kept {} of {} records, {} formulas attached",
            processed.len(),
            records.len(),
            formulas.len()
        );
        processed
    }

    /// Run the whole pipeline for every view, in declaration order.
    pub fn render(&self, records: &[Record]) -> Vec<ViewResult> {
        let processed = self.process(records);
        self.views.iter().map(|view| apply_view(&processed, view)).collect()
    }

    pub fn view(&self, name: &str) -> Result<&ViewSpec> {
        self.views
            .iter()
            .find(|view| view.name.as_deref() == Some(name))
            .ok_or_else(|| Error::ViewNotFound(name.to_string()))
    }

    /// Run the pipeline for a single named view.
    pub fn render_view(&self, records: &[Record], name: &str) -> Result<ViewResult> {
        let view = self.view(name)?;
        Ok(apply_view(&self.process(records), view))
    }
}
