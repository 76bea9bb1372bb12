/// NoteQuery - Query Engine for Note Frontmatter
///
/// Treats a collection of notes as a queryable table. Each note's frontmatter
/// becomes a flat record; bases then filter those records with predicate
/// expressions, attach derived formula columns, and render views that sort,
/// group and summarize the result for display.
///
/// ```
/// use notequery::{BaseConfig, ContentTree};
///
/// let tree = ContentTree::from_json_str(r#"{
///     "a": { "path": "Music/A.md", "title": "A", "rating": 3 },
///     "b": { "path": "Music/B.md", "title": "B", "rating": 5 }
/// }"#).unwrap();
/// let base = BaseConfig::from_yaml_str(r#"
/// views:
///   - name: Best
///     filters: rating > 4
///     order: [file.name, rating]
/// "#).unwrap();
///
/// let results = base.render(&tree.collect_records());
/// assert_eq!(results[0].records().count(), 1);
/// assert_eq!(results[0].columns, vec!["file.name", "rating"]);
/// ```

pub mod value;
pub mod collate;
pub mod record;
pub mod expr;
pub mod predicate;
pub mod filter;
pub mod formula;
pub mod view;
pub mod config;
pub mod error;

pub use value::Value;
pub use record::{ContentNode, ContentTree, Document, Folder, PropertyType, PropertyTypes, Record};
pub use expr::{eval_expr, eval_formula_expr, extract_properties, parse_expr, Expr, ExprError};
pub use predicate::evaluate;
pub use filter::{evaluate_filter, FilterSpec};
pub use formula::{attach_formulas, evaluate_formula, FormulaDef, FormulaSet, Formulas};
pub use view::{apply_view, Aggregation, GroupSpec, SortDirection, SortRule, ViewResult, ViewRow, ViewSpec};
pub use config::BaseConfig;
pub use error::{Error, Result};
