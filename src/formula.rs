/// NoteQuery Formula Implementation
///
/// Formulas are named arithmetic expressions attached to records as
/// `formula.<name>` columns. A formula either yields a finite number or
/// null: any referenced property that is missing, null or empty makes the
/// whole formula null, and so does a malformed expression.
///
/// Formulas are attached in declaration order to a copy of each record, so
/// a formula may read the columns of the formulas declared before it.

use crate::expr::{eval_formula_expr, parse_expr, Expr, ExprError};
use crate::record::Record;
use crate::value::Value;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Prefix of the record keys formula results are stored under.
pub const FORMULA_PREFIX: &str = "formula.";

static PIPE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\|[+-]?\s*").expect("valid pipe pattern"));

/// A named formula as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaDef {
    pub name: String,
    pub formula: String,
}

impl FormulaDef {
    pub fn new(name: impl Into<String>, formula: impl Into<String>) -> Self {
        FormulaDef {
            name: name.into(),
            formula: formula.into(),
        }
    }

    /// Record key the result is stored under.
    pub fn key(&self) -> String {
        format!("{}{}", FORMULA_PREFIX, self.name)
    }
}

/// Formulas as they appear in configuration: an ordered list of
/// `{name, formula}` entries or a plain mapping from name to expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Formulas {
    List(Vec<FormulaDef>),
    Map(IndexMap<String, String>),
}

impl Formulas {
    /// Definitions in declaration order.
    pub fn definitions(&self) -> Vec<FormulaDef> {
        match self {
            Formulas::List(defs) => defs.clone(),
            Formulas::Map(map) => map.iter().map(|(name, formula)| FormulaDef::new(name, formula)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Formulas::List(defs) => defs.is_empty(),
            Formulas::Map(map) => map.is_empty(),
        }
    }
}

impl Default for Formulas {
    fn default() -> Self {
        Formulas::List(Vec::new())
    }
}

/// Strip the YAML block-scalar pipe some configurations leave in front of
/// the expression.
fn clean_formula(formula: &str) -> &str {
    let start = PIPE_PREFIX.find(formula).map_or(0, |m| m.end());
    formula[start..].trim()
}

fn compile(formula: &str) -> Option<Expr> {
    let source = clean_formula(formula);
    match parse_expr(source) {
        Ok(expr) => Some(expr),
        Err(err) => {
            log::warn!("Formula parse failed: {:?}: {}", source, err);
            None
        }
    }
}

fn evaluate_compiled(expr: &Expr, record: &Record) -> Option<f64> {
    let value = match eval_formula_expr(expr, record) {
        Ok(value) => value,
        Err(ExprError::MissingInput(name)) => {
            log::debug!("Formula skipped, no value for {:?}", name);
            return None;
        }
        Err(err) => {
            log::warn!("Formula evaluation failed: {}", err);
            return None;
        }
    };

    let number = match value {
        Value::Number(n) => n,
        Value::Date(_) => value.to_number(),
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Evaluate a formula string against a record.
///
/// Returns `None` when an input is missing, the expression is malformed or
/// the result is not a finite number.
pub fn evaluate_formula(record: &Record, formula: &str) -> Option<f64> {
    compile(formula).and_then(|expr| evaluate_compiled(&expr, record))
}

/// A formula parsed once for evaluation over many records.
#[derive(Debug, Clone)]
struct CompiledFormula {
    key: String,
    expr: Option<Expr>,
}

/// An ordered set of parsed formulas.
#[derive(Debug, Clone, Default)]
pub struct FormulaSet {
    formulas: Vec<CompiledFormula>,
}

impl FormulaSet {
    pub fn compile(defs: &[FormulaDef]) -> Self {
        FormulaSet {
            formulas: defs
                .iter()
                .map(|def| CompiledFormula {
                    key: def.key(),
                    expr: compile(&def.formula),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }

    /// Copy the record and attach every formula column to the copy.
    pub fn apply(&self, record: &Record) -> Record {
        let mut result = record.clone();
        for formula in &self.formulas {
            let value = formula
                .expr
                .as_ref()
                .and_then(|expr| evaluate_compiled(expr, &result));
            result.insert(formula.key.clone(), value);
        }
        result
    }

    pub fn apply_all(&self, records: &[Record]) -> Vec<Record> {
        records.iter().map(|record| self.apply(record)).collect()
    }
}

/// Attach `formula.<name>` columns to a copy of `record`.
pub fn attach_formulas(record: &Record, defs: &[FormulaDef]) -> Record {
    FormulaSet::compile(defs).apply(record)
}
