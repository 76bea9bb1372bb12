//! Filter predicate evaluation.
//!
//! A predicate string is matched against a fixed list of shapes, first match
//! wins:
//!
//! 1. `file.hasProperty('name')`
//! 2. `file.fullname|name|path.startsWith|endsWith|includes|contains('s')`
//! 3. `<property>.startsWith|endsWith|includes|contains('s')`
//! 4. `<left> <op> <right>` with `op` one of `> >= < <= == === != !==` or
//!    `contains includes startsWith endsWith`
//! 5. a bare property name (existence check)
//! 6. anything else goes through the general expression evaluator
//!
//! Shapes 1-3 match the whole predicate and may be negated with a leading
//! `!`. Their string tests are case-sensitive, while the word operators of
//! shape 4 compare case-insensitively. A predicate joined with `&&` or `||`
//! outside of quotes skips shapes 4 and 5 and goes to the general evaluator.
//!
//! Evaluation never fails: malformed predicates are logged and read as false.

use crate::expr::{eval_expr, parse_expr};
use crate::formula::evaluate_formula;
use crate::record::Record;
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;

static HAS_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(!?)file\.hasProperty\(['"](.+?)['"]\)$"#).expect("valid hasProperty pattern")
});

static FILE_STRING_OP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(!?)(file\.(?:fullname|name|path))\.(startsWith|endsWith|includes|contains)\(['"](.+?)['"]\)$"#)
        .expect("valid file string pattern")
});

static PROPERTY_STRING_OP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(!?)([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\.(startsWith|endsWith|includes|contains)\(['"](.+?)['"]\)$"#)
        .expect("valid property string pattern")
});

static COMPARISON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)\s*([><=!]+|!==|===|!=|==|contains|includes|startsWith|endsWith)\s*(.+)$")
        .expect("valid comparison pattern")
});

static BARE_PROPERTY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid property pattern"));

static NUMBER_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").expect("valid number pattern"));

static ARITHMETIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-+*/]").expect("valid arithmetic pattern"));

/// Comparison operators recognised in `<left> <op> <right>` predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Gt,         // >
    Ge,         // >=
    Lt,         // <
    Le,         // <=
    LooseEq,    // ==
    StrictEq,   // ===
    LooseNe,    // !=
    StrictNe,   // !==
    Contains,   // contains, includes
    StartsWith, // startsWith
    EndsWith,   // endsWith
}

impl ComparisonOp {
    pub fn parse(op: &str) -> Option<Self> {
        let op = match op {
            ">" => ComparisonOp::Gt,
            ">=" => ComparisonOp::Ge,
            "<" => ComparisonOp::Lt,
            "<=" => ComparisonOp::Le,
            "==" => ComparisonOp::LooseEq,
            "===" => ComparisonOp::StrictEq,
            "!=" => ComparisonOp::LooseNe,
            "!==" => ComparisonOp::StrictNe,
            "contains" | "includes" => ComparisonOp::Contains,
            "startsWith" => ComparisonOp::StartsWith,
            "endsWith" => ComparisonOp::EndsWith,
            _ => return None,
        };
        Some(op)
    }
}

/// Evaluate a predicate string against a record.
pub fn evaluate(record: &Record, expression: &str) -> bool {
    let expression = expression.trim();

    if let Some(caps) = HAS_PROPERTY.captures(expression) {
        let present = record.lookup(&caps[2]).map_or(false, |v| !v.is_blank());
        return negate(&caps[1], present);
    }

    if let Some(caps) = FILE_STRING_OP
        .captures(expression)
        .or_else(|| PROPERTY_STRING_OP.captures(expression))
    {
        let result = string_method(record, &caps[2], &caps[3], &caps[4]);
        return negate(&caps[1], result);
    }

    if has_logical_operator(expression) {
        return evaluate_general(record, expression);
    }

    if let Some(caps) = COMPARISON.captures(expression) {
        let left = resolve_operand(record, &caps[1]);
        let right = resolve_operand(record, &caps[3]);
        return match ComparisonOp::parse(caps[2].trim()) {
            Some(op) => compare_values(&left, op, &right),
            None => false,
        };
    }

    if BARE_PROPERTY.is_match(expression) {
        return record.get(expression).map_or(false, |v| !v.is_null());
    }

    evaluate_general(record, expression)
}

fn evaluate_general(record: &Record, expression: &str) -> bool {
    match parse_expr(expression).and_then(|expr| eval_expr(&expr, record)) {
        Ok(value) => value.is_truthy(),
        Err(err) => {
            log::warn!("Filter evaluation failed: {:?}: {}", expression, err);
            false
        }
    }
}

/// Whether `&&` or `||` appears outside a quoted string.
fn has_logical_operator(expression: &str) -> bool {
    let mut quote = None;
    let mut prev = None;
    for c in expression.chars() {
        match quote {
            Some(q) if c == q && prev != Some('\\') => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if (c == '&' || c == '|') && prev == Some(c) => return true,
            None => {}
        }
        prev = Some(c);
    }
    false
}

fn negate(bang: &str, result: bool) -> bool {
    if bang.is_empty() {
        result
    } else {
        !result
    }
}

/// Case-sensitive string test; falsy properties read as the empty string.
fn string_method(record: &Record, property: &str, method: &str, needle: &str) -> bool {
    let haystack = match record.lookup(property) {
        Some(value) if value.is_truthy() => value.to_display(),
        _ => String::new(),
    };
    match method {
        "startsWith" => haystack.starts_with(needle),
        "endsWith" => haystack.ends_with(needle),
        _ => haystack.contains(needle),
    }
}

/// Resolve one side of a comparison.
///
/// Tried in order: quoted string, number, `true`/`false`/`null`, property
/// name, arithmetic formula, and finally the token itself as a string.
pub fn resolve_operand(record: &Record, text: &str) -> Value {
    let text = text.trim();

    let quoted = |q: char| text.starts_with(q) && text.ends_with(q);
    if quoted('"') || quoted('\'') {
        return Value::String(text.get(1..text.len().saturating_sub(1)).unwrap_or("").to_string());
    }

    if NUMBER_LITERAL.is_match(text) {
        return Value::Number(text.parse().unwrap_or(f64::NAN));
    }

    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }

    if let Some(value) = record.lookup(text) {
        return value.into_owned();
    }

    if ARITHMETIC.is_match(text) {
        return evaluate_formula(record, text).map_or(Value::Null, Value::Number);
    }

    Value::String(text.to_string())
}

/// Compare two resolved operands.
///
/// When either side is null only `==` and `!=` can succeed.
pub fn compare_values(left: &Value, op: ComparisonOp, right: &Value) -> bool {
    if left.is_null() || right.is_null() {
        return match op {
            ComparisonOp::LooseEq => left.loose_eq(right),
            ComparisonOp::LooseNe => !left.loose_eq(right),
            _ => false,
        };
    }

    let lower = |v: &Value| v.to_display().to_lowercase();
    match op {
        ComparisonOp::Gt => left.to_number() > right.to_number(),
        ComparisonOp::Ge => left.to_number() >= right.to_number(),
        ComparisonOp::Lt => left.to_number() < right.to_number(),
        ComparisonOp::Le => left.to_number() <= right.to_number(),
        ComparisonOp::LooseEq => left.loose_eq(right),
        ComparisonOp::StrictEq => left.strict_eq(right),
        ComparisonOp::LooseNe => !left.loose_eq(right),
        ComparisonOp::StrictNe => !left.strict_eq(right),
        ComparisonOp::Contains => lower(left).contains(&lower(right)),
        ComparisonOp::StartsWith => lower(left).starts_with(&lower(right)),
        ComparisonOp::EndsWith => lower(left).ends_with(&lower(right)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record() -> Record {
        [
            ("file.name", Value::from("Saturday Night Wrist")),
            ("file.path", Value::from("Music/albums/Deftones - Saturday Night Wrist.md")),
            ("file.fullname", Value::from("Deftones - Saturday Night Wrist.md")),
            ("artist", Value::from("Deftones")),
            ("release_date", Value::Number(2005.0)),
            ("rating", Value::Number(4.0)),
            ("score", Value::from("7")),
            ("image", Value::from("[[snw.jpg]]")),
            ("empty", Value::from("")),
            ("nothing", Value::Null),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_has_property() {
        let record = make_record();
        assert!(evaluate(&record, "file.hasProperty('rating')"));
        assert!(evaluate(&record, "file.hasProperty(\"image\")"));
        assert!(!evaluate(&record, "file.hasProperty('empty')"));
        assert!(!evaluate(&record, "file.hasProperty('nothing')"));
        assert!(!evaluate(&record, "file.hasProperty('missing')"));
        assert!(evaluate(&record, "!file.hasProperty('missing')"));
    }

    #[test]
    fn test_has_property_spec_cases() {
        let rated: Record = [("rating", Value::Number(4.0))].into_iter().collect();
        let blank: Record = [("rating", Value::from(""))].into_iter().collect();
        assert!(evaluate(&rated, "file.hasProperty('rating')"));
        assert!(!evaluate(&blank, "file.hasProperty('rating')"));
        assert!(!evaluate(&Record::new(), "file.hasProperty('rating')"));
    }

    #[test]
    fn test_file_string_methods_are_case_sensitive() {
        let record = make_record();
        assert!(evaluate(&record, "file.path.startsWith(\"Music\")"));
        assert!(!evaluate(&record, "file.path.startsWith(\"music\")"));
        assert!(evaluate(&record, "file.name.contains('Night')"));
        assert!(evaluate(&record, "file.fullname.endsWith('.md')"));
        assert!(!evaluate(&record, "file.name.includes('night')"));
    }

    #[test]
    fn test_property_string_methods() {
        let record = make_record();
        assert!(evaluate(&record, "artist.startsWith('Def')"));
        assert!(!evaluate(&record, "artist.startsWith('def')"));
        assert!(evaluate(&record, "note.artist.endsWith('tones')"));
        assert!(evaluate(&record, "release_date.contains('200')"));
        assert!(!evaluate(&record, "missing.contains('a')"));
        assert!(evaluate(&record, "!artist.contains('Korn')"));
    }

    #[test]
    fn test_numeric_comparisons() {
        let record = make_record();
        assert!(evaluate(&record, "rating >= 4"));
        assert!(evaluate(&record, "rating>3"));
        assert!(!evaluate(&record, "rating < 4"));
        assert!(evaluate(&record, "score > 6"));
        assert!(evaluate(&record, "rating * 2 > 7"));
        assert!(!evaluate(&record, "artist > 1"));
    }

    #[test]
    fn test_equality_comparisons() {
        let record = make_record();
        assert!(evaluate(&record, "artist == 'Deftones'"));
        assert!(evaluate(&record, "score == 7"));
        assert!(!evaluate(&record, "score === 7"));
        assert!(evaluate(&record, "score === '7'"));
        assert!(evaluate(&record, "artist != \"Korn\""));
        assert!(evaluate(&record, "file.name !== 'x'"));
    }

    #[test]
    fn test_word_operators_are_case_insensitive() {
        let record = make_record();
        assert!(evaluate(&record, "artist contains 'TONES'"));
        assert!(evaluate(&record, "artist startsWith \"def\""));
        assert!(evaluate(&record, "file.path endsWith 'WRIST.MD'"));
    }

    #[test]
    fn test_null_comparisons() {
        let record = make_record();
        assert!(evaluate(&record, "nothing == null"));
        assert!(!evaluate(&record, "nothing != null"));
        assert!(evaluate(&record, "rating != null"));
        assert!(!evaluate(&record, "nothing > 1"));
        assert!(!evaluate(&record, "nothing contains 'a'"));
        // arithmetic over a missing property resolves to null
        assert!(!evaluate(&record, "missing + 1 > 0"));
    }

    #[test]
    fn test_bare_property() {
        let record = make_record();
        assert!(evaluate(&record, "rating"));
        assert!(evaluate(&record, "empty"));
        assert!(!evaluate(&record, "nothing"));
        assert!(!evaluate(&record, "missing"));
    }

    #[test]
    fn test_fallback_expressions() {
        let record = make_record();
        assert!(evaluate(&record, "!image.isEmpty()"));
        assert!(!evaluate(&record, "empty.isEmpty() && missing"));
        assert!(evaluate(&record, "missing.isEmpty() || false"));
        assert!(evaluate(&record, "file.ext"));
    }

    #[test]
    fn test_malformed_predicates_are_false() {
        let record = make_record();
        assert!(!evaluate(&record, "rating ="));
        assert!(!evaluate(&record, "(("));
        assert!(!evaluate(&record, "unknown_fn(1)"));
        assert!(!evaluate(&record, "nothing.length"));
        assert!(!evaluate(&record, "rating => 3"));
    }

    #[test]
    fn test_string_methods_inside_compound_predicates() {
        let record = make_record();
        assert!(evaluate(&record, "file.name.contains('Night') && rating >= 4"));
        assert!(evaluate(&record, "file.name.startsWith('Sat') || rating > 10"));
        assert!(!evaluate(&record, "file.name.startsWith('sat') || rating > 10"));
        assert!(evaluate(&record, "artist == 'Deftones' && file.hasProperty('image')"));
        assert!(!evaluate(&record, "artist == 'Deftones' && rating < 2"));
        // operators inside quotes do not make a compound
        let quoted: Record = [("title", Value::from("Rock && Roll"))].into_iter().collect();
        assert!(evaluate(&quoted, "title == 'Rock && Roll'"));
        assert!(evaluate(&quoted, "title contains \"&&\""));
    }

    #[test]
    fn test_long_method_chain_is_rejected_not_overflowed() {
        let chain = format!("image{}", ".isEmpty()".repeat(1000));
        assert!(!evaluate(&make_record(), &chain));
        let sum = format!("rating{} > 0", " + 1".repeat(1000));
        assert!(!evaluate(&make_record(), &sum));
    }

    #[test]
    fn test_unquoted_dates_with_leading_zeros_resolve_to_null() {
        let record = make_record();
        assert_eq!(resolve_operand(&record, "2010-01-01"), Value::Null);
        assert!(!evaluate(&record, "release_date > 2010-01-01"));
        assert!(!evaluate(&record, "release_date < 2010-01-01"));
        assert_eq!(resolve_operand(&record, "2010-12-31"), Value::Number(1967.0));
    }

    #[test]
    fn test_resolve_operand() {
        let record = make_record();
        assert_eq!(resolve_operand(&record, "'a'"), Value::from("a"));
        assert_eq!(resolve_operand(&record, "-1.5"), Value::Number(-1.5));
        assert_eq!(resolve_operand(&record, "null"), Value::Null);
        assert_eq!(resolve_operand(&record, "rating"), Value::Number(4.0));
        assert_eq!(resolve_operand(&record, "rating + 1"), Value::Number(5.0));
        assert_eq!(resolve_operand(&record, "Music"), Value::from("Music"));
    }
}
