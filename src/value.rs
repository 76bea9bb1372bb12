/// NoteQuery Value Implementation
///
/// A `Value` is one frontmatter property: a tagged union over the shapes a
/// YAML/JSON scalar (or list of scalars) can take, plus a `Date` variant
/// produced by the date functions of the expression language.
///
/// # Coercion table
///
/// Every operator in the query language goes through one of the explicit
/// conversions below instead of relying on ambient rules.
///
/// | from \ to | number (`to_number`)        | string (`to_display`)     | truthy (`is_truthy`) |
/// |-----------|-----------------------------|---------------------------|----------------------|
/// | Null      | 0                           | `"null"`                  | false                |
/// | Bool      | 1 / 0                       | `"true"` / `"false"`      | itself               |
/// | Number    | itself                      | shortest form, `4` not `4.0` | non-zero and not NaN |
/// | String    | trimmed decimal/hex parse, `""` is 0, otherwise NaN | itself | non-empty      |
/// | Date      | epoch milliseconds          | `YYYY-MM-DD[THH:MM:SS]`   | true                 |
/// | List      | number of its string form   | items joined by `,`       | true                 |
///
/// Loose equality (`==`) compares same-typed values directly, treats Null
/// as equal only to Null, and otherwise converts Bool to Number, then
/// compares Number against String numerically and anything against a List
/// or Date through their string forms. Strict equality (`===`) never
/// converts.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Property value
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(NaiveDateTime),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True only for the `Number` variant. Numeric-looking strings are not numbers.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// Interpret the value as a point in time.
    ///
    /// Dates are returned as-is, strings are parsed as date-like text and
    /// numbers are read as epoch milliseconds.
    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => Some(*d),
            Value::String(s) => parse_date_like(s),
            Value::Number(ms) if ms.is_finite() => {
                DateTime::from_timestamp_millis(*ms as i64).map(|d| d.naive_utc())
            }
            _ => None,
        }
    }

    /// Null or the empty string. Used by `file.hasProperty`.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Falsy or an empty list. Used by `.isEmpty()`.
    pub fn is_empty_value(&self) -> bool {
        match self {
            Value::List(items) => items.is_empty(),
            other => !other.is_truthy(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Date(_) | Value::List(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => parse_number(s),
            Value::Date(d) => d.and_utc().timestamp_millis() as f64,
            Value::List(_) => parse_number(&self.to_display()),
        }
    }

    pub fn to_display(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Date(d) => format_date(d),
            Value::List(items) => items
                .iter()
                .map(|item| match item {
                    Value::Null => String::new(),
                    other => other.to_display(),
                })
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Equality without conversion. Lists compare element-wise.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.strict_eq(y))
            }
            _ => false,
        }
    }

    /// Type-converting equality, see the coercion table above.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Bool(_), _) => Value::Number(self.to_number()).loose_eq(other),
            (_, Value::Bool(_)) => self.loose_eq(&Value::Number(other.to_number())),
            (Value::Number(a), Value::String(_)) => *a == other.to_number(),
            (Value::String(_), Value::Number(b)) => self.to_number() == *b,
            (Value::List(_) | Value::Date(_), Value::List(_) | Value::Date(_)) => self.strict_eq(other),
            (Value::List(_) | Value::Date(_), _) => {
                Value::String(self.to_display()).loose_eq(other)
            }
            (_, Value::List(_) | Value::Date(_)) => {
                self.loose_eq(&Value::String(other.to_display()))
            }
            _ => self.strict_eq(other),
        }
    }

    /// Relational comparison used by `<`, `<=`, `>`, `>=` in general expressions.
    ///
    /// Two strings compare lexically, everything else numerically. Returns
    /// `None` when either side is not a number (the comparison is then false).
    pub fn relational_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self.as_primitive(), other.as_primitive()) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(&b)),
            (a, b) => a.to_number().partial_cmp(&b.to_number()),
        }
    }

    /// Lists become their string form; dates become epoch milliseconds.
    fn as_primitive(&self) -> Value {
        match self {
            Value::List(_) => Value::String(self.to_display()),
            Value::Date(_) => Value::Number(self.to_number()),
            other => other.clone(),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            // Nested mappings are not queryable; keep their JSON text for display.
            obj @ serde_json::Value::Object(_) => Value::String(obj.to_string()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Value::String(s) => serializer.serialize_str(s),
            Value::Date(d) => serializer.serialize_str(&format_date(d)),
            Value::List(items) => items.serialize(serializer),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// Parse text the way a frontmatter value is read as a number.
///
/// Surrounding whitespace is ignored, the empty string is 0, `0x`/`0o`/`0b`
/// prefixes and `Infinity` are accepted, anything else that is not a plain
/// decimal literal is NaN.
pub fn parse_number(text: &str) -> f64 {
    let s = text.trim();
    if s.is_empty() {
        return 0.0;
    }

    let radix = match s.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        return u64::from_str_radix(&s[2..], radix)
            .map(|v| v as f64)
            .unwrap_or(f64::NAN);
    }

    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    // Rust also accepts "inf" and "nan"; restrict to decimal literal characters.
    if !s.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) {
        return f64::NAN;
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}

/// Render a number in its shortest form: `4`, `4.5`, `-0.25`, `NaN`, `Infinity`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.abs() >= 1e21 {
        let formatted = format!("{:e}", n);
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => formatted,
        };
    }
    if n.fract() == 0.0 {
        return format!("{:.0}", n);
    }
    format!("{}", n)
}

/// Parse `YYYY-MM-DD`, RFC 3339 and `YYYY-MM-DD[T ]HH:MM[:SS]` text.
pub fn parse_date_like(text: &str) -> Option<NaiveDateTime> {
    let s = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn format_date(d: &NaiveDateTime) -> String {
    if d.num_seconds_from_midnight() == 0 && d.nanosecond() == 0 {
        d.format("%Y-%m-%d").to_string()
    } else {
        d.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42"), 42.0);
        assert_eq!(parse_number("  4.5 "), 4.5);
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("0x10"), 16.0);
        assert_eq!(parse_number("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_number("inf").is_nan());
        assert!(parse_number("2011-07-31").is_nan());
        assert!(parse_number("abc").is_nan());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(4.0), "4");
        assert_eq!(format_number(4.5), "4.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(1e21), "1e+21");
    }

    #[test]
    fn test_loose_equality() {
        assert!(Value::Number(4.0).loose_eq(&Value::from("4")));
        assert!(Value::from("1").loose_eq(&Value::Bool(true)));
        assert!(Value::Null.loose_eq(&Value::Null));
        assert!(!Value::Null.loose_eq(&Value::Number(0.0)));
        assert!(!Value::Null.loose_eq(&Value::from("")));
        assert!(Value::from(vec!["a", "b"]).loose_eq(&Value::from("a,b")));
        assert!(!Value::Number(f64::NAN).loose_eq(&Value::Number(f64::NAN)));
    }

    #[test]
    fn test_strict_equality() {
        assert!(!Value::Number(4.0).strict_eq(&Value::from("4")));
        assert!(Value::from("a").strict_eq(&Value::from("a")));
        assert!(Value::from(vec![1, 2]).strict_eq(&Value::from(vec![1, 2])));
    }

    #[test]
    fn test_truthiness_and_emptiness() {
        assert!(!Value::Number(0.0).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::List(vec![]).is_truthy());
        assert!(Value::List(vec![]).is_empty_value());
        assert!(Value::from("").is_empty_value());
        assert!(Value::Null.is_blank());
        assert!(!Value::Number(0.0).is_blank());
    }

    #[test]
    fn test_date_like() {
        let d = Value::from("2011-07-31").as_date().unwrap();
        assert_eq!(d.format("%Y-%m-%d").to_string(), "2011-07-31");
        assert_eq!(Value::Date(d).to_display(), "2011-07-31");
        assert!(Value::from("[[snw.jpg]]").as_date().is_none());
        assert_eq!(Value::Number(0.0).as_date().unwrap().format("%Y").to_string(), "1970");
    }

    #[test]
    fn test_from_json() {
        let json: serde_json::Value = serde_json::json!({"a": [1, "two", null]});
        let value = Value::from(json["a"].clone());
        assert_eq!(value.to_display(), "1,two,");
        assert_eq!(Value::from(serde_json::json!({"k": 1})).as_str(), Some("{\"k\":1}"));
    }
}
