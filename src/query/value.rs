//! Scalar cell values carried by relations and result rows.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Cell value. Serialized untagged so rows render as plain JSON objects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Missing cell.
    #[default]
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 text.
    String(String),
}

impl Value {
    /// True for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for integer and float cells.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Numeric view of the cell; text is parsed, booleans are not numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) if v.is_finite() => Some(*v),
            Value::String(s) => parse_number(s),
            _ => None,
        }
    }

    /// Date view of the cell. Only text cells are parsed.
    pub fn as_datetime(&self) -> Option<PrimitiveDateTime> {
        match self {
            Value::String(s) => parse_datetime(s),
            _ => None,
        }
    }

    /// Text rendering used for case-insensitive comparisons; `None` for nulls.
    pub fn as_text(&self) -> Option<String> {
        (!self.is_null()).then(|| self.to_string())
    }

    /// Ordering used by sort and grouping: numbers before text, nulls last.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Greater,
            (_, Value::Null) => Ordering::Less,
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                x.total_cmp(&y)
            }
            (a, _) if a.is_numeric() => Ordering::Less,
            (_, b) if b.is_numeric() => Ordering::Greater,
            (a, b) => a.to_string().cmp(&b.to_string()),
        }
    }

    /// Hashable identity used by grouping, distinct and join keys.
    pub fn key(&self) -> ValueKey {
        match self {
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Int(v) => ValueKey::Int(*v),
            Value::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => ValueKey::Int(*v as i64),
            Value::Float(v) => ValueKey::Float(v.to_bits()),
            Value::String(s) => ValueKey::Text(s.clone()),
        }
    }

    /// Infers a typed value from a raw CSV cell.
    pub fn from_cell(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        if let Ok(v) = trimmed.parse::<i64>() {
            return Value::Int(v);
        }
        if let Some(v) = parse_number(trimmed) {
            return Value::Float(v);
        }
        Value::String(raw.to_string())
    }
}

/// Identity of a value for hashing. Integral floats collapse onto integers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueKey {
    /// Missing cell.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer or integral float.
    Int(i64),
    /// Non-integral float bits.
    Float(u64),
    /// Text.
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::String(v) => f.write_str(v),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Parses a finite number, tolerating surrounding whitespace.
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses ISO dates and date-times, RFC 3339 timestamps and US `MM/DD/YYYY`.
pub fn parse_datetime(text: &str) -> Option<PrimitiveDateTime> {
    let text = text.trim();
    if text.len() < 8 {
        return None;
    }
    if let Ok(dt) = OffsetDateTime::parse(text, &Rfc3339) {
        let utc = dt.to_offset(UtcOffset::UTC);
        return Some(PrimitiveDateTime::new(utc.date(), utc.time()));
    }
    if let Ok(dt) = PrimitiveDateTime::parse(
        text,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    ) {
        return Some(dt);
    }
    if let Ok(dt) = PrimitiveDateTime::parse(
        text,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Some(dt);
    }
    if let Ok(dt) = PrimitiveDateTime::parse(
        text,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    ) {
        return Some(dt);
    }
    if let Ok(dt) = PrimitiveDateTime::parse(
        text,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    ) {
        return Some(dt);
    }
    if let Ok(date) = Date::parse(text, format_description!("[year]-[month]-[day]")) {
        return Some(date.midnight());
    }
    Date::parse(
        text,
        format_description!("[month padding:none]/[day padding:none]/[year]"),
    )
    .ok()
    .map(Date::midnight)
}
