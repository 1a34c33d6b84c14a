//! Row-level predicate evaluation.
//!
//! A [`Predicate`] is first bound against the relation's headers (operator
//! parsed, columns canonicalized), then evaluated into a boolean mask.
//! Missing or unparseable cells never match.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::str::FromStr;

use super::errors::StepError;
use super::request::{FilterValue, Predicate};
use super::value::Value;
use crate::storage::Row;

/// Supported comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equality.
    Eq,
    /// Negated equality.
    Ne,
    /// Set membership.
    In,
    /// Case-insensitive substring.
    Contains,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            _ => false,
        }
    }

    fn is_ordered(self) -> bool {
        matches!(self, CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le)
    }
}

impl FromStr for CompareOp {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "eq" | "==" | "=" => Ok(CompareOp::Eq),
            "ne" | "!=" | "<>" => Ok(CompareOp::Ne),
            "in" => Ok(CompareOp::In),
            "contains" => Ok(CompareOp::Contains),
            "gt" | ">" => Ok(CompareOp::Gt),
            "ge" | "gte" | ">=" => Ok(CompareOp::Ge),
            "lt" | "<" => Ok(CompareOp::Lt),
            "le" | "lte" | "<=" => Ok(CompareOp::Le),
            other => Err(StepError::UnsupportedOperator {
                op: other.to_string(),
            }),
        }
    }
}

/// Right-hand side after binding.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Literal value.
    Literal(Value),
    /// Candidate set.
    List(Vec<Value>),
    /// Column of the same row.
    Column(String),
}

/// A predicate whose columns name real keys of the rows it will see.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundPredicate {
    /// Row key of the left-hand column.
    pub column: String,
    /// Operator.
    pub op: CompareOp,
    /// Right-hand side.
    pub rhs: Operand,
}

impl BoundPredicate {
    /// Parses the operator and resolves column names through `resolve`.
    pub fn bind(
        predicate: &Predicate,
        resolve: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, StepError> {
        let op = predicate.op.parse::<CompareOp>()?;
        let column = resolve(&predicate.col)
            .ok_or_else(|| StepError::column("filter", &predicate.col, &predicate.col))?;
        let rhs = match &predicate.value {
            FilterValue::Column { colref } => Operand::Column(
                resolve(colref).ok_or_else(|| StepError::column("filter", colref, colref))?,
            ),
            FilterValue::List(values) => Operand::List(values.clone()),
            FilterValue::Scalar(value) if op == CompareOp::In => Operand::List(vec![value.clone()]),
            FilterValue::Scalar(value) => Operand::Literal(value.clone()),
        };
        Ok(Self { column, op, rhs })
    }

    /// Evaluates the predicate for every row.
    pub fn mask(&self, rows: &[Row]) -> Vec<bool> {
        match self.op {
            CompareOp::Eq => self.equality_mask(rows),
            CompareOp::Ne => self.equality_mask(rows).into_iter().map(|m| !m).collect(),
            CompareOp::In => self.membership_mask(rows),
            CompareOp::Contains => self.contains_mask(rows),
            _ => self.ordered_mask(rows),
        }
    }

    fn lhs<'r>(&self, row: &'r Row) -> &'r Value {
        row.get(&self.column).unwrap_or(&NULL)
    }

    fn equality_mask(&self, rows: &[Row]) -> Vec<bool> {
        match &self.rhs {
            Operand::Literal(rhs) => {
                let numeric = column_is_numeric(rows, &self.column);
                match (numeric, rhs.as_f64()) {
                    (true, Some(target)) => rows
                        .iter()
                        .map(|row| self.lhs(row).as_f64() == Some(target))
                        .collect(),
                    _ => {
                        let target = folded(rhs);
                        rows.iter()
                            .map(|row| target.is_some() && folded(self.lhs(row)) == target)
                            .collect()
                    }
                }
            }
            Operand::List(values) => self.membership(rows, values),
            Operand::Column(other) => rows
                .iter()
                .map(|row| loose_eq(self.lhs(row), row.get(other).unwrap_or(&NULL)))
                .collect(),
        }
    }

    fn membership_mask(&self, rows: &[Row]) -> Vec<bool> {
        match &self.rhs {
            Operand::List(values) => self.membership(rows, values),
            Operand::Literal(value) => self.membership(rows, std::slice::from_ref(value)),
            Operand::Column(_) => self.equality_mask(rows),
        }
    }

    fn membership(&self, rows: &[Row], values: &[Value]) -> Vec<bool> {
        let texts: HashSet<String> = values.iter().filter_map(folded).collect();
        let numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
        rows.iter()
            .map(|row| {
                let cell = self.lhs(row);
                if cell.is_numeric() {
                    if let Some(n) = cell.as_f64() {
                        if numbers.contains(&n) {
                            return true;
                        }
                    }
                }
                folded(cell).is_some_and(|text| texts.contains(&text))
            })
            .collect()
    }

    fn contains_mask(&self, rows: &[Row]) -> Vec<bool> {
        rows.iter()
            .map(|row| {
                let needle = match &self.rhs {
                    Operand::Literal(value) => folded(value),
                    Operand::Column(other) => row.get(other).and_then(folded),
                    Operand::List(_) => None,
                };
                match (folded(self.lhs(row)), needle) {
                    (Some(hay), Some(needle)) => hay.contains(&needle),
                    _ => false,
                }
            })
            .collect()
    }

    fn ordered_mask(&self, rows: &[Row]) -> Vec<bool> {
        debug_assert!(self.op.is_ordered());
        match &self.rhs {
            Operand::Literal(rhs) => self.ordered_against_literal(rows, rhs),
            Operand::Column(other) => self.ordered_against_column(rows, other),
            Operand::List(_) => vec![false; rows.len()],
        }
    }

    fn ordered_against_literal(&self, rows: &[Row], rhs: &Value) -> Vec<bool> {
        if let Some(target) = rhs.as_datetime() {
            if rows.iter().any(|row| self.lhs(row).as_datetime().is_some()) {
                return rows
                    .iter()
                    .map(|row| {
                        self.lhs(row)
                            .as_datetime()
                            .is_some_and(|dt| self.op.holds(dt.cmp(&target)))
                    })
                    .collect();
            }
        }
        if let Some(target) = rhs.as_f64() {
            if rows.iter().any(|row| self.lhs(row).as_f64().is_some()) {
                return rows
                    .iter()
                    .map(|row| {
                        self.lhs(row)
                            .as_f64()
                            .and_then(|n| n.partial_cmp(&target))
                            .is_some_and(|ord| self.op.holds(ord))
                    })
                    .collect();
            }
        }
        let Some(target) = rhs.as_text() else {
            return vec![false; rows.len()];
        };
        rows.iter()
            .map(|row| {
                self.lhs(row)
                    .as_text()
                    .is_some_and(|text| self.op.holds(text.as_str().cmp(target.as_str())))
            })
            .collect()
    }

    fn ordered_against_column(&self, rows: &[Row], other: &str) -> Vec<bool> {
        let rhs = |row: &Row| row.get(other).cloned().unwrap_or(Value::Null);
        let any_date = rows
            .iter()
            .any(|row| self.lhs(row).as_datetime().is_some() || rhs(row).as_datetime().is_some());
        if any_date {
            return rows
                .iter()
                .map(|row| match (self.lhs(row).as_datetime(), rhs(row).as_datetime()) {
                    (Some(a), Some(b)) => self.op.holds(a.cmp(&b)),
                    _ => false,
                })
                .collect();
        }
        let any_number = rows
            .iter()
            .any(|row| self.lhs(row).as_f64().is_some() || rhs(row).as_f64().is_some());
        if any_number {
            return rows
                .iter()
                .map(|row| {
                    match (self.lhs(row).as_f64(), rhs(row).as_f64()) {
                        (Some(a), Some(b)) => a.partial_cmp(&b).is_some_and(|o| self.op.holds(o)),
                        _ => false,
                    }
                })
                .collect();
        }
        rows.iter()
            .map(|row| match (self.lhs(row).as_text(), rhs(row).as_text()) {
                (Some(a), Some(b)) => self.op.holds(a.cmp(&b)),
                _ => false,
            })
            .collect()
    }
}

static NULL: Value = Value::Null;

/// AND of every predicate's mask.
pub fn conjunction(predicates: &[BoundPredicate], rows: &[Row]) -> Vec<bool> {
    let mut mask = vec![true; rows.len()];
    for predicate in predicates {
        for (keep, hit) in mask.iter_mut().zip(predicate.mask(rows)) {
            *keep &= hit;
        }
    }
    mask
}

/// A column is numeric when every non-null cell is a number.
pub fn column_is_numeric(rows: &[Row], column: &str) -> bool {
    let mut seen = false;
    for value in rows.iter().filter_map(|row| row.get(column)) {
        match value {
            Value::Null => {}
            v if v.is_numeric() => seen = true,
            _ => return false,
        }
    }
    seen
}

fn folded(value: &Value) -> Option<String> {
    value.as_text().map(|text| text.trim().to_lowercase())
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_numeric() || b.is_numeric() => x == y,
        _ => folded(a) == folded(b),
    }
}
