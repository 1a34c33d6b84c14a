//! Relational kernels used by the executor. Inputs are already resolved to
//! real column names; none of these functions touch the canonicalizer.

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

use super::errors::StepError;
use super::plan::JoinKind;
use super::result::ExecResult;
use super::value::{Value, ValueKey};
use crate::storage::Row;

/// Aggregation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    /// Non-null count.
    Count,
    /// Numeric sum.
    Sum,
    /// Numeric mean.
    Mean,
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
    /// Distinct non-null count.
    CountDistinct,
    /// First non-null value.
    First,
    /// Last non-null value.
    Last,
}

impl AggFunc {
    /// Lower-case name used in derived column names.
    pub fn as_str(self) -> &'static str {
        match self {
            AggFunc::Count => "count",
            AggFunc::Sum => "sum",
            AggFunc::Mean => "mean",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::CountDistinct => "nunique",
            AggFunc::First => "first",
            AggFunc::Last => "last",
        }
    }

    fn apply(self, values: &[&Value]) -> Value {
        let present = values.iter().copied().filter(|v| !v.is_null());
        match self {
            AggFunc::Count => Value::Int(present.count() as i64),
            AggFunc::Sum => {
                let mut int_sum: Option<i64> = Some(0);
                let mut float_sum = 0.0;
                for value in present {
                    let Some(n) = value.as_f64() else {
                        continue;
                    };
                    float_sum += n;
                    int_sum = match (int_sum, value) {
                        (Some(acc), Value::Int(v)) => acc.checked_add(*v),
                        _ => None,
                    };
                }
                int_sum.map_or(Value::Float(float_sum), Value::Int)
            }
            AggFunc::Mean => {
                let numbers: Vec<f64> = present.filter_map(Value::as_f64).collect();
                if numbers.is_empty() {
                    Value::Null
                } else {
                    Value::Float(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
            AggFunc::Min => present.min_by(|a, b| a.sort_cmp(b)).cloned().unwrap_or_default(),
            AggFunc::Max => present.max_by(|a, b| a.sort_cmp(b)).cloned().unwrap_or_default(),
            AggFunc::CountDistinct => {
                let distinct: FxHashSet<ValueKey> = present.map(Value::key).collect();
                Value::Int(distinct.len() as i64)
            }
            AggFunc::First => values
                .iter()
                .find(|v| !v.is_null())
                .map(|v| (*v).clone())
                .unwrap_or_default(),
            AggFunc::Last => present.last().cloned().unwrap_or_default(),
        }
    }
}

impl FromStr for AggFunc {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "count" | "size" => Ok(AggFunc::Count),
            "sum" | "total" => Ok(AggFunc::Sum),
            "mean" | "avg" | "average" => Ok(AggFunc::Mean),
            "min" => Ok(AggFunc::Min),
            "max" => Ok(AggFunc::Max),
            "nunique" | "count_distinct" | "distinct_count" => Ok(AggFunc::CountDistinct),
            "first" => Ok(AggFunc::First),
            "last" => Ok(AggFunc::Last),
            other => Err(StepError::UnsupportedAggregate {
                func: other.to_string(),
            }),
        }
    }
}

/// Groups `input` by `by` and evaluates `metrics` per group.
///
/// Output columns are `by` followed by one column per metric; the first
/// metric over a column keeps the column's name.
pub fn aggregate(input: &ExecResult, by: &[String], metrics: &[(String, AggFunc)]) -> ExecResult {
    let mut names: Vec<String> = Vec::with_capacity(metrics.len());
    for (column, func) in metrics {
        let taken = by.contains(column) || names.contains(column);
        names.push(if taken {
            format!("{column}_{}", func.as_str())
        } else {
            column.clone()
        });
    }
    let mut columns = by.to_vec();
    columns.extend(names.iter().cloned());

    if input.rows.is_empty() {
        return ExecResult::new(columns, Vec::new());
    }

    let mut index: FxHashMap<Vec<ValueKey>, usize> = FxHashMap::default();
    let mut groups: Vec<(Vec<Value>, Vec<usize>)> = Vec::new();
    for (row_idx, row) in input.rows.iter().enumerate() {
        let values: Vec<Value> = by
            .iter()
            .map(|col| row.get(col).cloned().unwrap_or_default())
            .collect();
        let key: Vec<ValueKey> = values.iter().map(Value::key).collect();
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push((values, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(row_idx);
    }
    groups.sort_by(|(a, _), (b, _)| compare_keys(a, b));

    let rows = groups
        .into_iter()
        .map(|(key_values, members)| {
            let mut out = Row::new();
            for (col, value) in by.iter().zip(key_values) {
                out.insert(col.clone(), value);
            }
            for ((column, func), name) in metrics.iter().zip(&names) {
                let cells: Vec<&Value> = members
                    .iter()
                    .map(|&i| input.rows[i].get(column).unwrap_or(&NULL))
                    .collect();
                out.insert(name.clone(), func.apply(&cells));
            }
            out
        })
        .collect();
    ExecResult::new(columns, rows)
}

fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.sort_cmp(y))
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

static NULL: Value = Value::Null;

/// Joins `left` and `right` on `(left, right)` key pairs.
///
/// Keys named identically on both sides collapse into one column. Other
/// shared names get `_x` / `_y` suffixes. Rows with a null key never match.
pub fn join(
    left: &ExecResult,
    right: &ExecResult,
    keys: &[(String, String)],
    how: JoinKind,
) -> ExecResult {
    let shared: Vec<&str> = keys
        .iter()
        .filter(|(l, r)| l == r)
        .map(|(l, _)| l.as_str())
        .collect();
    let overlap: FxHashSet<&str> = left
        .columns
        .iter()
        .filter(|c| right.columns.contains(c) && !shared.contains(&c.as_str()))
        .map(String::as_str)
        .collect();
    let left_names: Vec<(String, String)> = left
        .columns
        .iter()
        .map(|c| {
            let out = if overlap.contains(c.as_str()) {
                format!("{c}_x")
            } else {
                c.clone()
            };
            (c.clone(), out)
        })
        .collect();
    let right_names: Vec<(String, String)> = right
        .columns
        .iter()
        .filter(|c| !shared.contains(&c.as_str()))
        .map(|c| {
            let out = if overlap.contains(c.as_str()) {
                format!("{c}_y")
            } else {
                c.clone()
            };
            (c.clone(), out)
        })
        .collect();
    let mut columns: Vec<String> = left_names.iter().map(|(_, out)| out.clone()).collect();
    columns.extend(right_names.iter().map(|(_, out)| out.clone()));

    let left_keys: Vec<&str> = keys.iter().map(|(l, _)| l.as_str()).collect();
    let right_keys: Vec<&str> = keys.iter().map(|(_, r)| r.as_str()).collect();

    let merge = |l: Option<&Row>, r: Option<&Row>| -> Row {
        let mut out = Row::new();
        for (src, dst) in &left_names {
            let value = match (l, r) {
                (Some(row), _) => row.get(src).cloned().unwrap_or_default(),
                (None, Some(row)) if shared.contains(&src.as_str()) => {
                    row.get(src).cloned().unwrap_or_default()
                }
                _ => Value::Null,
            };
            out.insert(dst.clone(), value);
        }
        for (src, dst) in &right_names {
            let value = r
                .and_then(|row| row.get(src).cloned())
                .unwrap_or_default();
            out.insert(dst.clone(), value);
        }
        out
    };

    let mut rows = Vec::new();
    match how {
        JoinKind::Right => {
            let index = key_index(&left.rows, &left_keys);
            for r in &right.rows {
                match row_key(r, &right_keys).and_then(|k| index.get(&k)) {
                    Some(matches) => rows.extend(matches.iter().map(|&i| merge(Some(&left.rows[i]), Some(r)))),
                    None => rows.push(merge(None, Some(r))),
                }
            }
        }
        JoinKind::Left | JoinKind::Inner | JoinKind::Outer => {
            let index = key_index(&right.rows, &right_keys);
            let mut matched = vec![false; right.rows.len()];
            for l in &left.rows {
                match row_key(l, &left_keys).and_then(|k| index.get(&k)) {
                    Some(hits) => {
                        for &i in hits {
                            matched[i] = true;
                            rows.push(merge(Some(l), Some(&right.rows[i])));
                        }
                    }
                    None if how != JoinKind::Inner => rows.push(merge(Some(l), None)),
                    None => {}
                }
            }
            if how == JoinKind::Outer {
                for (i, r) in right.rows.iter().enumerate() {
                    if !matched[i] {
                        rows.push(merge(None, Some(r)));
                    }
                }
            }
        }
    }
    ExecResult::new(columns, rows)
}

fn row_key(row: &Row, columns: &[&str]) -> Option<Vec<ValueKey>> {
    columns
        .iter()
        .map(|c| match row.get(*c) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.key()),
        })
        .collect()
}

fn key_index(rows: &[Row], columns: &[&str]) -> FxHashMap<Vec<ValueKey>, Vec<usize>> {
    let mut index: FxHashMap<Vec<ValueKey>, Vec<usize>> = FxHashMap::default();
    for (i, row) in rows.iter().enumerate() {
        if let Some(key) = row_key(row, columns) {
            index.entry(key).or_default().push(i);
        }
    }
    index
}

/// Comparison mode chosen for a sort column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    /// At least one cell parsed as a number.
    Numeric,
    /// Text ordering.
    Lexicographic,
}

impl SortMode {
    /// Lower-case label for lineage.
    pub fn as_str(self) -> &'static str {
        match self {
            SortMode::Numeric => "numeric",
            SortMode::Lexicographic => "lexicographic",
        }
    }
}

/// Stable sort on one column. Missing or unparseable keys go last in either
/// direction.
pub fn sort_rows(rows: Vec<Row>, column: &str, ascending: bool) -> (Vec<Row>, SortMode) {
    let numeric = rows
        .iter()
        .any(|row| row.get(column).and_then(Value::as_f64).is_some());
    let mode = if numeric {
        SortMode::Numeric
    } else {
        SortMode::Lexicographic
    };
    let direct = |ord: Ordering| if ascending { ord } else { ord.reverse() };
    let sorted = if numeric {
        let mut keyed: Vec<(Option<f64>, Row)> = rows
            .into_iter()
            .map(|row| (row.get(column).and_then(Value::as_f64), row))
            .collect();
        keyed.sort_by(|(a, _), (b, _)| nulls_last(a.as_ref(), b.as_ref(), |x, y| direct(x.total_cmp(y))));
        keyed.into_iter().map(|(_, row)| row).collect()
    } else {
        let mut keyed: Vec<(Option<String>, Row)> = rows
            .into_iter()
            .map(|row| (row.get(column).and_then(Value::as_text), row))
            .collect();
        keyed.sort_by(|(a, _), (b, _)| nulls_last(a.as_ref(), b.as_ref(), |x, y| direct(x.cmp(y))));
        keyed.into_iter().map(|(_, row)| row).collect()
    };
    (sorted, mode)
}

fn nulls_last<T>(a: Option<&T>, b: Option<&T>, cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Keeps the first row for each distinct key over `columns` (all columns
/// when empty).
pub fn distinct(input: &ExecResult, columns: &[String]) -> ExecResult {
    let keys: &[String] = if columns.is_empty() {
        &input.columns
    } else {
        columns
    };
    let mut seen: FxHashSet<Vec<ValueKey>> = FxHashSet::default();
    let rows = input
        .rows
        .iter()
        .filter(|row| {
            let key = keys
                .iter()
                .map(|c| row.get(c).map_or(ValueKey::Null, Value::key))
                .collect();
            seen.insert(key)
        })
        .cloned()
        .collect();
    ExecResult::new(input.columns.clone(), rows)
}

/// Arithmetic operator of a derive expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division; a zero divisor yields null.
    Div,
}

/// Splits `<col> <op> <col>`.
pub fn parse_expression(expr: &str) -> Result<(String, ArithOp, String), StepError> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"^\s*([A-Za-z0-9_.]+)\s*([+\-*/])\s*([A-Za-z0-9_.]+)\s*$").ok())
        .as_ref();
    let invalid = || StepError::InvalidExpression {
        expr: expr.to_string(),
    };
    let caps = pattern.and_then(|re| re.captures(expr)).ok_or_else(invalid)?;
    let op = match &caps[2] {
        "+" => ArithOp::Add,
        "-" => ArithOp::Sub,
        "*" => ArithOp::Mul,
        "/" => ArithOp::Div,
        _ => return Err(invalid()),
    };
    Ok((caps[1].to_string(), op, caps[3].to_string()))
}

/// Evaluates `a op b` for every row into `alias`.
pub fn derive(input: ExecResult, alias: &str, a: &str, op: ArithOp, b: &str) -> ExecResult {
    let ExecResult {
        mut columns,
        rows,
        meta,
    } = input;
    if !columns.iter().any(|c| c == alias) {
        columns.push(alias.to_string());
    }
    let rows = rows
        .into_iter()
        .map(|mut row| {
            let lhs = row.get(a).cloned().unwrap_or_default();
            let rhs = row.get(b).cloned().unwrap_or_default();
            row.insert(alias.to_string(), arithmetic(&lhs, op, &rhs));
            row
        })
        .collect();
    ExecResult {
        columns,
        rows,
        meta,
    }
}

fn arithmetic(lhs: &Value, op: ArithOp, rhs: &Value) -> Value {
    if let (Value::Int(x), Value::Int(y)) = (lhs, rhs) {
        let exact = match op {
            ArithOp::Add => x.checked_add(*y),
            ArithOp::Sub => x.checked_sub(*y),
            ArithOp::Mul => x.checked_mul(*y),
            ArithOp::Div => None,
        };
        if let Some(v) = exact {
            return Value::Int(v);
        }
    }
    let x = numeric_or_zero(lhs);
    let y = numeric_or_zero(rhs);
    match op {
        ArithOp::Add => Value::Float(x + y),
        ArithOp::Sub => Value::Float(x - y),
        ArithOp::Mul => Value::Float(x * y),
        ArithOp::Div if y == 0.0 => Value::Null,
        ArithOp::Div => Value::Float(x / y),
    }
}

fn numeric_or_zero(value: &Value) -> f64 {
    value.as_f64().unwrap_or(0.0)
}
