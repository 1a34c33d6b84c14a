//! Plan and step types exchanged between the builder and the executor.

use std::fmt;
use std::hash::Hasher;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use xxhash_rust::xxh64::Xxh64;

use super::request::{Intent, MetricSpec, Predicate};
use crate::storage::Source;

/// Ordered steps plus the intent and rationale that produced them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    /// Intent label.
    pub intent: Intent,
    /// Human-readable reason for the chosen shape.
    pub rationale: String,
    /// Steps, executed in order.
    pub steps: Vec<Step>,
}

impl Plan {
    /// Plan with no steps; routes the caller to retrieval.
    pub fn fallback(rationale: impl Into<String>) -> Self {
        Self {
            intent: Intent::Fallback,
            rationale: rationale.into(),
            steps: Vec::new(),
        }
    }

    /// Deterministic 64-bit fingerprint of the plan shape.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh64::new(0);
        hasher.write(self.intent.as_str().as_bytes());
        hasher.write_u64(self.steps.len() as u64);
        for step in &self.steps {
            hasher.write(step.op_name().as_bytes());
            hasher.write(step.source.map_or("", Source::as_str).as_bytes());
            hasher.write(step.params_json().to_string().as_bytes());
        }
        hasher.finish()
    }

    /// One line per step, for terminal output.
    pub fn explain(&self) -> String {
        let mut out = format!("{} :: {}\n", self.intent, self.rationale);
        for (idx, step) in self.steps.iter().enumerate() {
            out.push_str(&format!("  #{} {step}\n", idx + 1));
        }
        out
    }
}

/// A single relational operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Source read by scan steps; informational for the rest.
    pub source: Option<Source>,
    /// Operation and its parameters.
    pub operation: Operation,
}

/// Operation kinds understood by the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Scan a source with predicates.
    Filter(ScanParams),
    /// Same as `Filter`; kept for plans produced by retrieval-aware callers.
    Vector(ScanParams),
    /// Join the running result with another source.
    Join(JoinParams),
    /// Group and aggregate.
    Aggregate(AggregateParams),
    /// Stable sort.
    Sort(SortParams),
    /// Optional sort, then head.
    TopK(TopKParams),
    /// Remove duplicate rows.
    Distinct(DistinctParams),
    /// Add arithmetic columns.
    Derive(DeriveParams),
    /// An op code outside the plan language.
    Unsupported(String),
}

impl Step {
    /// Scan step.
    pub fn filter(source: Source, params: ScanParams) -> Self {
        Self {
            source: Some(source),
            operation: Operation::Filter(params),
        }
    }

    /// Step inheriting the running source.
    pub fn inherit(operation: Operation) -> Self {
        Self {
            source: None,
            operation,
        }
    }

    /// Op code as it appears in lineage.
    pub fn op_name(&self) -> &str {
        match &self.operation {
            Operation::Filter(_) => "filter",
            Operation::Vector(_) => "vector",
            Operation::Join(_) => "join",
            Operation::Aggregate(_) => "aggregate",
            Operation::Sort(_) => "sort",
            Operation::TopK(_) => "topk",
            Operation::Distinct(_) => "distinct",
            Operation::Derive(_) => "derive",
            Operation::Unsupported(op) => op,
        }
    }

    /// Parameters rendered as JSON.
    pub fn params_json(&self) -> serde_json::Value {
        let value = match &self.operation {
            Operation::Filter(p) | Operation::Vector(p) => serde_json::to_value(p),
            Operation::Join(p) => serde_json::to_value(p),
            Operation::Aggregate(p) => serde_json::to_value(p),
            Operation::Sort(p) => serde_json::to_value(p),
            Operation::TopK(p) => serde_json::to_value(p),
            Operation::Distinct(p) => serde_json::to_value(p),
            Operation::Derive(p) => serde_json::to_value(p),
            Operation::Unsupported(_) => Ok(serde_json::Value::Object(Default::default())),
        };
        value.unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for Step {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Step", 3)?;
        state.serialize_field("op", self.op_name())?;
        state.serialize_field("source", &self.source)?;
        state.serialize_field("params", &self.params_json())?;
        state.end()
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op_name())?;
        if let Some(source) = self.source {
            write!(f, " [{source}]")?;
        }
        write!(f, " {}", self.params_json())
    }
}

/// Parameters of `filter` / `vector`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanParams {
    /// Conjunctive predicates.
    #[serde(rename = "where", default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Predicate>,
    /// Projection; empty keeps every column.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub select: Vec<String>,
    /// Row cap applied after filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Join flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    /// Keep every left row.
    #[default]
    Left,
    /// Keep matches only.
    Inner,
    /// Keep every right row.
    Right,
    /// Keep everything.
    Outer,
}

/// Parameters of `join`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinParams {
    /// Join flavour.
    #[serde(default)]
    pub how: JoinKind,
    /// Source loaded for the right side.
    pub right_source: Source,
    /// Predicates applied to the right side before joining.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub right_filters: Vec<Predicate>,
    /// Right-side projection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub right_select: Vec<String>,
    /// Right-side row cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_limit: Option<usize>,
    /// `(left column, right column)` key pairs.
    pub on: Vec<(String, String)>,
}

/// Parameters of `aggregate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateParams {
    /// Grouping columns; empty means one summary row.
    #[serde(default)]
    pub by: Vec<String>,
    /// Aggregations.
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,
}

/// Parameters of `sort`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SortParams {
    /// Structured column from the classifier; wins over `by`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    /// Free-form "column [asc|desc]" text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
    /// Order word (`asc`, `desc`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    /// Explicit direction flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ascending: Option<bool>,
    /// Row cap applied after sorting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Parameters of `topk`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopKParams {
    /// Rows kept.
    pub k: usize,
    /// Ordering column; `None` keeps the current order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
    /// Direction; defaults to descending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ascending: Option<bool>,
}

impl Default for TopKParams {
    fn default() -> Self {
        Self {
            k: 10,
            by: None,
            ascending: None,
        }
    }
}

/// Parameters of `distinct`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistinctParams {
    /// Columns compared; empty compares whole rows.
    #[serde(default)]
    pub cols: Vec<String>,
}

/// One `alias = <col> <op> <col>` expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeriveExpr {
    /// Output column.
    #[serde(rename = "as")]
    pub alias: String,
    /// Expression text.
    pub expr: String,
}

impl DeriveExpr {
    /// Builds an expression.
    pub fn new(alias: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            expr: expr.into(),
        }
    }
}

/// Parameters of `derive`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeriveParams {
    /// Expressions, evaluated in order.
    #[serde(default)]
    pub expressions: Vec<DeriveExpr>,
}
