//! Structured request descriptor produced by the external classifier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::value::Value;

/// Planning intent assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Intent {
    /// Record lookups.
    Transactional,
    /// Filtered listings with optional grouping.
    Operational,
    /// Aggregates compared across a dimension.
    Comparative,
    /// Rows violating a business rule.
    Exception,
    /// Cross-source composition.
    Mixed,
    /// No structured plan.
    #[default]
    Fallback,
}

impl Intent {
    /// Upper-case tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Transactional => "TRANSACTIONAL",
            Intent::Operational => "OPERATIONAL",
            Intent::Comparative => "COMPARATIVE",
            Intent::Exception => "EXCEPTION",
            Intent::Mixed => "MIXED",
            Intent::Fallback => "FALLBACK",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = std::convert::Infallible;

    /// Unknown tags map to [`Intent::Fallback`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "TRANSACTIONAL" => Intent::Transactional,
            "OPERATIONAL" => Intent::Operational,
            "COMPARATIVE" => Intent::Comparative,
            "EXCEPTION" => Intent::Exception,
            "MIXED" => Intent::Mixed,
            _ => Intent::Fallback,
        })
    }
}

impl From<String> for Intent {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(intent) => intent,
            Err(never) => match never {},
        }
    }
}

impl From<Intent> for String {
    fn from(value: Intent) -> Self {
        value.as_str().to_string()
    }
}

/// Right-hand side of a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Another column of the same row.
    Column {
        /// Referenced column.
        colref: String,
    },
    /// Candidate set for `in`.
    List(Vec<Value>),
    /// Literal.
    Scalar(Value),
}

impl Default for FilterValue {
    fn default() -> Self {
        FilterValue::Scalar(Value::Null)
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Column { colref } => write!(f, "column({colref})"),
            FilterValue::List(values) => {
                let parts: Vec<String> = values.iter().map(Value::to_string).collect();
                write!(f, "[{}]", parts.join(","))
            }
            FilterValue::Scalar(value) => write!(f, "{value}"),
        }
    }
}

fn default_op() -> String {
    "eq".to_string()
}

/// `{col, op, value}` filter predicate.
///
/// `op` stays textual so unsupported operators surface as step errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    /// Column name, possibly an alias.
    pub col: String,
    /// Operator (`eq`, `==`, `in`, `contains`, `gt`, `<=`, ...).
    #[serde(default = "default_op")]
    pub op: String,
    /// Right-hand side.
    #[serde(default)]
    pub value: FilterValue,
}

impl Predicate {
    /// Predicate against a literal.
    pub fn new(col: impl Into<String>, op: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            col: col.into(),
            op: op.into(),
            value: FilterValue::Scalar(value.into()),
        }
    }

    /// Predicate comparing two columns of the same row.
    pub fn columns(col: impl Into<String>, op: impl Into<String>, other: impl Into<String>) -> Self {
        Self {
            col: col.into(),
            op: op.into(),
            value: FilterValue::Column {
                colref: other.into(),
            },
        }
    }

    /// Set-membership predicate.
    pub fn any_of(col: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            col: col.into(),
            op: "in".to_string(),
            value: FilterValue::List(values),
        }
    }
}

/// `(column, function)` aggregation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct MetricSpec {
    /// Aggregated column.
    pub column: String,
    /// Aggregation function name.
    pub func: String,
}

impl MetricSpec {
    /// Builds a metric.
    pub fn new(column: impl Into<String>, func: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            func: func.into(),
        }
    }
}

impl From<(String, String)> for MetricSpec {
    fn from((column, func): (String, String)) -> Self {
        Self { column, func }
    }
}

impl From<MetricSpec> for (String, String) {
    fn from(value: MetricSpec) -> Self {
        (value.column, value.func)
    }
}

/// Normalized output of the external classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDescriptor {
    /// Classified intent.
    pub intent: Intent,
    /// Explicit source name, if any.
    #[serde(alias = "target")]
    pub source: Option<String>,
    /// Filter predicates.
    pub filters: Vec<Predicate>,
    /// Group-by columns.
    pub group_by: Vec<String>,
    /// Aggregations.
    pub metrics: Vec<MetricSpec>,
    /// Sort column hint.
    pub sort_by: Option<String>,
    /// Sort direction hint (`asc`/`desc`).
    pub sort_order: Option<String>,
    /// Row cap hint.
    #[serde(alias = "top_k")]
    pub k: Option<usize>,
    /// Classifier believes aggregation is needed.
    pub need_aggregate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_parses_classifier_json() {
        let json = r#"{
            "intent": "operational",
            "target": "PO",
            "filters": [
                {"col": "status", "value": "open"},
                {"col": "received_qty", "op": "<", "value": {"colref": "ordered_qty"}},
                {"col": "item", "op": "in", "value": ["A", "B"]}
            ],
            "group_by": ["buyer"],
            "metrics": [["po_number", "count"]],
            "sort_order": "desc"
        }"#;
        let desc: RequestDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.intent, Intent::Operational);
        assert_eq!(desc.source.as_deref(), Some("PO"));
        assert_eq!(desc.filters[0].op, "eq");
        assert_eq!(
            desc.filters[1].value,
            FilterValue::Column {
                colref: "ordered_qty".into()
            }
        );
        assert!(matches!(desc.filters[2].value, FilterValue::List(ref v) if v.len() == 2));
        assert_eq!(desc.metrics, vec![MetricSpec::new("po_number", "count")]);
        assert_eq!(desc.k, None);
    }

    #[test]
    fn unknown_intents_fall_back() {
        assert_eq!(Intent::from("lookup".to_string()), Intent::Fallback);
        assert_eq!("Mixed".parse::<Intent>().unwrap(), Intent::Mixed);
    }
}
