//! Step results, lineage records and the final pipeline output.

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use super::request::Intent;
use crate::storage::{Row, Source};

/// Rows produced by one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecResult {
    /// Column order of `rows`.
    pub columns: Vec<String>,
    /// Row mappings.
    pub rows: Vec<Row>,
    /// Step-level annotations (truncation warnings, resolved names).
    pub meta: Map<String, JsonValue>,
}

impl ExecResult {
    /// Result with the given columns and rows and empty meta.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            meta: Map::new(),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows are present.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, in row order.
    pub fn column_values(&self, column: &str) -> Vec<crate::query::Value> {
        self.rows
            .iter()
            .map(|row| row.get(column).cloned().unwrap_or_default())
            .collect()
    }
}

/// Trace record for one attempted step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineageEntry {
    /// 1-based position in the plan.
    pub step: usize,
    /// Op code.
    pub op: String,
    /// Declared source, if any.
    pub source: Option<Source>,
    /// Parameters as planned.
    pub params: JsonValue,
    /// Parameters after canonicalization and defaulting.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub resolved: Map<String, JsonValue>,
    /// Rows after the step (unchanged input rows on failure).
    pub rows_after_step: usize,
    /// Wall time spent in the step.
    pub elapsed_ms: f64,
    /// Whether the row guardrail cut the step's output.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable failure code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
}

/// Pipeline-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecMeta {
    /// Intent of the executed plan.
    pub plan_intent: Intent,
    /// Rationale of the executed plan.
    pub plan_rationale: String,
    /// Hex fingerprint of the plan.
    pub plan_hash: String,
    /// One entry per attempted step.
    pub lineage: Vec<LineageEntry>,
    /// Steps beyond the guardrail were dropped.
    pub clipped: bool,
    /// Total wall time.
    pub elapsed_ms: f64,
    /// Set when nothing ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ExecMeta {
    /// First failing lineage entry, if any.
    pub fn failure(&self) -> Option<&LineageEntry> {
        self.lineage.iter().find(|entry| entry.error.is_some())
    }
}

/// Final rows plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecOutput {
    /// Column order of `rows`.
    pub columns: Vec<String>,
    /// Result rows.
    pub rows: Vec<Row>,
    /// Pipeline metadata.
    pub meta: ExecMeta,
}
