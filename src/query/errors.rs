#![forbid(unsafe_code)]
#![allow(missing_docs)]

use thiserror::Error;

use crate::storage::Source;

/// Failure of a single plan step.
///
/// The executor records these in lineage and stops; they never escape
/// [`crate::query::PlanExecutor::execute`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepError {
    /// The step needs rows from an earlier step.
    #[error("{op} requires a prior result")]
    MissingInput { op: &'static str },
    /// A scan step was issued without a source.
    #[error("{op} step requires a source")]
    MissingSource { op: &'static str },
    /// The source has no configured location or cannot be scanned.
    #[error("source '{dataset}' is not available")]
    SourceUnavailable { dataset: Source },
    /// Reading the source's file failed.
    #[error("failed to load source '{dataset}': {message}")]
    Load { dataset: Source, message: String },
    /// A referenced column is absent after canonicalization.
    #[error("{context} column '{column}' not found (wanted '{wanted}')")]
    ColumnNotFound {
        context: &'static str,
        column: String,
        wanted: String,
    },
    /// One or more join keys are absent on either side.
    #[error("join keys missing; left={left:?} right={right:?}")]
    JoinKeysMissing {
        left: Vec<String>,
        right: Vec<String>,
    },
    /// The step's op code is not part of the plan language.
    #[error("unsupported op '{op}'")]
    UnsupportedOperation { op: String },
    /// The predicate operator is not recognized.
    #[error("unsupported filter operator '{op}'")]
    UnsupportedOperator { op: String },
    /// The aggregation function is not recognized.
    #[error("unsupported aggregation function '{func}'")]
    UnsupportedAggregate { func: String },
    /// A derive expression does not match `<col> <op> <col>`.
    #[error("unsupported expression '{expr}'")]
    InvalidExpression { expr: String },
}

impl StepError {
    /// Stable identifier for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            StepError::MissingInput { .. } => "MissingInput",
            StepError::MissingSource { .. } => "MissingSource",
            StepError::SourceUnavailable { .. } => "SourceUnavailable",
            StepError::Load { .. } => "SourceLoadFailed",
            StepError::ColumnNotFound { .. } => "ColumnNotFound",
            StepError::JoinKeysMissing { .. } => "JoinKeysMissing",
            StepError::UnsupportedOperation { .. } => "UnsupportedOperation",
            StepError::UnsupportedOperator { .. } => "UnsupportedOperator",
            StepError::UnsupportedAggregate { .. } => "UnsupportedAggregate",
            StepError::InvalidExpression { .. } => "InvalidExpression",
        }
    }

    pub(crate) fn column(context: &'static str, column: &str, wanted: &str) -> Self {
        StepError::ColumnNotFound {
            context,
            column: column.to_string(),
            wanted: wanted.to_string(),
        }
    }
}
