#![forbid(unsafe_code)]

//! Query planning and execution.
//!
//! A classified request flows through [`PlanBuilder`] into a [`Plan`], which
//! [`PlanExecutor`] runs against the adapter registry, producing rows plus a
//! step-by-step lineage.

/// Per-source column alias rules and resolution.
///
/// Maps casual or vendor-specific header spellings onto the names the rest of
/// the pipeline uses.
pub mod canonical;

/// Step-level error type.
pub mod errors;

/// Plan execution.
///
/// Runs steps strictly in order, enforces guardrails and records lineage.
pub mod executor;

/// Sort, top-k and group-by phrase parsers.
pub mod hints;

/// Schema lookup used by the plan builder.
pub mod metadata;

/// Relational operators over materialized rows.
pub mod operators;

/// Plan and step types.
pub mod plan;

/// Plan construction per intent.
pub mod planner;

/// Predicate binding and evaluation.
pub mod predicate;

/// Performance profiling for query operations.
///
/// Collects timing and count statistics when `ATLAS_PROFILE` is set.
pub mod profile;

/// Request descriptor exchanged with the classifier.
pub mod request;

/// Step results and lineage.
pub mod result;

/// Cell values.
pub mod value;

pub use canonical::{canonicalizer, AliasRule, Canonicalizer, SourceRules};
pub use errors::StepError;
pub use executor::PlanExecutor;
pub use metadata::{InMemorySchema, SchemaProvider};
pub use plan::{Operation, Plan, Step};
pub use planner::PlanBuilder;
pub use profile::{profile_snapshot, QueryProfileSnapshot};
pub use request::{FilterValue, Intent, MetricSpec, Predicate, RequestDescriptor};
pub use result::{ExecMeta, ExecOutput, ExecResult, LineageEntry};
pub use value::Value;
