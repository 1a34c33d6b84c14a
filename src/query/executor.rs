//! Plan executor.
//!
//! Runs a [`Plan`]'s steps in order against the adapter registry. Each step
//! handler returns `Result<ExecResult, StepError>`; the driver records every
//! attempt in lineage and halts at the first failure, returning the last
//! successful result. Nothing escapes [`PlanExecutor::execute`] as an error.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, warn};

use super::canonical::canonicalizer;
use super::errors::StepError;
use super::hints::{order_direction, sort_synonym, split_order_suffix};
use super::operators::{self, AggFunc};
use super::plan::{
    AggregateParams, DeriveParams, DistinctParams, JoinParams, Operation, Plan, ScanParams,
    SortParams, Step, TopKParams,
};
use super::predicate::{conjunction, BoundPredicate};
use super::profile::{profile_timer, record_profile_timer, QueryProfileKind};
use super::request::Predicate;
use super::result::{ExecMeta, ExecOutput, ExecResult, LineageEntry};
use crate::config::Guardrails;
use crate::storage::{AdapterRegistry, Relation, Row, Source};

type StepResult = Result<ExecResult, StepError>;

/// State threaded between steps.
#[derive(Debug, Default)]
struct ExecContext {
    /// Output of the last successful step.
    last: Option<ExecResult>,
    /// Source the current rows belong to; `All` after a join.
    source: Option<Source>,
}

impl ExecContext {
    fn input(&self, op: &'static str) -> Result<&ExecResult, StepError> {
        self.last.as_ref().ok_or(StepError::MissingInput { op })
    }
}

/// Executes plans against a shared registry under fixed guardrails.
#[derive(Debug, Clone)]
pub struct PlanExecutor {
    registry: Arc<AdapterRegistry>,
    guardrails: Guardrails,
}

impl PlanExecutor {
    /// Creates an executor.
    pub fn new(registry: Arc<AdapterRegistry>, guardrails: Guardrails) -> Self {
        Self {
            registry,
            guardrails,
        }
    }

    /// Guardrails in effect.
    pub fn guardrails(&self) -> Guardrails {
        self.guardrails
    }

    /// Runs `plan` and returns its final rows with lineage.
    pub fn execute(&self, plan: &Plan) -> ExecOutput {
        let started = Instant::now();
        let mut meta = ExecMeta {
            plan_intent: plan.intent,
            plan_rationale: plan.rationale.clone(),
            plan_hash: format!("{:016x}", plan.fingerprint()),
            lineage: Vec::new(),
            clipped: false,
            elapsed_ms: 0.0,
            warning: None,
        };
        if plan.steps.is_empty() {
            meta.warning = Some("No steps to execute".to_string());
            return ExecOutput {
                columns: Vec::new(),
                rows: Vec::new(),
                meta,
            };
        }

        let max_steps = self.guardrails.max_steps;
        let steps = if plan.steps.len() > max_steps {
            warn!(
                planned = plan.steps.len(),
                max_steps, "atlas.plan.clipped"
            );
            meta.clipped = true;
            &plan.steps[..max_steps]
        } else {
            &plan.steps[..]
        };

        let mut ctx = ExecContext::default();
        for (idx, step) in steps.iter().enumerate() {
            let position = idx + 1;
            let step_started = Instant::now();
            let mut resolved = Map::new();
            let outcome = self.run_step(step, &ctx, &mut resolved);
            let elapsed_ms = millis(step_started);
            let mut entry = LineageEntry {
                step: position,
                op: step.op_name().to_string(),
                source: step.source.or(ctx.source),
                params: step.params_json(),
                resolved,
                rows_after_step: 0,
                elapsed_ms,
                truncated: false,
                error: None,
                error_code: None,
            };
            match outcome {
                Ok(mut result) => {
                    let limit = self.guardrails.max_rows_per_step;
                    if result.rows.len() > limit {
                        result.rows.truncate(limit);
                        let warning = format!("rows clipped to {limit}");
                        result
                            .meta
                            .insert("warning".into(), JsonValue::String(warning.clone()));
                        entry.resolved.insert("warning".into(), JsonValue::String(warning));
                        entry.truncated = true;
                    }
                    entry.rows_after_step = result.len();
                    debug!(
                        step = position,
                        op = step.op_name(),
                        rows = result.len(),
                        elapsed_ms,
                        "atlas.step.completed"
                    );
                    match &step.operation {
                        Operation::Filter(_) | Operation::Vector(_) => ctx.source = step.source,
                        Operation::Join(_) => ctx.source = Some(Source::All),
                        _ => {}
                    }
                    ctx.last = Some(result);
                    meta.lineage.push(entry);
                }
                Err(err) => {
                    warn!(
                        step = position,
                        op = step.op_name(),
                        code = err.code(),
                        error = %err,
                        "atlas.step.failed"
                    );
                    entry.rows_after_step = ctx.last.as_ref().map_or(0, ExecResult::len);
                    entry.error = Some(err.to_string());
                    entry.error_code = Some(err.code());
                    meta.lineage.push(entry);
                    break;
                }
            }
        }

        meta.elapsed_ms = millis(started);
        let (columns, rows) = ctx
            .last
            .map(|result| (result.columns, result.rows))
            .unwrap_or_default();
        debug!(
            intent = %meta.plan_intent,
            plan_hash = %meta.plan_hash,
            rows = rows.len(),
            elapsed_ms = meta.elapsed_ms,
            "atlas.plan.executed"
        );
        ExecOutput {
            columns,
            rows,
            meta,
        }
    }

    fn run_step(
        &self,
        step: &Step,
        ctx: &ExecContext,
        resolved: &mut Map<String, JsonValue>,
    ) -> StepResult {
        match &step.operation {
            Operation::Filter(params) | Operation::Vector(params) => {
                self.scan(step.op_name(), step.source, params, resolved)
            }
            Operation::Join(params) => self.join(params, ctx, resolved),
            Operation::Aggregate(params) => aggregate(params, ctx, resolved),
            Operation::Sort(params) => sort(params, ctx, resolved),
            Operation::TopK(params) => topk(params, ctx, resolved),
            Operation::Distinct(params) => distinct(params, ctx, resolved),
            Operation::Derive(params) => derive(params, ctx, resolved),
            Operation::Unsupported(op) => Err(StepError::UnsupportedOperation { op: op.clone() }),
        }
    }

    fn scan(
        &self,
        op: &str,
        source: Option<Source>,
        params: &ScanParams,
        resolved: &mut Map<String, JsonValue>,
    ) -> StepResult {
        let op: &'static str = if op == "vector" { "vector" } else { "filter" };
        let source = source.ok_or(StepError::MissingSource { op })?;
        if !source.is_loadable() {
            return Err(StepError::SourceUnavailable { dataset: source });
        }
        let relation = self.registry.relation(source)?;
        let timer = profile_timer();
        let result = scan_relation(
            &relation,
            source,
            &params.filters,
            &params.select,
            params.limit,
            resolved,
        );
        record_profile_timer(QueryProfileKind::Filter, timer);
        result
    }

    fn join(
        &self,
        params: &JoinParams,
        ctx: &ExecContext,
        resolved: &mut Map<String, JsonValue>,
    ) -> StepResult {
        let left = ctx.input("join")?;
        let right_limit = params
            .right_limit
            .unwrap_or(self.guardrails.max_rows_per_step);
        let right = self.registry.filter(
            params.right_source,
            &params.right_filters,
            &params.right_select,
            Some(right_limit),
        )?;

        let timer = profile_timer();
        let mut keys = Vec::with_capacity(params.on.len());
        let mut missing_left = Vec::new();
        let mut missing_right = Vec::new();
        for (l, r) in &params.on {
            let left_key = find_column(ctx.source, &left.columns, l);
            let right_key = find_column(Some(params.right_source), &right.columns, r);
            if left_key.is_none() {
                missing_left.push(l.clone());
            }
            if right_key.is_none() {
                missing_right.push(r.clone());
            }
            if let (Some(lk), Some(rk)) = (left_key, right_key) {
                keys.push((lk, rk));
            }
        }
        if params.on.is_empty() || !missing_left.is_empty() || !missing_right.is_empty() {
            return Err(StepError::JoinKeysMissing {
                left: missing_left,
                right: missing_right,
            });
        }

        let out = operators::join(left, &right, &keys, params.how);
        record_profile_timer(QueryProfileKind::Join, timer);
        resolved.insert("how".into(), json!(params.how));
        resolved.insert("on".into(), json!(keys));
        resolved.insert("left_rows".into(), json!(left.len()));
        resolved.insert("right_rows".into(), json!(right.len()));
        Ok(out)
    }
}

/// Scans one relation: canonicalizes headers, filters, projects, limits.
pub(crate) fn scan_relation(
    relation: &Relation,
    source: Source,
    filters: &[Predicate],
    select: &[String],
    limit: Option<usize>,
    resolved: &mut Map<String, JsonValue>,
) -> StepResult {
    let headers = Headers::new(source, relation.columns());
    if !headers.renames.is_empty() {
        resolved.insert("renamed".into(), json!(headers.renames));
    }

    let bound = filters
        .iter()
        .map(|predicate| {
            BoundPredicate::bind(predicate, |name| {
                find_column(Some(source), &headers.canonical, name).map(|hit| headers.raw(&hit))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if !bound.is_empty() {
        let described: Vec<JsonValue> = filters
            .iter()
            .zip(&bound)
            .map(|(predicate, b)| {
                json!({
                    "col": headers.canonical_of(&b.column),
                    "op": predicate.op,
                    "value": predicate.value,
                })
            })
            .collect();
        resolved.insert("where".into(), JsonValue::Array(described));
    }

    let mut projection = Vec::with_capacity(select.len());
    for wanted in select {
        let column = find_column(Some(source), &headers.canonical, wanted)
            .ok_or_else(|| StepError::column("select", &canonicalizer().alias(Some(source), wanted), wanted))?;
        projection.push(column);
    }
    if !projection.is_empty() {
        resolved.insert("select".into(), json!(projection));
    }

    let mask = conjunction(&bound, relation.rows());
    let cap = limit.unwrap_or(usize::MAX);
    let rows: Vec<Row> = relation
        .rows()
        .iter()
        .zip(mask)
        .filter_map(|(row, keep)| keep.then_some(row))
        .take(cap)
        .map(|row| headers.project(row, &projection))
        .collect();
    resolved.insert("rows_scanned".into(), json!(relation.len()));

    let columns = if projection.is_empty() {
        headers.canonical.clone()
    } else {
        projection
    };
    Ok(ExecResult::new(columns, rows))
}

/// Raw relation headers and their canonical spellings.
struct Headers {
    raw: Vec<String>,
    canonical: Vec<String>,
    renames: Vec<(String, String)>,
}

impl Headers {
    fn new(source: Source, raw: &[String]) -> Self {
        let renames = canonicalizer().quantity_renames(Some(source), raw);
        let canonical = raw
            .iter()
            .map(|column| {
                renames
                    .iter()
                    .find(|(from, _)| from == column)
                    .map_or_else(|| column.clone(), |(_, to)| to.clone())
            })
            .collect();
        Self {
            raw: raw.to_vec(),
            canonical,
            renames,
        }
    }

    fn raw(&self, canonical: &str) -> String {
        self.canonical
            .iter()
            .position(|c| c == canonical)
            .map_or_else(|| canonical.to_string(), |i| self.raw[i].clone())
    }

    fn canonical_of(&self, raw: &str) -> String {
        self.raw
            .iter()
            .position(|c| c == raw)
            .map_or_else(|| raw.to_string(), |i| self.canonical[i].clone())
    }

    fn project(&self, row: &Row, projection: &[String]) -> Row {
        if projection.is_empty() {
            if self.renames.is_empty() {
                return row.clone();
            }
            return self
                .raw
                .iter()
                .zip(&self.canonical)
                .filter_map(|(raw, canonical)| row.get(raw).map(|v| (canonical.clone(), v.clone())))
                .collect();
        }
        projection
            .iter()
            .map(|column| {
                let value = row.get(&self.raw(column)).cloned().unwrap_or_default();
                (column.clone(), value)
            })
            .collect()
    }
}

/// Canonicalizer lookup with a retry that joins words by underscores.
fn find_column(source: Option<Source>, columns: &[String], desired: &str) -> Option<String> {
    let canon = canonicalizer();
    canon.find(source, columns, desired).or_else(|| {
        let underscored = desired.trim().split_whitespace().collect::<Vec<_>>().join("_");
        (underscored != desired).then(|| canon.find(source, columns, &underscored))?
    })
}

fn resolve_all(
    context: &'static str,
    source: Option<Source>,
    columns: &[String],
    wanted: &[String],
) -> Result<Vec<String>, StepError> {
    wanted
        .iter()
        .map(|name| {
            find_column(source, columns, name).ok_or_else(|| {
                StepError::column(context, &canonicalizer().alias(source, name), name)
            })
        })
        .collect()
}

fn aggregate(
    params: &AggregateParams,
    ctx: &ExecContext,
    resolved: &mut Map<String, JsonValue>,
) -> StepResult {
    let input = ctx.input("aggregate")?;
    let by = resolve_all("aggregate group-by", ctx.source, &input.columns, &params.by)?;
    let mut metrics = Vec::with_capacity(params.metrics.len());
    for metric in &params.metrics {
        let func: AggFunc = metric.func.parse()?;
        let column = find_column(ctx.source, &input.columns, &metric.column).ok_or_else(|| {
            StepError::column(
                "aggregate metric",
                &canonicalizer().alias(ctx.source, &metric.column),
                &metric.column,
            )
        })?;
        metrics.push((column, func));
    }

    let timer = profile_timer();
    let out = operators::aggregate(input, &by, &metrics);
    record_profile_timer(QueryProfileKind::Aggregate, timer);
    resolved.insert("by".into(), json!(by));
    resolved.insert(
        "metrics".into(),
        json!(metrics
            .iter()
            .map(|(column, func)| (column.as_str(), func.as_str()))
            .collect::<Vec<_>>()),
    );
    resolved.insert("groups".into(), json!(out.len()));
    Ok(out)
}

/// Resolves a sort phrase against the current columns, trying the phrase as
/// written before its synonym.
fn resolve_sort_column(
    context: &'static str,
    source: Option<Source>,
    columns: &[String],
    phrase: &str,
) -> Result<String, StepError> {
    let synonym = sort_synonym(phrase);
    find_column(source, columns, phrase)
        .or_else(|| find_column(source, columns, &synonym))
        .ok_or_else(|| StepError::column(context, &synonym, phrase))
}

fn sort(params: &SortParams, ctx: &ExecContext, resolved: &mut Map<String, JsonValue>) -> StepResult {
    let Some(input) = ctx.last.as_ref() else {
        resolved.insert("by".into(), JsonValue::Null);
        resolved.insert("noop".into(), json!("no input"));
        return Ok(ExecResult::default());
    };

    let (phrase, embedded) = match params.sort_by.as_deref().map(str::trim) {
        Some(column) if !column.is_empty() => (column.to_string(), None),
        _ => params
            .by
            .as_deref()
            .map(split_order_suffix)
            .unwrap_or_default(),
    };
    if phrase.trim().is_empty() || input.is_empty() {
        resolved.insert("by".into(), JsonValue::Null);
        return Ok(input.clone());
    }
    let column = resolve_sort_column("sort", ctx.source, &input.columns, &phrase)?;

    let order_param = params.order.as_deref().and_then(order_direction);
    let (ascending, order_source) = match (embedded, order_param, params.ascending) {
        (Some(asc), _, _) => (asc, "embedded"),
        (None, Some(asc), _) => (asc, "order"),
        (None, None, Some(asc)) => (asc, "ascending"),
        (None, None, None) => (true, "default"),
    };

    let timer = profile_timer();
    let (mut rows, mode) = operators::sort_rows(input.rows.clone(), &column, ascending);
    if let Some(limit) = params.limit {
        rows.truncate(limit);
    }
    record_profile_timer(QueryProfileKind::Sort, timer);

    resolved.insert("by".into(), json!(column));
    resolved.insert("ascending".into(), json!(ascending));
    resolved.insert("order_source".into(), json!(order_source));
    resolved.insert("mode".into(), json!(mode.as_str()));
    Ok(ExecResult::new(input.columns.clone(), rows))
}

fn topk(params: &TopKParams, ctx: &ExecContext, resolved: &mut Map<String, JsonValue>) -> StepResult {
    let input = ctx.input("topk")?;
    let timer = profile_timer();
    let mut rows = match params.by.as_deref().map(split_order_suffix) {
        Some((phrase, embedded)) if !phrase.trim().is_empty() => {
            let column = resolve_sort_column("topk", ctx.source, &input.columns, &phrase)?;
            let ascending = embedded.or(params.ascending).unwrap_or(false);
            let (rows, mode) = operators::sort_rows(input.rows.clone(), &column, ascending);
            resolved.insert("by".into(), json!(column));
            resolved.insert("ascending".into(), json!(ascending));
            resolved.insert("mode".into(), json!(mode.as_str()));
            rows
        }
        _ => {
            resolved.insert("by".into(), JsonValue::Null);
            input.rows.clone()
        }
    };
    rows.truncate(params.k);
    record_profile_timer(QueryProfileKind::Sort, timer);
    resolved.insert("k".into(), json!(params.k));
    Ok(ExecResult::new(input.columns.clone(), rows))
}

fn distinct(
    params: &DistinctParams,
    ctx: &ExecContext,
    resolved: &mut Map<String, JsonValue>,
) -> StepResult {
    let input = ctx.input("distinct")?;
    let cols = resolve_all("distinct", ctx.source, &input.columns, &params.cols)?;
    let timer = profile_timer();
    let out = operators::distinct(input, &cols);
    record_profile_timer(QueryProfileKind::Reshape, timer);
    resolved.insert(
        "cols".into(),
        if cols.is_empty() { json!("ALL") } else { json!(cols) },
    );
    Ok(out)
}

fn derive(params: &DeriveParams, ctx: &ExecContext, resolved: &mut Map<String, JsonValue>) -> StepResult {
    let input = ctx.input("derive")?;
    let timer = profile_timer();
    let mut out = input.clone();
    let mut applied = Vec::new();
    for expression in &params.expressions {
        let alias = expression.alias.trim();
        if alias.is_empty() || expression.expr.trim().is_empty() {
            continue;
        }
        let (a, op, b) = operators::parse_expression(&expression.expr)?;
        let a = resolve_all("derive", ctx.source, &out.columns, std::slice::from_ref(&a))?;
        let b = resolve_all("derive", ctx.source, &out.columns, std::slice::from_ref(&b))?;
        out = operators::derive(out, alias, &a[0], op, &b[0]);
        applied.push(json!({ "as": alias, "lhs": a[0], "rhs": b[0] }));
    }
    record_profile_timer(QueryProfileKind::Reshape, timer);
    resolved.insert("expressions".into(), JsonValue::Array(applied));
    Ok(out)
}

fn millis(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 100_000.0).round() / 100.0
}
