//! Plan builder.
//!
//! Turns a classified [`RequestDescriptor`] plus the raw question into a
//! [`Plan`]. Structured hints from the descriptor come first; phrase hints
//! parsed from the question fill gaps and, for sort and top-k, override them.
//! The builder only consults schemas through [`SchemaProvider`] and never
//! emits a step referencing a column it could not find; when it cannot plan
//! safely it returns a FALLBACK plan.

use std::collections::HashSet;

use tracing::debug;

use super::canonical::{canonicalizer, AVAILABLE_QTY, ONHAND_QTY};
use super::hints::{self, order_direction, sort_synonym};
use super::metadata::SchemaProvider;
use super::plan::{
    AggregateParams, DeriveExpr, DeriveParams, DistinctParams, JoinKind, JoinParams, Operation,
    Plan, ScanParams, SortParams, Step, TopKParams,
};
use super::request::{FilterValue, Intent, MetricSpec, Predicate, RequestDescriptor};
use super::value::Value;
use crate::storage::Source;

/// Safety-stock-like columns, in preference order.
pub const SAFETY_STOCK_COLUMNS: &[&str] = &[
    "safety_stock",
    "safety_stock_level",
    "reorder_point",
    "min_qty",
    "min_level",
];

const LOOKUP_LIMIT: usize = 5_000;
const SCAN_LIMIT: usize = 50_000;

/// Builds plans against a schema provider.
pub struct PlanBuilder<'a> {
    schema: &'a dyn SchemaProvider,
}

impl<'a> PlanBuilder<'a> {
    /// Creates a builder.
    pub fn new(schema: &'a dyn SchemaProvider) -> Self {
        Self { schema }
    }

    /// Builds a plan for `request`, using `question` for phrase hints.
    pub fn build(&self, request: &RequestDescriptor, question: &str) -> Plan {
        let filters = dedup_filters(&request.filters);
        let base = if hints::mentions_inventory_vs_open_po(question) {
            Ok(self.mixed(&filters))
        } else {
            match request.intent {
                Intent::Transactional => self.transactional(request, &filters),
                Intent::Operational => self.operational(request, &filters, question),
                Intent::Comparative => self.comparative(request, &filters, question),
                Intent::Exception => self.exception(request, &filters, question),
                Intent::Mixed => Ok(self.mixed(&filters)),
                Intent::Fallback => Err("no reliable structured plan".to_string()),
            }
        };
        let mut plan = match base {
            Ok(plan) => plan,
            Err(rationale) => {
                debug!(intent = %request.intent, rationale = %rationale, "atlas.plan.fallback");
                return Plan::fallback(rationale);
            }
        };
        self.augment_sort(&mut plan, request, question);
        augment_topk(&mut plan, request, question);
        debug!(
            intent = %plan.intent,
            steps = plan.steps.len(),
            rationale = %plan.rationale,
            "atlas.plan.built"
        );
        plan
    }

    fn explicit_source(&self, request: &RequestDescriptor) -> Result<Option<Source>, String> {
        let Some(name) = request.source.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        match name.parse::<Source>() {
            Ok(source) if source.is_loadable() => Ok(Some(source)),
            _ => Err(format!("unknown source '{name}'")),
        }
    }

    fn required_source(&self, request: &RequestDescriptor) -> Result<Source, String> {
        self.explicit_source(request)?
            .ok_or_else(|| "no source in request".to_string())
    }

    fn transactional(
        &self,
        request: &RequestDescriptor,
        filters: &[Predicate],
    ) -> Result<Plan, String> {
        let source = self.required_source(request)?;
        Ok(Plan {
            intent: Intent::Transactional,
            rationale: format!("{source} lookup"),
            steps: vec![self.scan(source, filters, LOOKUP_LIMIT)],
        })
    }

    fn operational(
        &self,
        request: &RequestDescriptor,
        filters: &[Predicate],
        question: &str,
    ) -> Result<Plan, String> {
        let source = self.required_source(request)?;
        let mut steps = vec![self.scan(source, filters, SCAN_LIMIT)];
        let mut group_by = non_empty(&request.group_by);
        if group_by.is_empty() {
            group_by.extend(self.infer_group_by(source, question));
        }
        let mut metrics = request.metrics.clone();

        if matches!(source, Source::LpnSerials | Source::LpnSerialsAgg)
            && hints::wants_serial_count(question)
        {
            if group_by.is_empty() {
                group_by.push("item".to_string());
            }
            if metrics.is_empty() {
                metrics.push(MetricSpec::new("serial_number", "count"));
            }
        }

        if !group_by.is_empty() && metrics.is_empty() && hints::wants_distinct(question) {
            let rationale = format!("{source} distinct by {}", group_by.join(", "));
            steps.push(Step::inherit(Operation::Distinct(DistinctParams { cols: group_by })));
            return Ok(Plan {
                intent: Intent::Operational,
                rationale,
                steps,
            });
        }

        let mut rationale = format!("{source} detail");
        if !group_by.is_empty() {
            if metrics.is_empty() {
                metrics.push(MetricSpec::new(source.natural_key(), "count"));
            }
            rationale = format!("{source} aggregate by {}", group_by.join(", "));
            steps.push(Step::inherit(Operation::Aggregate(AggregateParams {
                by: group_by.clone(),
                metrics: metrics.clone(),
            })));
        }

        let mut sort_column = request.sort_by.clone().filter(|s| !s.trim().is_empty());
        if !group_by.is_empty()
            && sort_column
                .as_deref()
                .map_or(true, |c| c.trim().eq_ignore_ascii_case("count"))
        {
            sort_column = metrics.first().map(|m| m.column.clone());
        }
        if let Some(column) = sort_column {
            let ascending = request
                .sort_order
                .as_deref()
                .and_then(order_direction)
                .unwrap_or(false);
            rationale.push_str(&format!(" (sorted by {column} {})", order_word(ascending)));
            steps.push(sort_step(column, ascending));
        }

        Ok(Plan {
            intent: Intent::Operational,
            rationale,
            steps,
        })
    }

    fn comparative(
        &self,
        request: &RequestDescriptor,
        filters: &[Predicate],
        question: &str,
    ) -> Result<Plan, String> {
        let source = self.explicit_source(request)?.unwrap_or(Source::Onhand);
        let mut group_by = non_empty(&request.group_by);
        let mut metrics = request.metrics.clone();
        let need_aggregate = request.need_aggregate
            || !group_by.is_empty()
            || !metrics.is_empty()
            || hints::wants_aggregate(question);

        let mut steps = vec![self.scan(source, filters, SCAN_LIMIT)];
        let mut rationale = format!("{source} comparative");
        if need_aggregate {
            if group_by.is_empty() {
                group_by.push("organization_id".to_string());
            }
            if metrics.is_empty() {
                if source == Source::Onhand {
                    metrics.push(MetricSpec::new(ONHAND_QTY, "sum"));
                    metrics.push(MetricSpec::new(AVAILABLE_QTY, "sum"));
                } else {
                    metrics.push(MetricSpec::new(source.natural_key(), "count"));
                }
            }
            rationale.push_str(&format!(" by {}", group_by.join(", ")));
            steps.push(Step::inherit(Operation::Aggregate(AggregateParams {
                by: group_by,
                metrics,
            })));
        }
        if let Some(column) = request.sort_by.clone().filter(|s| !s.trim().is_empty()) {
            let ascending = request
                .sort_order
                .as_deref()
                .and_then(order_direction)
                .unwrap_or(true);
            rationale.push_str(&format!(" (sorted by {column} {})", order_word(ascending)));
            steps.push(sort_step(column, ascending));
        }
        Ok(Plan {
            intent: Intent::Comparative,
            rationale,
            steps,
        })
    }

    fn exception(
        &self,
        request: &RequestDescriptor,
        filters: &[Predicate],
        question: &str,
    ) -> Result<Plan, String> {
        let source = match self.explicit_source(request)? {
            Some(source) => source,
            None => hints::infer_exception_source(question)
                .parse::<Source>()
                .map_err(|err| err.to_string())?,
        };
        let schema = self.schema.columns(source).unwrap_or_default();
        let mut filters = self.normalize_filters(source, filters);
        let group_by = non_empty(&request.group_by);
        let mut need_aggregate = request.need_aggregate || !group_by.is_empty();
        let mut rationale = format!("{source} exception analysis");

        if hints::mentions_below_safety_stock(question) {
            let Some(safety) = SAFETY_STOCK_COLUMNS
                .iter()
                .find_map(|candidate| schema.iter().find(|c| c.eq_ignore_ascii_case(candidate)))
                .cloned()
            else {
                return Err(format!(
                    "{source} exception requires a safety stock column (tried: {}) not found in {source}",
                    SAFETY_STOCK_COLUMNS.join(", ")
                ));
            };
            filters.retain(|f| {
                let col = f.col.to_ascii_lowercase();
                col != AVAILABLE_QTY && col != ONHAND_QTY
            });
            filters.push(Predicate::columns(AVAILABLE_QTY, "lt", safety.as_str()));
            need_aggregate = need_aggregate && !group_by.is_empty();
            rationale = format!("{source} items below safety stock ({safety})");
        }

        let mut missing = Vec::new();
        for filter in &filters {
            let mut referenced = vec![filter.col.as_str()];
            if let FilterValue::Column { colref } = &filter.value {
                referenced.push(colref);
            }
            for column in referenced {
                if self.schema.resolve_column(source, column).is_none()
                    && !missing.iter().any(|m: &String| m == column)
                {
                    missing.push(column.to_string());
                }
            }
        }
        if !missing.is_empty() {
            return Err(format!(
                "{source} exception requires missing columns [{}] in {source}",
                missing.join(", ")
            ));
        }

        let mut steps = vec![Step::filter(
            source,
            ScanParams {
                filters,
                select: Vec::new(),
                limit: Some(SCAN_LIMIT),
            },
        )];
        if need_aggregate && !group_by.is_empty() {
            let mut metrics = request.metrics.clone();
            if metrics.is_empty() {
                metrics.push(MetricSpec::new(source.natural_key(), "count"));
            }
            steps.push(Step::inherit(Operation::Aggregate(AggregateParams {
                by: group_by,
                metrics,
            })));
        }
        if let Some(column) = request.sort_by.clone().filter(|s| !s.trim().is_empty()) {
            let ascending = request
                .sort_order
                .as_deref()
                .and_then(order_direction)
                .unwrap_or(true);
            steps.push(sort_step(column, ascending));
        }
        Ok(Plan {
            intent: Intent::Exception,
            rationale,
            steps,
        })
    }

    fn mixed(&self, filters: &[Predicate]) -> Plan {
        let onhand_filters = self.filters_for(Source::Onhand, filters);
        let po_filters = self.filters_for(Source::Po, filters);
        let keys = vec![
            ("organization_id".to_string(), "organization_id".to_string()),
            ("item".to_string(), "item".to_string()),
        ];
        Plan {
            intent: Intent::Mixed,
            rationale: "Inventory vs open PO by item".to_string(),
            steps: vec![
                Step::filter(
                    Source::Onhand,
                    ScanParams {
                        filters: onhand_filters,
                        select: Vec::new(),
                        limit: Some(SCAN_LIMIT),
                    },
                ),
                Step::inherit(Operation::Join(JoinParams {
                    how: JoinKind::Left,
                    right_source: Source::Po,
                    right_filters: po_filters,
                    right_select: Vec::new(),
                    right_limit: Some(SCAN_LIMIT),
                    on: keys,
                })),
                Step::inherit(Operation::Derive(DeriveParams {
                    expressions: vec![DeriveExpr::new("open_qty", "ordered_qty - received_qty")],
                })),
                sort_step(AVAILABLE_QTY.to_string(), false),
            ],
        }
    }

    /// Filters whose column exists in `source`, normalized for it. Unknown
    /// schemas keep every filter.
    fn filters_for(&self, source: Source, filters: &[Predicate]) -> Vec<Predicate> {
        let normalized = self.normalize_filters(source, filters);
        if self.schema.columns(source).is_none() {
            return normalized;
        }
        normalized
            .into_iter()
            .filter(|f| self.schema.resolve_column(source, &f.col).is_some())
            .collect()
    }

    fn scan(&self, source: Source, filters: &[Predicate], limit: usize) -> Step {
        Step::filter(
            source,
            ScanParams {
                filters: self.normalize_filters(source, filters),
                select: Vec::new(),
                limit: Some(limit),
            },
        )
    }

    /// Applies alias mapping and the per-source rewrites.
    fn normalize_filters(&self, source: Source, filters: &[Predicate]) -> Vec<Predicate> {
        let schema = self.schema.columns(source).unwrap_or_default();
        let mut out = Vec::with_capacity(filters.len());
        for filter in filters {
            let mut col = canonicalizer().alias(Some(source), &filter.col);
            let mut op = filter.op.trim().to_ascii_lowercase();
            let mut value = filter.value.clone();

            if source == Source::Po {
                if col.eq_ignore_ascii_case("status") || col.eq_ignore_ascii_case("po_status") {
                    col = "po_status".to_string();
                    if let FilterValue::Scalar(Value::String(text)) = &value {
                        value = FilterValue::Scalar(Value::String(text.to_uppercase()));
                    }
                    if matches!(op.as_str(), "eq" | "=" | "==" | "") {
                        op = "contains".to_string();
                    }
                }
                if let FilterValue::Scalar(Value::String(text)) = &value {
                    if text.to_lowercase().contains("pending receipt") {
                        out.push(Predicate::columns("received_qty", "lt", "ordered_qty"));
                        continue;
                    }
                }
            }

            if is_ordered(&op) {
                if let FilterValue::Scalar(Value::String(text)) = &value {
                    if let Some(column) = schema.iter().find(|c| c.eq_ignore_ascii_case(text.trim())) {
                        value = FilterValue::Column {
                            colref: column.clone(),
                        };
                    }
                }
            }
            out.push(Predicate { col, op, value });
        }
        out
    }

    /// Group-by inferred from a "by <column>" phrase, accepted only when it
    /// names a column of the source.
    fn infer_group_by(&self, source: Source, question: &str) -> Option<String> {
        let phrase = hints::parse_group_by(question)?;
        let underscored = phrase.replace(' ', "_");
        let first = phrase.split_whitespace().next().unwrap_or_default().to_string();
        [phrase, underscored, first]
            .iter()
            .find_map(|candidate| self.schema.resolve_column(source, candidate))
    }

    fn augment_sort(&self, plan: &mut Plan, request: &RequestDescriptor, question: &str) {
        let phrase = hints::parse_sort(question);
        let requested = request.sort_by.clone().filter(|s| !s.trim().is_empty());
        let Some(raw) = phrase.as_ref().map(|p| p.column.clone()).or(requested) else {
            return;
        };

        let existing = plan.steps.iter().find_map(|step| match &step.operation {
            Operation::Sort(params) => params.ascending,
            _ => None,
        });
        let ascending = phrase
            .as_ref()
            .and_then(|p| p.ascending)
            .or_else(|| request.sort_order.as_deref().and_then(order_direction))
            .or(existing)
            .unwrap_or(true);

        let column = if raw.trim().eq_ignore_ascii_case("count") {
            first_metric(plan).unwrap_or(raw)
        } else {
            let synonym = sort_synonym(&raw);
            match current_source(plan) {
                Some(source) => self.schema.resolve_column(source, &synonym).unwrap_or(synonym),
                None => synonym,
            }
        };

        plan.steps
            .retain(|step| !matches!(step.operation, Operation::Sort(_)));
        plan.steps.push(sort_step(column, ascending));
        plan.rationale.push_str(" (with sort)");
    }
}

fn augment_topk(plan: &mut Plan, request: &RequestDescriptor, question: &str) {
    let (k, ascending_hint) = match hints::parse_topk(question) {
        Some(hint) => (hint.k, hint.ascending),
        None => match request.k.filter(|k| *k > 0) {
            Some(k) => (k, None),
            None => return,
        },
    };
    plan.steps
        .retain(|step| !matches!(step.operation, Operation::TopK(_)));

    let sort = plan.steps.iter().find_map(|step| match &step.operation {
        Operation::Sort(params) => Some(params.clone()),
        _ => None,
    });
    let (by, ascending) = match sort {
        Some(params) => {
            let ascending = params
                .ascending
                .or_else(|| params.order.as_deref().and_then(order_direction))
                .or(ascending_hint);
            (params.sort_by.or(params.by), ascending)
        }
        None => match hints::parse_sort(question) {
            Some(phrase) => (Some(phrase.column), ascending_hint.or(phrase.ascending)),
            None => (
                request.sort_by.clone().filter(|s| !s.trim().is_empty()),
                ascending_hint,
            ),
        },
    };

    plan.steps.push(Step::inherit(Operation::TopK(TopKParams { k, by, ascending })));
    plan.rationale.push_str(&format!(" (top {k})"));
}

fn sort_step(column: String, ascending: bool) -> Step {
    Step::inherit(Operation::Sort(SortParams {
        sort_by: Some(column),
        by: None,
        order: Some(order_word(ascending).to_string()),
        ascending: Some(ascending),
        limit: None,
    }))
}

fn order_word(ascending: bool) -> &'static str {
    if ascending {
        "asc"
    } else {
        "desc"
    }
}

fn is_ordered(op: &str) -> bool {
    matches!(
        op,
        "gt" | ">" | "ge" | "gte" | ">=" | "lt" | "<" | "le" | "lte" | "<="
    )
}

fn non_empty(columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

fn dedup_filters(filters: &[Predicate]) -> Vec<Predicate> {
    let mut seen = HashSet::new();
    filters
        .iter()
        .filter(|f| seen.insert((f.col.clone(), f.op.clone(), f.value.to_string())))
        .cloned()
        .collect()
}

/// Source of the rows at the end of the plan; `None` after a join.
fn current_source(plan: &Plan) -> Option<Source> {
    plan.steps
        .iter()
        .fold(None, |current, step| match step.operation {
            Operation::Filter(_) | Operation::Vector(_) => step.source,
            Operation::Join(_) => None,
            _ => current,
        })
}

fn first_metric(plan: &Plan) -> Option<String> {
    plan.steps.iter().rev().find_map(|step| match &step.operation {
        Operation::Aggregate(params) => params.metrics.first().map(|m| m.column.clone()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::metadata::InMemorySchema;

    fn schema() -> InMemorySchema {
        InMemorySchema::new()
            .with_source(
                Source::Po,
                [
                    "po_number",
                    "po_status",
                    "buyer_user_id",
                    "organization_id",
                    "item",
                    "ordered_qty",
                    "received_qty",
                    "promised_date",
                    "last_receipt_date",
                ],
            )
            .with_source(
                Source::Onhand,
                ["organization_id", "item", "onhand_qty", "available_qty", "reserved_qty"],
            )
            .with_source(Source::So, ["so_number", "carrier_name", "delivery_status"])
    }

    fn request(intent: Intent, source: &str) -> RequestDescriptor {
        RequestDescriptor {
            intent,
            source: Some(source.to_string()),
            ..RequestDescriptor::default()
        }
    }

    fn ops(plan: &Plan) -> Vec<&str> {
        plan.steps.iter().map(Step::op_name).collect()
    }

    #[test]
    fn transactional_is_a_single_filter() {
        let schema = schema();
        let mut req = request(Intent::Transactional, "po");
        req.filters = vec![
            Predicate::new("po_number", "eq", "PO-0000173"),
            Predicate::new("po_number", "eq", "PO-0000173"),
        ];
        let plan = PlanBuilder::new(&schema).build(&req, "show PO-0000173");
        assert_eq!(ops(&plan), ["filter"]);
        let Operation::Filter(params) = &plan.steps[0].operation else {
            panic!("expected filter");
        };
        assert_eq!(params.filters.len(), 1);
        assert_eq!(params.limit, Some(LOOKUP_LIMIT));
    }

    #[test]
    fn po_status_and_pending_receipt_are_rewritten() {
        let schema = schema();
        let mut req = request(Intent::Transactional, "PO");
        req.filters = vec![
            Predicate::new("status", "eq", "open"),
            Predicate::new("note", "eq", "pending receipt"),
            Predicate::new("last_receipt_date", "gt", "promised_date"),
        ];
        let plan = PlanBuilder::new(&schema).build(&req, "open POs pending receipt");
        let Operation::Filter(params) = &plan.steps[0].operation else {
            panic!("expected filter");
        };
        assert_eq!(params.filters[0], Predicate::new("po_status", "contains", "OPEN"));
        assert_eq!(
            params.filters[1],
            Predicate::columns("received_qty", "lt", "ordered_qty")
        );
        assert_eq!(
            params.filters[2],
            Predicate::columns("last_receipt_date", "gt", "promised_date")
        );
    }

    #[test]
    fn operational_group_by_defaults_to_natural_key_count() {
        let schema = schema();
        let mut req = request(Intent::Operational, "PO");
        req.group_by = vec!["buyer_user_id".into()];
        let plan = PlanBuilder::new(&schema).build(&req, "open POs per buyer");
        assert_eq!(ops(&plan), ["filter", "aggregate", "sort"]);
        let Operation::Aggregate(params) = &plan.steps[1].operation else {
            panic!("expected aggregate");
        };
        assert_eq!(params.metrics, vec![MetricSpec::new("po_number", "count")]);
        let Operation::Sort(sort) = &plan.steps[2].operation else {
            panic!("expected sort");
        };
        assert_eq!(sort.sort_by.as_deref(), Some("po_number"));
        assert_eq!(sort.ascending, Some(false));
    }

    #[test]
    fn operational_infers_group_by_and_distinct() {
        let schema = schema();
        let req = request(Intent::Operational, "SO");
        let plan = PlanBuilder::new(&schema).build(&req, "list deliveries by carrier name");
        assert_eq!(ops(&plan), ["filter", "distinct"]);
        let Operation::Distinct(params) = &plan.steps[1].operation else {
            panic!("expected distinct");
        };
        assert_eq!(params.cols, ["carrier_name"]);

        let plan = PlanBuilder::new(&schema).build(&req, "deliveries by weather");
        assert_eq!(ops(&plan), ["filter"]);
    }

    #[test]
    fn comparative_defaults_to_quantity_sums_by_site() {
        let schema = schema();
        let req = request(Intent::Comparative, "ONHAND");
        let plan = PlanBuilder::new(&schema).build(&req, "total inventory by site");
        assert_eq!(ops(&plan), ["filter", "aggregate"]);
        let Operation::Aggregate(params) = &plan.steps[1].operation else {
            panic!("expected aggregate");
        };
        assert_eq!(params.by, ["organization_id"]);
        assert_eq!(params.metrics.len(), 2);
    }

    #[test]
    fn safety_stock_without_column_falls_back() {
        let schema = schema();
        let req = request(Intent::Exception, "ONHAND");
        let plan = PlanBuilder::new(&schema).build(&req, "items below safety stock, top 5");
        assert_eq!(plan.intent, Intent::Fallback);
        assert!(plan.steps.is_empty());
        assert!(plan.rationale.contains("safety_stock"));
    }

    #[test]
    fn safety_stock_prefers_first_listed_column() {
        let schema = InMemorySchema::new().with_source(
            Source::Onhand,
            ["item", "available_qty", "min_qty", "safety_stock_level"],
        );
        let mut req = RequestDescriptor {
            intent: Intent::Exception,
            ..RequestDescriptor::default()
        };
        req.filters = vec![Predicate::new("available_qty", "lt", 10)];
        let plan = PlanBuilder::new(&schema).build(&req, "items under safety stock");
        assert_eq!(plan.intent, Intent::Exception);
        let Operation::Filter(params) = &plan.steps[0].operation else {
            panic!("expected filter");
        };
        assert_eq!(plan.steps[0].source, Some(Source::Onhand));
        assert_eq!(
            params.filters,
            vec![Predicate::columns("available_qty", "lt", "safety_stock_level")]
        );
    }

    #[test]
    fn exception_with_unknown_column_falls_back() {
        let schema = schema();
        let mut req = request(Intent::Exception, "SO");
        req.filters = vec![Predicate::new("late_days", "gt", 3)];
        let plan = PlanBuilder::new(&schema).build(&req, "late shipments");
        assert_eq!(plan.intent, Intent::Fallback);
    }

    #[test]
    fn inventory_vs_open_po_builds_mixed_plan() {
        let schema = schema();
        let mut req = request(Intent::Operational, "ONHAND");
        req.filters = vec![Predicate::new("site", "eq", "101")];
        let plan = PlanBuilder::new(&schema).build(&req, "Inventory vs open PO by item at site 101");
        assert_eq!(plan.intent, Intent::Mixed);
        assert_eq!(ops(&plan), ["filter", "join", "derive", "sort"]);
        let Operation::Join(join) = &plan.steps[1].operation else {
            panic!("expected join");
        };
        assert_eq!(join.right_source, Source::Po);
        assert_eq!(join.right_limit, Some(SCAN_LIMIT));
        assert_eq!(join.right_filters[0].col, "organization_id");
    }

    #[test]
    fn phrase_sort_wins_and_topk_inherits_it() {
        let schema = schema();
        let mut req = request(Intent::Operational, "ONHAND");
        req.sort_by = Some("item".into());
        req.sort_order = Some("asc".into());
        let plan = PlanBuilder::new(&schema).build(
            &req,
            "onhand at site 101 sorted by available descending, top 5",
        );
        assert_eq!(ops(&plan), ["filter", "sort", "topk"]);
        let Operation::Sort(sort) = &plan.steps[1].operation else {
            panic!("expected sort");
        };
        assert_eq!(sort.sort_by.as_deref(), Some("available_qty"));
        assert_eq!(sort.ascending, Some(false));
        let Operation::TopK(topk) = &plan.steps[2].operation else {
            panic!("expected topk");
        };
        assert_eq!(topk.k, 5);
        assert_eq!(topk.by.as_deref(), Some("available_qty"));
        assert_eq!(topk.ascending, Some(false));
    }

    #[test]
    fn topk_without_sort_is_a_head() {
        let schema = schema();
        let req = RequestDescriptor {
            k: Some(10),
            ..request(Intent::Transactional, "PO")
        };
        let plan = PlanBuilder::new(&schema).build(&req, "show purchase orders");
        let Some(Operation::TopK(topk)) = plan.steps.last().map(|s| &s.operation) else {
            panic!("expected topk");
        };
        assert_eq!(topk.k, 10);
        assert_eq!(topk.by, None);
    }

    #[test]
    fn unknown_source_falls_back() {
        let schema = schema();
        let req = request(Intent::Transactional, "INVOICES");
        let plan = PlanBuilder::new(&schema).build(&req, "invoices");
        assert_eq!(plan.intent, Intent::Fallback);
        assert!(plan.rationale.contains("INVOICES"));
    }
}
