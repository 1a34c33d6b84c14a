#![allow(missing_docs)]

mod common;

use atlas::config::Guardrails;
use atlas::query::plan::{DistinctParams, JoinKind, JoinParams, ScanParams, SortParams, TopKParams};
use atlas::query::{ExecOutput, Intent, Operation, Plan, Predicate, Step, Value};
use atlas::storage::Source;
use common::Fixture;

fn plan(steps: Vec<Step>) -> Plan {
    Plan {
        intent: Intent::Operational,
        rationale: "test".to_string(),
        steps,
    }
}

fn scan(source: Source, filters: Vec<Predicate>) -> Step {
    Step::filter(
        source,
        ScanParams {
            filters,
            select: Vec::new(),
            limit: None,
        },
    )
}

fn strings(out: &ExecOutput, column: &str) -> Vec<String> {
    out.rows
        .iter()
        .map(|row| row.get(column).map(ToString::to_string).unwrap_or_default())
        .collect()
}

fn numbers(out: &ExecOutput, column: &str) -> Vec<f64> {
    out.rows
        .iter()
        .filter_map(|row| row.get(column).and_then(Value::as_f64))
        .collect()
}

#[test]
fn po_lookup_returns_single_row_with_one_lineage_entry() {
    let fixture = Fixture::new();
    let executor = fixture.executor(Guardrails::default());

    let out = executor.execute(&plan(vec![scan(
        Source::Po,
        vec![Predicate::new("po_number", "eq", "PO-0000173")],
    )]));

    assert_eq!(out.rows.len(), 1);
    assert_eq!(strings(&out, "po_number"), vec!["PO-0000173"]);
    assert_eq!(out.meta.lineage.len(), 1);
    let entry = &out.meta.lineage[0];
    assert_eq!(entry.op, "filter");
    assert_eq!(entry.source, Some(Source::Po));
    assert_eq!(entry.rows_after_step, 1);
    assert!(entry.error.is_none());
    assert_eq!(out.meta.plan_hash.len(), 16);
}

#[test]
fn descending_sort_keeps_ties_in_input_order() {
    let fixture = Fixture::new();
    let executor = fixture.executor(Guardrails::default());

    let out = executor.execute(&plan(vec![
        scan(
            Source::Onhand,
            vec![Predicate::new("organization_id", "eq", 101)],
        ),
        Step::inherit(Operation::Sort(SortParams {
            by: Some("available_qty".to_string()),
            order: Some("desc".to_string()),
            ..SortParams::default()
        })),
    ]));

    assert_eq!(numbers(&out, "available_qty"), vec![20.0, 5.0, 5.0, 1.0]);
    assert_eq!(
        strings(&out, "item"),
        vec!["ITEM-2", "ITEM-1", "ITEM-3", "ITEM-4"]
    );
    assert!(out.columns.contains(&"onhand_qty".to_string()));
}

#[test]
fn missing_join_key_halts_with_prior_rows() {
    let fixture = Fixture::new();
    let executor = fixture.executor(Guardrails::default());

    let out = executor.execute(&plan(vec![
        scan(Source::Onhand, Vec::new()),
        Step::inherit(Operation::Join(JoinParams {
            how: JoinKind::Left,
            right_source: Source::Po,
            right_filters: Vec::new(),
            right_select: Vec::new(),
            right_limit: None,
            on: vec![("item".to_string(), "sku_code".to_string())],
        })),
        Step::inherit(Operation::Sort(SortParams {
            sort_by: Some("item".to_string()),
            ..SortParams::default()
        })),
    ]));

    assert_eq!(out.meta.lineage.len(), 2);
    let failure = out.meta.failure().expect("join should fail");
    assert_eq!(failure.step, 2);
    assert_eq!(failure.error_code, Some("JoinKeysMissing"));
    assert_eq!(failure.rows_after_step, 5);
    assert_eq!(out.rows.len(), 5);
    assert!(!out.columns.contains(&"po_number".to_string()));
}

#[test]
fn steps_beyond_the_limit_are_clipped() {
    let fixture = Fixture::new();
    let executor = fixture.executor(Guardrails {
        max_steps: 2,
        max_rows_per_step: 50_000,
    });

    let out = executor.execute(&plan(vec![
        scan(Source::So, Vec::new()),
        Step::inherit(Operation::Sort(SortParams {
            sort_by: Some("so_number".to_string()),
            ..SortParams::default()
        })),
        Step::inherit(Operation::TopK(TopKParams {
            k: 1,
            ..TopKParams::default()
        })),
        Step::inherit(Operation::Distinct(DistinctParams::default())),
    ]));

    assert!(out.meta.clipped);
    assert_eq!(out.meta.lineage.len(), 2);
    assert_eq!(out.rows.len(), 3);
}

#[test]
fn rows_beyond_the_limit_are_truncated_per_step() {
    let fixture = Fixture::new();
    let executor = fixture.executor(Guardrails {
        max_steps: 16,
        max_rows_per_step: 3,
    });

    let out = executor.execute(&plan(vec![scan(Source::Onhand, Vec::new())]));

    assert_eq!(out.rows.len(), 3);
    let entry = &out.meta.lineage[0];
    assert!(entry.truncated);
    assert_eq!(entry.rows_after_step, 3);
    assert_eq!(
        entry.resolved.get("warning").and_then(|w| w.as_str()),
        Some("rows clipped to 3")
    );
}

#[test]
fn topk_without_column_is_a_head() {
    let fixture = Fixture::new();
    let executor = fixture.executor(Guardrails::default());

    let out = executor.execute(&plan(vec![
        scan(Source::So, Vec::new()),
        Step::inherit(Operation::TopK(TopKParams {
            k: 2,
            ..TopKParams::default()
        })),
    ]));

    assert_eq!(strings(&out, "so_number"), vec!["SO-1", "SO-2"]);
}

#[test]
fn equality_coerces_numbers_and_ignores_case() {
    let fixture = Fixture::new();
    let executor = fixture.executor(Guardrails::default());

    let by_text = executor.execute(&plan(vec![scan(
        Source::Onhand,
        vec![Predicate::new("organization_id", "eq", "101")],
    )]));
    assert_eq!(by_text.rows.len(), 4);

    let by_alias = executor.execute(&plan(vec![scan(
        Source::Onhand,
        vec![Predicate::new("site", "==", 101)],
    )]));
    assert_eq!(by_alias.rows.len(), 4);

    let status = executor.execute(&plan(vec![scan(
        Source::Po,
        vec![Predicate::new("po_status", "eq", "open")],
    )]));
    assert_eq!(
        strings(&status, "po_number"),
        vec!["PO-0000173", "PO-0000176"]
    );
}

#[test]
fn column_comparisons_and_membership() {
    let fixture = Fixture::new();
    let executor = fixture.executor(Guardrails::default());

    let late = executor.execute(&plan(vec![scan(
        Source::Po,
        vec![Predicate::columns("last_receipt_date", "gt", "promised_date")],
    )]));
    assert_eq!(
        strings(&late, "po_number"),
        vec!["PO-0000173", "PO-0000175"]
    );

    let listed = executor.execute(&plan(vec![scan(
        Source::Po,
        vec![Predicate::any_of(
            "po_number",
            vec!["PO-0000173".into(), "PO-0000175".into()],
        )],
    )]));
    assert_eq!(listed.rows.len(), 2);
}

#[test]
fn sources_load_once_and_only_when_scanned() {
    let fixture = Fixture::new();
    let registry = fixture.registry();
    let executor = atlas::query::PlanExecutor::new(registry.clone(), Guardrails::default());

    let lookup = plan(vec![scan(Source::Po, Vec::new())]);
    executor.execute(&lookup);
    executor.execute(&lookup);

    let po = registry.adapter(Source::Po).expect("po adapter");
    assert_eq!(po.load_count(), 1);
    let onhand = registry.adapter(Source::Onhand).expect("onhand adapter");
    assert!(!onhand.is_loaded());
}
