#![allow(missing_docs)]

mod common;

use atlas::query::{Intent, Operation, Predicate, RequestDescriptor, Value};
use atlas::service::QueryResponse;
use atlas::storage::Row;
use common::Fixture;

fn request(intent: Intent, source: &str) -> RequestDescriptor {
    RequestDescriptor {
        intent,
        source: Some(source.to_string()),
        ..RequestDescriptor::default()
    }
}

fn ops(response: &QueryResponse) -> Vec<&str> {
    response.plan.steps.iter().map(|s| s.op_name()).collect()
}

fn text(row: &Row, column: &str) -> String {
    row.get(column).map(ToString::to_string).unwrap_or_default()
}

fn number(row: &Row, column: &str) -> Option<f64> {
    row.get(column).and_then(Value::as_f64)
}

#[test]
fn purchase_orders_counted_per_buyer() {
    let fixture = Fixture::new();
    let service = fixture.service();
    let mut req = request(Intent::Operational, "PO");
    req.group_by = vec!["buyer_user_id".to_string()];

    let response = service.answer("purchase orders per buyer", &req);

    assert_eq!(ops(&response), vec!["filter", "aggregate", "sort"]);
    assert_eq!(response.columns, vec!["buyer_user_id", "po_number"]);
    let buyers: Vec<String> = response
        .rows
        .iter()
        .map(|row| text(row, "buyer_user_id"))
        .collect();
    assert_eq!(buyers, vec!["B1", "B2", "B3"]);
    assert_eq!(number(&response.rows[0], "po_number"), Some(2.0));
    assert!(response.meta.failure().is_none());
}

#[test]
fn purchase_order_by_buyer_is_a_grouping() {
    let fixture = Fixture::new();
    let service = fixture.service();
    let req = request(Intent::Operational, "PO");

    let response = service.answer("count purchase order by buyer", &req);

    assert_eq!(ops(&response), vec!["filter", "aggregate", "sort"]);
    assert_eq!(response.columns, vec!["buyer_user_id", "po_number"]);
    let counts: Vec<(String, Option<f64>)> = response
        .rows
        .iter()
        .map(|row| (text(row, "buyer_user_id"), number(row, "po_number")))
        .collect();
    assert_eq!(
        counts,
        vec![
            ("B1".to_string(), Some(2.0)),
            ("B2".to_string(), Some(1.0)),
            ("B3".to_string(), Some(1.0)),
        ]
    );
}

#[test]
fn safety_stock_without_a_column_falls_back() {
    let fixture = Fixture::new();
    let service = fixture.service();

    let response = service.answer(
        "shipments below safety stock",
        &request(Intent::Exception, "SO"),
    );

    assert_eq!(response.plan.intent, Intent::Fallback);
    assert!(response.plan.steps.is_empty());
    assert!(response.plan.rationale.contains("safety stock"));
    assert!(response.rows.is_empty());
    assert_eq!(
        response.meta.warning.as_deref(),
        Some("No steps to execute")
    );
}

#[test]
fn safety_stock_compares_available_against_reorder_point() {
    let fixture = Fixture::new();
    let service = fixture.service();

    let response = service.answer(
        "items below safety stock",
        &request(Intent::Exception, "ONHAND"),
    );

    assert_eq!(response.plan.intent, Intent::Exception);
    assert!(response.plan.rationale.contains("reorder_point"));
    let items: Vec<String> = response.rows.iter().map(|row| text(row, "item")).collect();
    assert_eq!(items, vec!["ITEM-1", "ITEM-4"]);
}

#[test]
fn inventory_versus_open_po_joins_and_derives() {
    let fixture = Fixture::new();
    let service = fixture.service();
    let mut req = request(Intent::Operational, "ONHAND");
    req.filters = vec![Predicate::new("organization_id", "eq", 101)];

    let response = service.answer("inventory vs open PO by item", &req);

    assert_eq!(response.plan.intent, Intent::Mixed);
    assert_eq!(ops(&response), vec!["filter", "join", "derive", "sort"]);
    let items: Vec<String> = response.rows.iter().map(|row| text(row, "item")).collect();
    assert_eq!(items, vec!["ITEM-2", "ITEM-1", "ITEM-3", "ITEM-4"]);
    assert_eq!(number(&response.rows[0], "open_qty"), Some(0.0));
    assert_eq!(number(&response.rows[1], "open_qty"), Some(6.0));
    assert_eq!(text(&response.rows[1], "po_number"), "PO-0000173");
    assert!(response.columns.contains(&"open_qty".to_string()));
}

#[test]
fn question_phrases_add_sort_and_topk() {
    let fixture = Fixture::new();
    let service = fixture.service();
    let mut req = request(Intent::Operational, "ONHAND");
    req.filters = vec![Predicate::new("site", "eq", "101")];

    let response = service.answer("onhand at site 101 top 2 by available descending", &req);

    assert_eq!(ops(&response), vec!["filter", "sort", "topk"]);
    assert!(response.plan.rationale.ends_with("(with sort) (top 2)"));
    match &response.plan.steps[2].operation {
        Operation::TopK(params) => {
            assert_eq!(params.k, 2);
            assert_eq!(params.by.as_deref(), Some("available_qty"));
            assert_eq!(params.ascending, Some(false));
        }
        other => panic!("expected topk, got {other:?}"),
    }
    let items: Vec<String> = response.rows.iter().map(|row| text(row, "item")).collect();
    assert_eq!(items, vec!["ITEM-2", "ITEM-1"]);
}

#[test]
fn unknown_source_yields_fallback() {
    let fixture = Fixture::new();
    let service = fixture.service();

    let plan = service.plan("anything", &request(Intent::Transactional, "WAREHOUSE"));

    assert_eq!(plan.intent, Intent::Fallback);
    assert!(plan.steps.is_empty());
    assert!(plan.rationale.contains("WAREHOUSE"));
}

#[test]
fn comparative_sums_quantities_per_site() {
    let fixture = Fixture::new();
    let service = fixture.service();
    let mut req = request(Intent::Comparative, "ONHAND");
    req.need_aggregate = true;

    let response = service.answer("compare sites", &req);

    assert_eq!(ops(&response), vec!["filter", "aggregate"]);
    assert_eq!(response.rows.len(), 2);
    let first = &response.rows[0];
    assert_eq!(text(first, "organization_id"), "101");
    assert_eq!(number(first, "onhand_qty"), Some(50.0));
    assert_eq!(number(first, "available_qty"), Some(31.0));
}
