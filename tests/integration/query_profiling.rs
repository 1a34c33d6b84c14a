#![allow(missing_docs)]

mod common;

use atlas::config::Guardrails;
use atlas::query::plan::ScanParams;
use atlas::query::{profile_snapshot, Intent, Plan, Predicate, Step};
use atlas::storage::Source;
use common::Fixture;

// Profiling is latched on first use, so this binary holds a single test that
// enables it before any plan runs.
#[test]
fn profiling_counts_loads_and_scans() {
    std::env::set_var("ATLAS_PROFILE", "1");
    let fixture = Fixture::new();
    let executor = fixture.executor(Guardrails::default());
    let plan = Plan {
        intent: Intent::Transactional,
        rationale: "lookup".to_string(),
        steps: vec![Step::filter(
            Source::Po,
            ScanParams {
                filters: vec![Predicate::new("po_number", "eq", "PO-0000173")],
                ..ScanParams::default()
            },
        )],
    };

    let out = executor.execute(&plan);
    assert_eq!(out.rows.len(), 1);
    executor.execute(&plan);

    let snapshot = profile_snapshot(true).expect("profiling enabled");
    assert_eq!(snapshot.source_load_count, 1);
    assert_eq!(snapshot.filter_count, 2);
    assert_eq!(snapshot.join_count, 0);
    assert_eq!(snapshot.aggregate_count, 0);

    let cleared = profile_snapshot(false).expect("profiling enabled");
    assert_eq!(cleared.filter_count, 0);
    assert_eq!(cleared.filter_ns, 0);
}
