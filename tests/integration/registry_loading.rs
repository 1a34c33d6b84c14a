#![allow(missing_docs)]

mod common;

use std::fs;
use std::sync::Arc;
use std::thread;

use atlas::config::AtlasConfig;
use atlas::query::{SchemaProvider, Value};
use atlas::storage::{AdapterRegistry, Source};
use atlas::AtlasError;
use common::Fixture;
use tempfile::TempDir;

#[test]
fn concurrent_first_access_loads_once() {
    let fixture = Fixture::new();
    let registry = fixture.registry();

    let relations: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| registry.relation(Source::Po).expect("relation")))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .collect()
    });

    let adapter = registry.adapter(Source::Po).expect("adapter");
    assert_eq!(adapter.load_count(), 1);
    assert!(relations.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(relations[0].len(), 4);
}

#[test]
fn cells_are_typed_and_blanks_are_null() {
    let fixture = Fixture::new();
    let registry = fixture.registry();

    let po = registry.relation(Source::Po).expect("po");
    let last = &po.rows()[3];
    assert_eq!(last.get("organization_id"), Some(&Value::Int(101)));
    assert_eq!(last.get("po_number"), Some(&Value::from("PO-0000176")));
    assert_eq!(last.get("last_receipt_date"), Some(&Value::Null));
}

#[test]
fn schema_reports_canonical_inventory_columns() {
    let fixture = Fixture::new();
    let registry = fixture.registry();

    let columns = registry.columns(Source::Onhand).expect("columns");
    assert!(columns.contains(&"onhand_qty".to_string()));
    assert!(columns.contains(&"available_qty".to_string()));
    assert!(!columns.contains(&"On Hand Qty".to_string()));
    assert_eq!(
        registry.resolve_column(Source::Onhand, "available").as_deref(),
        Some("available_qty")
    );
    assert!(registry.columns(Source::Lpn).is_none());
}

#[test]
fn missing_files_are_skipped() {
    let fixture = Fixture::new();
    let config = fixture.config().with_source("LPN", "lpn.csv");

    let registry = AdapterRegistry::from_config(&config).expect("registry");
    let sources: Vec<Source> = registry.sources().collect();
    assert_eq!(sources, vec![Source::Po, Source::So, Source::Onhand]);
}

#[test]
fn empty_or_unresolvable_source_maps_fail() {
    let dir = TempDir::new().expect("tempdir");

    let empty = AtlasConfig::default()
        .without_sources()
        .with_data_dir(dir.path());
    assert!(matches!(
        AdapterRegistry::from_config(&empty),
        Err(AtlasError::NoSourcesConfigured)
    ));

    let missing = empty.with_source("PO", "nope.csv");
    match AdapterRegistry::from_config(&missing) {
        Err(AtlasError::NoSourcesResolved { checked }) => {
            assert_eq!(checked, vec![dir.path().join("nope.csv")]);
        }
        other => panic!("expected NoSourcesResolved, got {other:?}"),
    }
}

#[test]
fn legacy_json_map_accepts_singular_serial_name() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(
        dir.path().join("serials.csv"),
        "lpn_number,serial_number,item\nLPN-1,SN-1,ITEM-1\nLPN-1,SN-2,ITEM-1\n",
    )
    .expect("write serials");
    let map = dir.path().join("sources.json");
    fs::write(&map, r#"{"LPN_SERIAL": "serials.csv"}"#).expect("write map");

    let config = AtlasConfig::from_file(&map)
        .expect("config")
        .with_data_dir(dir.path());
    let registry = AdapterRegistry::from_config(&config).expect("registry");

    let relation = registry.relation(Source::LpnSerials).expect("serials");
    assert_eq!(relation.len(), 2);
}

#[test]
fn unknown_source_names_are_skipped() {
    let fixture = Fixture::new();
    let map = fixture.path().join("csv_path.json");
    fs::write(&map, r#"{"PO": "po.csv", "PO_LINES": "po_lines.csv"}"#).expect("write map");

    let config = AtlasConfig::from_file(&map)
        .expect("config")
        .with_data_dir(fixture.path());
    let registry = AdapterRegistry::from_config(&config).expect("registry");

    assert_eq!(registry.sources().collect::<Vec<_>>(), vec![Source::Po]);
    assert_eq!(registry.relation(Source::Po).expect("po").len(), 4);

    let only_unknown = AtlasConfig::default()
        .without_sources()
        .with_data_dir(fixture.path())
        .with_source("INVOICES", "invoices.csv");
    assert!(matches!(
        AdapterRegistry::from_config(&only_unknown),
        Err(AtlasError::NoSourcesConfigured)
    ));
}

#[test]
fn default_file_names_resolve_against_the_data_dir() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("v_po_status_enriched.csv"), common::PO_CSV).expect("write po");
    fs::write(
        dir.path().join("v_onhand_status_enriched.csv"),
        common::ONHAND_CSV,
    )
    .expect("write onhand");

    let config = AtlasConfig::default().with_data_dir(dir.path());
    let registry = AdapterRegistry::from_config(&config).expect("registry");

    let sources: Vec<Source> = registry.sources().collect();
    assert_eq!(sources.len(), 2);
    assert!(sources.contains(&Source::Po));
    assert!(sources.contains(&Source::Onhand));
    assert_eq!(registry.relation(Source::Onhand).expect("onhand").len(), 5);
}
