#![allow(missing_docs)]
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use atlas::config::{AtlasConfig, Guardrails};
use atlas::query::PlanExecutor;
use atlas::service::AtlasService;
use atlas::storage::AdapterRegistry;
use tempfile::TempDir;

pub const PO_CSV: &str = "\
po_number,po_status,buyer_user_id,organization_id,item,ordered_qty,received_qty,promised_date,last_receipt_date
PO-0000173,OPEN,B1,101,ITEM-1,10,4,2024-01-10,2024-01-12
PO-0000174,OPEN_PARTIAL,B2,101,ITEM-2,6,6,2024-02-01,2024-01-20
PO-0000175,CLOSED,B1,102,ITEM-3,5,5,2024-03-01,2024-03-05
PO-0000176,OPEN,B3,101,ITEM-4,8,0,2024-04-01,
";

pub const ONHAND_CSV: &str = "\
organization_id,item,On Hand Qty,Available Quantity,reserved_qty,reorder_point
101,ITEM-1,10,5,5,6
101,ITEM-2,30,20,10,10
101,ITEM-3,8,5,3,4
101,ITEM-4,2,1,1,3
102,ITEM-1,7,7,0,2
";

pub const SO_CSV: &str = "\
so_number,delivery_status,carrier_name,organization_id,item
SO-1,SHIPPED,UPS,101,ITEM-1
SO-2,PENDING,FedEx,101,ITEM-2
SO-3,SHIPPED,UPS,102,ITEM-1
";

/// Temp directory holding the PO, ONHAND and SO fixtures plus an
/// `atlas.toml` pointing at them.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("po.csv"), PO_CSV).expect("write po");
        fs::write(dir.path().join("onhand.csv"), ONHAND_CSV).expect("write onhand");
        fs::write(dir.path().join("so.csv"), SO_CSV).expect("write so");
        fs::write(
            dir.path().join("atlas.toml"),
            "data_dir = \".\"\n\n[sources]\nPO = \"po.csv\"\nONHAND = \"onhand.csv\"\nSO = \"so.csv\"\n",
        )
        .expect("write config");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("atlas.toml")
    }

    pub fn config(&self) -> AtlasConfig {
        AtlasConfig::from_file(&self.config_path()).expect("config")
    }

    pub fn registry(&self) -> Arc<AdapterRegistry> {
        Arc::new(AdapterRegistry::from_config(&self.config()).expect("registry"))
    }

    pub fn executor(&self, guardrails: Guardrails) -> PlanExecutor {
        PlanExecutor::new(self.registry(), guardrails)
    }

    pub fn service(&self) -> AtlasService {
        AtlasService::from_config(&self.config()).expect("service")
    }
}
