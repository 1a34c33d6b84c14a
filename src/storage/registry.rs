use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Map;
use tracing::{debug, warn};

use super::relation::Relation;
use super::source::Source;
use super::table::TableAdapter;
use crate::config::AtlasConfig;
use crate::error::{AtlasError, Result};
use crate::query::errors::StepError;
use crate::query::executor::scan_relation;
use crate::query::metadata::{canonical_columns, SchemaProvider};
use crate::query::request::Predicate;
use crate::query::result::ExecResult;

/// One [`TableAdapter`] per configured source, shared across requests.
#[derive(Debug, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<Source, TableAdapter>,
}

impl AdapterRegistry {
    /// Builds the registry from configuration.
    ///
    /// Sources whose file is missing are skipped with a warning. Fails when
    /// nothing is configured or when no configured file exists.
    pub fn from_config(config: &AtlasConfig) -> Result<Self> {
        let paths = config.source_paths();
        if paths.is_empty() {
            return Err(AtlasError::NoSourcesConfigured);
        }
        let mut adapters = BTreeMap::new();
        let mut checked: Vec<PathBuf> = Vec::new();
        for (source, path) in paths {
            if path.is_file() {
                debug!(source = %source, path = %path.display(), "atlas.source.registered");
                adapters.insert(source, TableAdapter::new(source, path));
            } else {
                warn!(source = %source, path = %path.display(), "atlas.source.missing");
                checked.push(path);
            }
        }
        if adapters.is_empty() {
            return Err(AtlasError::NoSourcesResolved { checked });
        }
        Ok(Self { adapters })
    }

    /// Registry over already materialized relations.
    pub fn from_relations(relations: impl IntoIterator<Item = (Source, Relation)>) -> Self {
        let adapters = relations
            .into_iter()
            .map(|(source, relation)| (source, TableAdapter::preloaded(source, relation)))
            .collect();
        Self { adapters }
    }

    /// Adapter for a source, if configured.
    pub fn adapter(&self, source: Source) -> Option<&TableAdapter> {
        self.adapters.get(&source)
    }

    /// Configured sources in name order.
    pub fn sources(&self) -> impl Iterator<Item = Source> + '_ {
        self.adapters.keys().copied()
    }

    /// Loads (once) and returns the relation for `source`.
    pub fn relation(&self, source: Source) -> std::result::Result<Arc<Relation>, StepError> {
        let adapter = self
            .adapters
            .get(&source)
            .ok_or(StepError::SourceUnavailable { dataset: source })?;
        adapter.relation().map_err(|err| StepError::Load {
            dataset: source,
            message: err.to_string(),
        })
    }

    /// Scans `source` with predicates, projection and limit. Used for the
    /// right-hand side of joins.
    pub fn filter(
        &self,
        source: Source,
        filters: &[Predicate],
        select: &[String],
        limit: Option<usize>,
    ) -> std::result::Result<ExecResult, StepError> {
        let relation = self.relation(source)?;
        scan_relation(&relation, source, filters, select, limit, &mut Map::new())
    }
}

impl SchemaProvider for AdapterRegistry {
    fn columns(&self, source: Source) -> Option<Vec<String>> {
        match self.relation(source) {
            Ok(relation) => Some(canonical_columns(source, relation.columns())),
            Err(err) => {
                debug!(source = %source, error = %err, "atlas.schema.unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::value::Value;
    use std::fs;

    #[test]
    fn missing_files_are_skipped_but_one_must_exist() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("po.csv"), "po_number,po_status\nPO-1,OPEN\n")?;
        let config = AtlasConfig::default()
            .without_sources()
            .with_data_dir(dir.path())
            .with_source("PO", "po.csv")
            .with_source("SO", "so.csv");
        let registry = AdapterRegistry::from_config(&config)?;
        assert_eq!(registry.sources().collect::<Vec<_>>(), vec![Source::Po]);
        assert!(!registry.adapter(Source::Po).map_or(true, TableAdapter::is_loaded));
        assert_eq!(
            registry.relation(Source::So).unwrap_err().code(),
            "SourceUnavailable"
        );

        let config = AtlasConfig::default()
            .without_sources()
            .with_data_dir(dir.path())
            .with_source("SO", "so.csv");
        assert!(matches!(
            AdapterRegistry::from_config(&config),
            Err(AtlasError::NoSourcesResolved { checked }) if checked.len() == 1
        ));
        assert!(matches!(
            AdapterRegistry::from_config(&AtlasConfig::default().without_sources()),
            Err(AtlasError::NoSourcesConfigured)
        ));
        Ok(())
    }

    #[test]
    fn schema_reports_canonical_quantity_columns() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("onhand.csv"),
            "item,organization_id,On_Hand_Qty,Qty_Available\nA,1,5,3\n",
        )?;
        let config = AtlasConfig::default()
            .with_data_dir(dir.path())
            .with_source("ONHAND", "onhand.csv");
        let registry = AdapterRegistry::from_config(&config)?;
        assert_eq!(
            registry.columns(Source::Onhand).unwrap(),
            ["item", "organization_id", "onhand_qty", "available_qty"]
        );
        let scanned = registry
            .filter(Source::Onhand, &[Predicate::new("available", "ge", 3i64)], &[], None)
            .unwrap();
        assert_eq!(scanned.rows[0]["available_qty"], Value::Int(3));
        Ok(())
    }
}
