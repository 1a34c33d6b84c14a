//! Schema lookup used by the plan builder.
//!
//! The builder never loads rows itself; it only asks which columns a source
//! exposes so it can validate references before emitting steps.

use std::collections::HashMap;

use super::canonical::canonicalizer;
use crate::storage::Source;

/// Provides canonical column sets per source.
pub trait SchemaProvider {
    /// Columns of `source` after quantity canonicalization, or `None` when
    /// the source is not available.
    fn columns(&self, source: Source) -> Option<Vec<String>>;

    /// Resolves `desired` against the schema of `source`.
    fn resolve_column(&self, source: Source, desired: &str) -> Option<String> {
        let columns = self.columns(source)?;
        canonicalizer().find(Some(source), &columns, desired)
    }
}

/// Schema provider backed by explicit column lists.
#[derive(Debug, Clone, Default)]
pub struct InMemorySchema {
    sources: HashMap<Source, Vec<String>>,
}

impl InMemorySchema {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the raw header set of a source.
    pub fn with_source<I, S>(mut self, source: Source, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources
            .insert(source, columns.into_iter().map(Into::into).collect());
        self
    }
}

impl SchemaProvider for InMemorySchema {
    fn columns(&self, source: Source) -> Option<Vec<String>> {
        let raw = self.sources.get(&source)?;
        Some(canonical_columns(source, raw))
    }
}

/// Applies the inventory quantity renames to a header list.
pub fn canonical_columns(source: Source, raw: &[String]) -> Vec<String> {
    let renames = canonicalizer().quantity_renames(Some(source), raw);
    raw.iter()
        .map(|column| {
            renames
                .iter()
                .find(|(from, _)| from == column)
                .map_or_else(|| column.clone(), |(_, to)| to.clone())
        })
        .collect()
}
