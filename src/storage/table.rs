use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::info;

use super::relation::Relation;
use super::source::Source;
use crate::error::Result;
use crate::query::profile::{profile_timer, record_profile_timer, QueryProfileKind};

/// Lazily loads one source's CSV file and memoizes the relation.
///
/// The slot lock is held for the whole load, so concurrent first readers
/// block on a single load instead of racing to read the file twice.
#[derive(Debug)]
pub struct TableAdapter {
    source: Source,
    path: PathBuf,
    slot: Mutex<Option<Arc<Relation>>>,
    loads: AtomicUsize,
}

impl TableAdapter {
    /// Creates an adapter reading `path` on first access.
    pub fn new(source: Source, path: PathBuf) -> Self {
        Self {
            source,
            path,
            slot: Mutex::new(None),
            loads: AtomicUsize::new(0),
        }
    }

    /// Creates an adapter around an already materialized relation.
    pub fn preloaded(source: Source, relation: Relation) -> Self {
        Self {
            source,
            path: PathBuf::new(),
            slot: Mutex::new(Some(Arc::new(relation))),
            loads: AtomicUsize::new(0),
        }
    }

    /// Logical source served by this adapter.
    pub fn source(&self) -> Source {
        self.source
    }

    /// Backing file path (empty for preloaded adapters).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the relation is already resident.
    pub fn is_loaded(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Number of times the backing file has been read.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Acquire)
    }

    /// Returns the relation, reading the file on first access.
    pub fn relation(&self) -> Result<Arc<Relation>> {
        let mut slot = self.slot.lock();
        if let Some(relation) = slot.as_ref() {
            return Ok(Arc::clone(relation));
        }
        let started = Instant::now();
        let timer = profile_timer();
        let relation = Arc::new(Relation::from_csv_path(&self.path)?);
        record_profile_timer(QueryProfileKind::SourceLoad, timer);
        self.loads.fetch_add(1, Ordering::AcqRel);
        info!(
            source = %self.source,
            path = %self.path.display(),
            rows = relation.len(),
            columns = relation.columns().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "atlas.source.loaded"
        );
        *slot = Some(Arc::clone(&relation));
        Ok(relation)
    }
}
