use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Accumulated per-operation timings.
///
/// Profiling is enabled by setting the `ATLAS_PROFILE` environment variable
/// before the first plan runs; otherwise every counter stays untouched and
/// [`profile_snapshot`] returns `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryProfileSnapshot {
    /// Total nanoseconds spent reading CSV sources.
    pub source_load_ns: u64,
    /// Number of source loads.
    pub source_load_count: u64,
    /// Total nanoseconds spent in scan steps.
    pub filter_ns: u64,
    /// Number of scan steps.
    pub filter_count: u64,
    /// Total nanoseconds spent joining.
    pub join_ns: u64,
    /// Number of joins.
    pub join_count: u64,
    /// Total nanoseconds spent aggregating.
    pub aggregate_ns: u64,
    /// Number of aggregations.
    pub aggregate_count: u64,
    /// Total nanoseconds spent in sort and top-k steps.
    pub sort_ns: u64,
    /// Number of sort and top-k steps.
    pub sort_count: u64,
    /// Total nanoseconds spent in distinct and derive steps.
    pub reshape_ns: u64,
    /// Number of distinct and derive steps.
    pub reshape_count: u64,
}

#[derive(Default)]
struct QueryProfileCounters {
    source_load_ns: AtomicU64,
    source_load_count: AtomicU64,
    filter_ns: AtomicU64,
    filter_count: AtomicU64,
    join_ns: AtomicU64,
    join_count: AtomicU64,
    aggregate_ns: AtomicU64,
    aggregate_count: AtomicU64,
    sort_ns: AtomicU64,
    sort_count: AtomicU64,
    reshape_ns: AtomicU64,
    reshape_count: AtomicU64,
}

static PROFILE_ENABLED: OnceLock<bool> = OnceLock::new();
static PROFILE_COUNTERS: OnceLock<QueryProfileCounters> = OnceLock::new();

fn profiling_enabled() -> bool {
    *PROFILE_ENABLED.get_or_init(|| std::env::var_os("ATLAS_PROFILE").is_some())
}

fn counters() -> Option<&'static QueryProfileCounters> {
    profiling_enabled().then(|| PROFILE_COUNTERS.get_or_init(QueryProfileCounters::default))
}

pub(crate) fn profile_timer() -> Option<Instant> {
    profiling_enabled().then(Instant::now)
}

pub(crate) enum QueryProfileKind {
    SourceLoad,
    Filter,
    Join,
    Aggregate,
    Sort,
    Reshape,
}

pub(crate) fn record_profile_timer(kind: QueryProfileKind, start: Option<Instant>) {
    let Some(start) = start else {
        return;
    };
    let Some(counters) = counters() else {
        return;
    };
    let nanos = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
    let (ns, count) = match kind {
        QueryProfileKind::SourceLoad => (&counters.source_load_ns, &counters.source_load_count),
        QueryProfileKind::Filter => (&counters.filter_ns, &counters.filter_count),
        QueryProfileKind::Join => (&counters.join_ns, &counters.join_count),
        QueryProfileKind::Aggregate => (&counters.aggregate_ns, &counters.aggregate_count),
        QueryProfileKind::Sort => (&counters.sort_ns, &counters.sort_count),
        QueryProfileKind::Reshape => (&counters.reshape_ns, &counters.reshape_count),
    };
    ns.fetch_add(nanos, Ordering::Relaxed);
    count.fetch_add(1, Ordering::Relaxed);
}

/// Reads the profiling counters, optionally resetting them.
///
/// Returns `None` unless `ATLAS_PROFILE` was set.
pub fn profile_snapshot(reset: bool) -> Option<QueryProfileSnapshot> {
    let counters = counters()?;
    let load = |counter: &AtomicU64| {
        if reset {
            counter.swap(0, Ordering::Relaxed)
        } else {
            counter.load(Ordering::Relaxed)
        }
    };
    Some(QueryProfileSnapshot {
        source_load_ns: load(&counters.source_load_ns),
        source_load_count: load(&counters.source_load_count),
        filter_ns: load(&counters.filter_ns),
        filter_count: load(&counters.filter_count),
        join_ns: load(&counters.join_ns),
        join_count: load(&counters.join_count),
        aggregate_ns: load(&counters.aggregate_ns),
        aggregate_count: load(&counters.aggregate_count),
        sort_ns: load(&counters.sort_ns),
        sort_count: load(&counters.sort_count),
        reshape_ns: load(&counters.reshape_ns),
        reshape_count: load(&counters.reshape_count),
    })
}
