//! Store statistics.
//!
//! Counters for monitoring how queries are resolved and how much each
//! batch writes. The query counters are what make clause reordering
//! observable: an id-pinned query bumps `id_lookups`, never `full_scans`.
//!
//! # Usage
//!
//! ```rust,ignore
//! let session = orm.session(None)?;
//! session.model("Book")?.filter(record! { "id" => "10" }).count()?;
//!
//! let stats = session.stats().snapshot();
//! assert_eq!(stats.full_scans, 0);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Store statistics.
///
/// All counters are atomic and monotonically increasing. A single `Store`
/// (and therefore every session opened on it) shares one instance.
#[derive(Debug, Default)]
pub struct StoreStats {
    /// Total number of table queries evaluated.
    queries: AtomicU64,
    /// Queries resolved by direct id lookup.
    id_lookups: AtomicU64,
    /// Queries that started from every row of the table.
    full_scans: AtomicU64,
    /// Rows inserted.
    rows_inserted: AtomicU64,
    /// Rows replaced by an update.
    rows_updated: AtomicU64,
    /// Rows deleted.
    rows_deleted: AtomicU64,
    /// Batches committed to a session.
    batches: AtomicU64,
}

impl StoreStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_query(&self, id_lookup: bool) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        if id_lookup {
            self.id_lookups.fetch_add(1, Ordering::Relaxed);
        } else {
            self.full_scans.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_inserted(&self, count: u64) {
        self.rows_inserted.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_updated(&self, count: u64) {
        self.rows_updated.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_deleted(&self, count: u64) {
        self.rows_deleted.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the total number of queries.
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Returns the number of queries answered by id lookup.
    pub fn id_lookups(&self) -> u64 {
        self.id_lookups.load(Ordering::Relaxed)
    }

    /// Returns the number of full-table scans.
    pub fn full_scans(&self) -> u64 {
        self.full_scans.load(Ordering::Relaxed)
    }

    /// Returns the number of inserted rows.
    pub fn rows_inserted(&self) -> u64 {
        self.rows_inserted.load(Ordering::Relaxed)
    }

    /// Returns the number of updated rows.
    pub fn rows_updated(&self) -> u64 {
        self.rows_updated.load(Ordering::Relaxed)
    }

    /// Returns the number of deleted rows.
    pub fn rows_deleted(&self) -> u64 {
        self.rows_deleted.load(Ordering::Relaxed)
    }

    /// Returns the number of committed batches.
    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Takes a point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            queries: self.queries(),
            id_lookups: self.id_lookups(),
            full_scans: self.full_scans(),
            rows_inserted: self.rows_inserted(),
            rows_updated: self.rows_updated(),
            rows_deleted: self.rows_deleted(),
            batches: self.batches(),
        }
    }
}

/// A point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Total queries.
    pub queries: u64,
    /// Queries answered by id lookup.
    pub id_lookups: u64,
    /// Full-table scans.
    pub full_scans: u64,
    /// Inserted rows.
    pub rows_inserted: u64,
    /// Updated rows.
    pub rows_updated: u64,
    /// Deleted rows.
    pub rows_deleted: u64,
    /// Committed batches.
    pub batches: u64,
}

impl StatsSnapshot {
    /// Counter-wise difference `self - earlier`.
    #[must_use]
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            queries: self.queries - earlier.queries,
            id_lookups: self.id_lookups - earlier.id_lookups,
            full_scans: self.full_scans - earlier.full_scans,
            rows_inserted: self.rows_inserted - earlier.rows_inserted,
            rows_updated: self.rows_updated - earlier.rows_updated,
            rows_deleted: self.rows_deleted - earlier.rows_deleted,
            batches: self.batches - earlier.batches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_counters_split_lookup_and_scan() {
        let stats = StoreStats::new();
        stats.record_query(true);
        stats.record_query(false);
        stats.record_query(false);

        assert_eq!(stats.queries(), 3);
        assert_eq!(stats.id_lookups(), 1);
        assert_eq!(stats.full_scans(), 2);
    }

    #[test]
    fn snapshot_difference() {
        let stats = StoreStats::new();
        stats.record_inserted(2);
        let before = stats.snapshot();

        stats.record_inserted(3);
        stats.record_deleted(1);
        stats.record_batch();

        let delta = stats.snapshot().since(&before);
        assert_eq!(delta.rows_inserted, 3);
        assert_eq!(delta.rows_deleted, 1);
        assert_eq!(delta.batches, 1);
        assert_eq!(delta.queries, 0);
    }
}
