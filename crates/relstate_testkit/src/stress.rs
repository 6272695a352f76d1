//! Concurrent session stress helpers.
//!
//! Sessions over one store share nothing but the store and whatever
//! snapshot they were opened on. These helpers run many sessions on threads
//! at once and check that none of them observes another's writes.

use relstate_core::{props, Orm, Snapshot};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of threads.
    pub threads: usize,
    /// Writes per thread.
    pub writes_per_thread: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            writes_per_thread: 100,
        }
    }
}

/// Opens one session per thread on `base`, each creating rows in `model`.
///
/// A write counts as failed if the session sees a row count other than its
/// own writes on top of `base`, which would mean another thread's writes
/// leaked into it. `base` must be unchanged afterwards.
pub fn isolated_writers(orm: &Orm, base: &Snapshot, model: &str, config: &StressConfig) -> StressTestResult {
    let initial = base.table(model).map_or(0, |t| t.len());
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let start = Instant::now();

    thread::scope(|scope| {
        for _ in 0..config.threads {
            scope.spawn(|| {
                let session = orm.session(Some(base.clone())).expect("Failed to open session");
                let handle = session.model(model).expect("Failed to get model");
                for i in 0..config.writes_per_thread {
                    let ok = handle.create(props! { "value" => i as i64 }).is_ok()
                        && handle.count().ok() == Some(initial + i + 1);
                    let counter = if ok { &successful } else { &failed };
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });

    assert_eq!(base.table(model).map_or(0, |t| t.len()), initial, "base snapshot changed");
    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::items_orm;

    #[test]
    fn writers_do_not_see_each_other() {
        let orm = items_orm();
        let base = orm.empty_snapshot().unwrap();
        let config = StressConfig {
            threads: 4,
            writes_per_thread: 25,
        };
        let result = isolated_writers(&orm, &base, "Item", &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 100);
    }
}
