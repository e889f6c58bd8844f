//! Record store statistics.
//!
//! Counters for monitoring pool activity. Tests also lean on them: the
//! batch-load statement bound is asserted through the query counter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Pool activity counters.
///
/// All counters are atomic, monotonically increasing, and readable while
/// operations are in progress.
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Total SELECT statements run.
    queries: AtomicU64,
    /// Total non-SELECT statements run.
    executes: AtomicU64,
    /// Total transactions started.
    transactions_started: AtomicU64,
    /// Total transactions committed.
    transactions_committed: AtomicU64,
    /// Total transactions rolled back.
    transactions_aborted: AtomicU64,
    /// Total entries created.
    entries_created: AtomicU64,
    /// Total entries deleted.
    entries_deleted: AtomicU64,
    /// Total blobs written to the file store.
    files_written: AtomicU64,
}

impl PoolStats {
    /// Creates a new stats instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_execute(&self) {
        self.executes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_abort(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_entry_created(&self) {
        self.entries_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_entry_deleted(&self) {
        self.entries_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_file_written(&self) {
        self.files_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the total SELECT statements run.
    #[must_use]
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Returns the total non-SELECT statements run.
    #[must_use]
    pub fn executes(&self) -> u64 {
        self.executes.load(Ordering::Relaxed)
    }

    /// Returns the total transactions started.
    #[must_use]
    pub fn transactions_started(&self) -> u64 {
        self.transactions_started.load(Ordering::Relaxed)
    }

    /// Returns the total transactions committed.
    #[must_use]
    pub fn transactions_committed(&self) -> u64 {
        self.transactions_committed.load(Ordering::Relaxed)
    }

    /// Returns the total transactions rolled back.
    #[must_use]
    pub fn transactions_aborted(&self) -> u64 {
        self.transactions_aborted.load(Ordering::Relaxed)
    }

    /// Returns the total entries created.
    #[must_use]
    pub fn entries_created(&self) -> u64 {
        self.entries_created.load(Ordering::Relaxed)
    }

    /// Returns the total entries deleted.
    #[must_use]
    pub fn entries_deleted(&self) -> u64 {
        self.entries_deleted.load(Ordering::Relaxed)
    }

    /// Returns the total blobs written to the file store.
    #[must_use]
    pub fn files_written(&self) -> u64 {
        self.files_written.load(Ordering::Relaxed)
    }

    /// Returns a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            queries: self.queries(),
            executes: self.executes(),
            transactions_started: self.transactions_started(),
            transactions_committed: self.transactions_committed(),
            transactions_aborted: self.transactions_aborted(),
            entries_created: self.entries_created(),
            entries_deleted: self.entries_deleted(),
            files_written: self.files_written(),
        }
    }
}

/// A point-in-time snapshot of pool statistics.
///
/// A simple struct that can be compared or passed across threads without
/// atomics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Total SELECT statements run.
    pub queries: u64,
    /// Total non-SELECT statements run.
    pub executes: u64,
    /// Total transactions started.
    pub transactions_started: u64,
    /// Total transactions committed.
    pub transactions_committed: u64,
    /// Total transactions rolled back.
    pub transactions_aborted: u64,
    /// Total entries created.
    pub entries_created: u64,
    /// Total entries deleted.
    pub entries_deleted: u64,
    /// Total blobs written to the file store.
    pub files_written: u64,
}
