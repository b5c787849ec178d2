//! Storage metrics tracking
//!
//! Simple metric tracking for storage operations without external
//! dependencies.

use std::sync::atomic::{AtomicU64, Ordering};

/// Storage metrics tracker
///
/// Uses atomic counters so reads never contend with the façade's lock.
#[derive(Debug, Default)]
pub struct StorageMetrics {
    /// Number of statement lookups served through the statement cache
    pub statements_prepared: AtomicU64,

    /// Number of committed transactions
    pub transactions_committed: AtomicU64,

    /// Number of rolled-back transactions
    pub transactions_rolled_back: AtomicU64,

    /// Number of structural wipes (full reset or full destroy)
    pub structural_resets: AtomicU64,
}

impl StorageMetrics {
    /// Create a new metrics tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a statement served through the cache
    pub fn record_statement_prepared(&self) {
        self.statements_prepared.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a committed transaction
    pub fn record_transaction_committed(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rolled-back transaction
    pub fn record_transaction_rolled_back(&self) {
        self.transactions_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a structural wipe
    pub fn record_structural_reset(&self) {
        self.structural_resets.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            statements_prepared: self.statements_prepared.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_rolled_back: self.transactions_rolled_back.load(Ordering::Relaxed),
            structural_resets: self.structural_resets.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the storage counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub statements_prepared: u64,
    pub transactions_committed: u64,
    pub transactions_rolled_back: u64,
    pub structural_resets: u64,
}

#[cfg(test)]
mod tests {
    //! Unit tests for metrics.
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = StorageMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_record_and_snapshot() {
        let metrics = StorageMetrics::new();

        metrics.record_statement_prepared();
        metrics.record_statement_prepared();
        metrics.record_transaction_committed();
        metrics.record_transaction_rolled_back();
        metrics.record_structural_reset();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.statements_prepared, 2);
        assert_eq!(snapshot.transactions_committed, 1);
        assert_eq!(snapshot.transactions_rolled_back, 1);
        assert_eq!(snapshot.structural_resets, 1);
    }
}
