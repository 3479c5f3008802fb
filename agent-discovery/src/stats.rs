//! Pipeline counters
//!
//! Every degraded outcome the pipeline absorbs (failed chunk, absent token,
//! missing metadata, failed reputation read) is counted here, so failure
//! rates stay observable even though none of them surface as errors.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters, updated by scanner, resolver, enricher and directory
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub(crate) chunks_scanned: AtomicU64,
    pub(crate) chunk_failures: AtomicU64,
    pub(crate) mints_found: AtomicU64,
    pub(crate) agents_resolved: AtomicU64,
    pub(crate) agents_absent: AtomicU64,
    pub(crate) agent_failures: AtomicU64,
    pub(crate) metadata_misses: AtomicU64,
    pub(crate) reputation_reads: AtomicU64,
    pub(crate) reputation_failures: AtomicU64,
    pub(crate) cache_hits: AtomicU64,
    pub(crate) cache_misses: AtomicU64,
}

/// Public statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub chunks_scanned: u64,
    pub chunk_failures: u64,
    pub mints_found: u64,
    pub agents_resolved: u64,
    pub agents_absent: u64,
    pub agent_failures: u64,
    pub metadata_misses: u64,
    pub reputation_reads: u64,
    pub reputation_failures: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            chunks_scanned: self.chunks_scanned.load(Ordering::Relaxed),
            chunk_failures: self.chunk_failures.load(Ordering::Relaxed),
            mints_found: self.mints_found.load(Ordering::Relaxed),
            agents_resolved: self.agents_resolved.load(Ordering::Relaxed),
            agents_absent: self.agents_absent.load(Ordering::Relaxed),
            agent_failures: self.agent_failures.load(Ordering::Relaxed),
            metadata_misses: self.metadata_misses.load(Ordering::Relaxed),
            reputation_reads: self.reputation_reads.load(Ordering::Relaxed),
            reputation_failures: self.reputation_failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Fraction of scanned chunks that came back empty because of an error
    pub fn chunk_failure_rate(&self) -> f64 {
        if self.chunks_scanned == 0 {
            return 0.0;
        }
        self.chunk_failures as f64 / self.chunks_scanned as f64
    }

    /// Fraction of lookups served from cache
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_rates() {
        let stats = PipelineStats::new();
        PipelineStats::add(&stats.chunks_scanned, 4);
        PipelineStats::incr(&stats.chunk_failures);
        PipelineStats::incr(&stats.cache_hits);
        PipelineStats::add(&stats.cache_misses, 3);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.chunks_scanned, 4);
        assert_eq!(snapshot.chunk_failure_rate(), 0.25);
        assert_eq!(snapshot.cache_hit_rate(), 0.25);
        assert_eq!(StatsSnapshot::default().cache_hit_rate(), 0.0);
    }
}
