//! Per-cycle reports and cumulative collector counters.

use crate::assembler::BatchProfile;
use chrono::NaiveDate;
use collector_rust_core::models::Currency;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Outcome of one completed cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub currency: Currency,
    pub as_of_date: NaiveDate,
    pub discovered: usize,
    pub snapshots: usize,
    pub not_available: usize,
    pub failed: usize,
    pub skipped: usize,
    pub records_persisted: usize,
    /// Partition size after the append; `None` when nothing was written
    pub partition_total: Option<usize>,
    pub profile: BatchProfile,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn log(&self) {
        info!(
            "Cycle {} complete for {} {}: discovered={}, snapshots={}, not_available={}, failed={}, skipped={}, persisted={}, partition_total={}, calls={}, puts={}, expirations={}, strikes={}, two_sided={}, elapsed={:.1}s",
            self.cycle,
            self.currency,
            self.as_of_date,
            self.discovered,
            self.snapshots,
            self.not_available,
            self.failed,
            self.skipped,
            self.records_persisted,
            self.partition_total.map_or_else(|| "-".to_string(), |n| n.to_string()),
            self.profile.calls,
            self.profile.puts,
            self.profile.unique_expirations,
            self.profile.unique_strikes,
            self.profile.two_sided,
            self.elapsed.as_secs_f64()
        );
    }
}

/// Counters across every cycle run by one collector
#[derive(Debug, Clone)]
pub struct CollectorStats {
    pub cycles_completed: Arc<AtomicU64>,
    pub cycles_failed: Arc<AtomicU64>,
    pub snapshots_received: Arc<AtomicU64>,
    pub records_persisted: Arc<AtomicU64>,
    pub fetch_failures: Arc<AtomicU64>,
}

impl CollectorStats {
    pub fn new() -> Self {
        Self {
            cycles_completed: Arc::new(AtomicU64::new(0)),
            cycles_failed: Arc::new(AtomicU64::new(0)),
            snapshots_received: Arc::new(AtomicU64::new(0)),
            records_persisted: Arc::new(AtomicU64::new(0)),
            fetch_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn record_cycle(&self, report: &CycleReport) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.snapshots_received
            .fetch_add(report.snapshots as u64, Ordering::Relaxed);
        self.records_persisted
            .fetch_add(report.records_persisted as u64, Ordering::Relaxed);
        self.fetch_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CollectorStatsSnapshot {
        CollectorStatsSnapshot {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            snapshots_received: self.snapshots_received.load(Ordering::Relaxed),
            records_persisted: self.records_persisted.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for CollectorStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStatsSnapshot {
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub snapshots_received: u64,
    pub records_persisted: u64,
    pub fetch_failures: u64,
}

/// What a periodic run did before it returned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub records_persisted: u64,
    /// Stopped by shutdown rather than by reaching the cycle count
    pub cancelled: bool,
}
