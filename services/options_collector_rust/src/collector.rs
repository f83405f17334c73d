//! Collection scheduler
//!
//! One cycle is discover -> fetch -> assemble -> append. The periodic loop
//! runs cycles back to back on a fixed interval and never overlaps them.

use crate::assembler::{assemble_batch, BatchProfile};
use crate::config::{CollectorConfig, CycleCount};
use crate::fetcher::RateLimitedFetcher;
use crate::shutdown::ShutdownSignal;
use crate::stats::{CollectorStats, CycleReport, RunSummary};
use chrono::{Local, NaiveDate};
use collector_rust_core::clients::{SnapshotSource, OPTION_KIND};
use collector_rust_core::error::{CycleError, StoreError};
use collector_rust_core::models::{Instrument, Record};
use collector_rust_core::retry::execute_with_retry;
use collector_rust_core::storage::{PartitionHandle, PartitionStore};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Running,
}

pub struct OptionsCollector {
    config: CollectorConfig,
    source: Arc<dyn SnapshotSource>,
    fetcher: RateLimitedFetcher,
    store: PartitionStore,
    stats: CollectorStats,
    running: AtomicBool,
    cycle_seq: AtomicU64,
}

/// Flips the collector back to Idle however the cycle ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl OptionsCollector {
    /// Rejects an invalid config before touching storage.
    pub fn new(config: CollectorConfig, source: Arc<dyn SnapshotSource>) -> anyhow::Result<Self> {
        config.validate()?;
        let store = PartitionStore::new(&config.storage_root)?;
        let fetcher = RateLimitedFetcher::new(source.clone(), config.rate_limit());

        info!(
            "OptionsCollector initialized for {} via {} (storage: {}, max_concurrent: {}, delay: {}ms)",
            config.currency,
            source.source_name(),
            store.root().display(),
            config.max_concurrent,
            config.inter_request_delay.as_millis()
        );

        Ok(Self {
            config,
            source,
            fetcher,
            store,
            stats: CollectorStats::new(),
            running: AtomicBool::new(false),
            cycle_seq: AtomicU64::new(0),
        })
    }

    /// Store the collector writes to; readers use it for `load`
    pub fn store(&self) -> &PartitionStore {
        &self.store
    }

    pub fn stats(&self) -> &CollectorStats {
        &self.stats
    }

    pub fn state(&self) -> CollectorState {
        if self.running.load(Ordering::SeqCst) {
            CollectorState::Running
        } else {
            CollectorState::Idle
        }
    }

    /// Run one full cycle.
    ///
    /// Only discovery and storage failures fail the cycle; per-instrument
    /// fetch problems just shrink the batch.
    pub async fn run_cycle(&self, shutdown: &ShutdownSignal) -> Result<CycleReport, CycleError> {
        self.running.store(true, Ordering::SeqCst);
        let _guard = RunningGuard(&self.running);

        let cycle = self.cycle_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let as_of = Local::now().date_naive();

        match self.execute_cycle(cycle, as_of, shutdown).await {
            Ok(report) => {
                self.stats.record_cycle(&report);
                report.log();
                Ok(report)
            }
            Err(e) => {
                self.stats.record_failure();
                error!("Cycle {} failed: {}", cycle, e);
                Err(e)
            }
        }
    }

    async fn execute_cycle(
        &self,
        cycle: u64,
        as_of: NaiveDate,
        shutdown: &ShutdownSignal,
    ) -> Result<CycleReport, CycleError> {
        let started = Instant::now();
        info!("Starting cycle {} for {} ({})", cycle, self.config.currency, as_of);

        let instruments = self.discover().await?;
        let discovered = instruments.len();
        info!("Found {} {} options", discovered, self.config.currency);

        let fetched = self.fetcher.fetch_all(instruments, shutdown).await;
        let (records, tally) = assemble_batch(fetched);
        let profile = BatchProfile::from_records(&records);

        let handle = self.persist(records, as_of).await?;

        Ok(CycleReport {
            cycle,
            currency: self.config.currency,
            as_of_date: as_of,
            discovered,
            snapshots: tally.snapshots,
            not_available: tally.not_available,
            failed: tally.failed,
            skipped: tally.skipped,
            records_persisted: handle.as_ref().map_or(0, |h| h.records_appended),
            partition_total: handle.as_ref().map(|h| h.total_records),
            profile,
            elapsed: started.elapsed(),
        })
    }

    async fn discover(&self) -> Result<Vec<Instrument>, CycleError> {
        let currency = self.config.currency;
        execute_with_retry(
            || self.source.list_instruments(currency, OPTION_KIND, false),
            self.config.discovery_attempts,
            self.config.discovery_backoff,
        )
        .await
        .map_err(CycleError::Discovery)
    }

    /// `Ok(None)` when there was nothing to write.
    async fn persist(
        &self,
        records: Vec<Record>,
        as_of: NaiveDate,
    ) -> Result<Option<PartitionHandle>, CycleError> {
        let store = self.store.clone();
        let currency = self.config.currency;

        let outcome = tokio::task::spawn_blocking(move || store.append(currency, &records, as_of))
            .await
            .map_err(|e| CycleError::Storage(StoreError::Io(io::Error::new(io::ErrorKind::Other, e))))?;

        match outcome {
            Ok(handle) => Ok(Some(handle)),
            Err(StoreError::NoData) => {
                warn!("No data to save for {} on {}", currency, as_of);
                Ok(None)
            }
            Err(e) => Err(CycleError::Storage(e)),
        }
    }

    /// Run cycles every `cycle_interval` until the configured count is reached
    /// or shutdown is triggered. The first cycle starts immediately.
    pub async fn run(&self, shutdown: ShutdownSignal) -> RunSummary {
        let mut ticker = interval(self.config.cycle_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut summary = RunSummary::default();

        info!(
            "Starting periodic collection: {} cycles, every {}s",
            self.config.cycle_count,
            self.config.cycle_interval.as_secs()
        );

        loop {
            if let CycleCount::Bounded(limit) = self.config.cycle_count {
                if summary.cycles_started >= u64::from(limit) {
                    break;
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    info!("Shutdown requested, not starting another cycle");
                    summary.cancelled = true;
                    break;
                }
                _ = ticker.tick() => {}
            }

            summary.cycles_started += 1;
            match self.run_cycle(&shutdown).await {
                Ok(report) => {
                    summary.cycles_completed += 1;
                    summary.records_persisted += report.records_persisted as u64;
                }
                Err(_) => summary.cycles_failed += 1,
            }

            if shutdown.is_triggered() {
                info!("Shutdown requested during cycle {}", summary.cycles_started);
                summary.cancelled = true;
                break;
            }

            let more = match self.config.cycle_count {
                CycleCount::Bounded(limit) => summary.cycles_started < u64::from(limit),
                CycleCount::Unbounded => true,
            };
            if more {
                info!(
                    "Waiting {}s until next cycle",
                    self.config.cycle_interval.as_secs()
                );
            }
        }

        let totals = self.stats.snapshot();
        info!(
            "Collection finished: cycles_completed={}, cycles_failed={}, records_persisted={}",
            totals.cycles_completed, totals.cycles_failed, totals.records_persisted
        );
        summary
    }
}
