//! Rate-limited snapshot fetching
//!
//! Drives `SnapshotSource::get_snapshot` across a whole instrument list with
//! a concurrency cap and a minimum spacing between request starts. Individual
//! failures are recorded in the output and never stop the batch.
//!
//! Shutdown policy is drain: once signalled, no new request starts, requests
//! already in flight finish and keep their result, and instruments that never
//! started come back as `Skipped`.

use crate::shutdown::ShutdownSignal;
use chrono::{DateTime, SubsecRound, Utc};
use collector_rust_core::clients::SnapshotSource;
use collector_rust_core::error::TransportError;
use collector_rust_core::models::{Instrument, Snapshot, SnapshotResponse};
use futures_util::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Progress is logged every this many processed instruments
const PROGRESS_EVERY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Requests in flight at once
    pub max_concurrent: usize,
    /// Minimum spacing between consecutive request starts, across all workers
    pub inter_request_delay: Duration,
}

#[derive(Debug)]
pub enum FetchOutcome {
    Snapshot(Snapshot),
    NotAvailable,
    Failed(TransportError),
    Skipped,
}

#[derive(Debug)]
pub struct FetchedSnapshot {
    pub instrument: Instrument,
    /// Millisecond-truncated instant the response was received
    pub received_at: DateTime<Utc>,
    pub outcome: FetchOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchTally {
    pub snapshots: usize,
    pub not_available: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl FetchTally {
    pub fn record(&mut self, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::Snapshot(_) => self.snapshots += 1,
            FetchOutcome::NotAvailable => self.not_available += 1,
            FetchOutcome::Failed(_) => self.failed += 1,
            FetchOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.snapshots + self.not_available + self.failed + self.skipped
    }
}

pub struct RateLimitedFetcher {
    source: Arc<dyn SnapshotSource>,
    rate: RateLimit,
}

impl RateLimitedFetcher {
    pub fn new(source: Arc<dyn SnapshotSource>, rate: RateLimit) -> Self {
        Self { source, rate }
    }

    /// Fetch a snapshot for every instrument.
    ///
    /// The output holds exactly one entry per input instrument, in completion
    /// order.
    pub async fn fetch_all(
        &self,
        instruments: Vec<Instrument>,
        shutdown: &ShutdownSignal,
    ) -> Vec<FetchedSnapshot> {
        let total = instruments.len();
        let pacer = start_pacer(self.rate.inter_request_delay).map(Mutex::new);
        let processed = AtomicUsize::new(0);

        let pacer = pacer.as_ref();
        let processed = &processed;

        stream::iter(instruments)
            .map(move |instrument| async move {
                let fetched = self.fetch_one(instrument, pacer, shutdown).await;
                let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                if done % PROGRESS_EVERY == 0 || done == total {
                    debug!("Processed {}/{} instruments", done, total);
                }
                fetched
            })
            .buffer_unordered(self.rate.max_concurrent.max(1))
            .collect()
            .await
    }

    async fn fetch_one(
        &self,
        instrument: Instrument,
        pacer: Option<&Mutex<Interval>>,
        shutdown: &ShutdownSignal,
    ) -> FetchedSnapshot {
        if shutdown.is_triggered() {
            return skipped(instrument);
        }

        if let Some(pacer) = pacer {
            let mut pacer = pacer.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.triggered() => return skipped(instrument),
                _ = pacer.tick() => {}
            }
        }

        let result = self.source.get_snapshot(&instrument.instrument_name).await;
        let received_at = now_millis();

        let outcome = match result {
            Ok(SnapshotResponse::Available(snapshot)) => FetchOutcome::Snapshot(snapshot),
            Ok(SnapshotResponse::NotAvailable) => {
                debug!("No order book for {}", instrument.instrument_name);
                FetchOutcome::NotAvailable
            }
            Err(e) => {
                warn!("Error fetching {}: {}", instrument.instrument_name, e);
                FetchOutcome::Failed(e)
            }
        };

        FetchedSnapshot {
            instrument,
            received_at,
            outcome,
        }
    }
}

fn start_pacer(delay: Duration) -> Option<Interval> {
    if delay.is_zero() {
        return None;
    }
    let mut ticker = interval(delay);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}

fn skipped(instrument: Instrument) -> FetchedSnapshot {
    FetchedSnapshot {
        instrument,
        received_at: now_millis(),
        outcome: FetchOutcome::Skipped,
    }
}

/// Partition files store millisecond timestamps
pub(crate) fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_counts_each_outcome() {
        let mut tally = FetchTally::default();
        tally.record(&FetchOutcome::Snapshot(Snapshot::default()));
        tally.record(&FetchOutcome::Snapshot(Snapshot::default()));
        tally.record(&FetchOutcome::NotAvailable);
        tally.record(&FetchOutcome::Failed(TransportError::Malformed("x".to_string())));
        tally.record(&FetchOutcome::Skipped);
        assert_eq!(
            tally,
            FetchTally {
                snapshots: 2,
                not_available: 1,
                failed: 1,
                skipped: 1
            }
        );
        assert_eq!(tally.total(), 5);
    }

    #[test]
    fn test_now_millis_has_no_sub_millisecond_part() {
        let now = now_millis();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[tokio::test]
    async fn test_zero_delay_disables_pacing() {
        assert!(start_pacer(Duration::ZERO).is_none());
        assert!(start_pacer(Duration::from_millis(5)).is_some());
    }
}
