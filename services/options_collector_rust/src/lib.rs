//! options_collector_rust - Periodic option-chain snapshot collection into daily Parquet partitions

pub mod assembler;
pub mod collector;
pub mod config;
pub mod fetcher;
pub mod shutdown;
pub mod stats;

pub use collector::{CollectorState, OptionsCollector};
pub use config::{CollectorConfig, CycleCount};
pub use fetcher::{FetchOutcome, FetchTally, FetchedSnapshot, RateLimit, RateLimitedFetcher};
pub use shutdown::{shutdown_channel, ShutdownHandle, ShutdownSignal};
pub use stats::{CollectorStats, CycleReport, RunSummary};
