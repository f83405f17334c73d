//! Collector Core - options market data model, exchange client and storage.
//!
//! This crate provides:
//! - Instrument, snapshot and record types for option chains
//! - The `SnapshotSource` abstraction with a Deribit public-API implementation
//! - Retry with exponential backoff for transient upstream failures
//! - Date-partitioned Parquet storage with append and ranged load

pub mod clients;
pub mod error;
pub mod models;
pub mod retry;
pub mod storage;

pub use error::{CycleError, StoreError, TransportError};
pub use models::{Currency, Instrument, OptionKind, Record, Snapshot, SnapshotResponse};
pub use storage::{DateRange, PartitionHandle, PartitionStore};
