//! Error taxonomy shared by the client, the store and the collector.
//!
//! `NotAvailable` is intentionally absent: an instrument without data is a
//! valid outcome (`SnapshotResponse::NotAvailable`), not a failure.

use crate::clients::deribit::TOO_MANY_REQUESTS_CODE;
use thiserror::Error;

/// Failure reaching the exchange or understanding its reply
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upstream api error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl TransportError {
    /// Timeouts, connection failures, throttling and server-side errors.
    pub fn is_retriable(&self) -> bool {
        match self {
            TransportError::Http(e) => e.is_timeout() || e.is_connect(),
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            TransportError::Api { code, .. } => *code == TOO_MANY_REQUESTS_CODE,
            TransportError::Malformed(_) => false,
        }
    }
}

/// Failure persisting or reloading partitions
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no records to persist")]
    NoData,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("invalid partition schema: {0}")]
    Schema(String),
}

/// Why a collection cycle did not complete
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("instrument discovery failed: {0}")]
    Discovery(#[source] TransportError),
    #[error("partition append failed: {0}")]
    Storage(#[source] StoreError),
}
