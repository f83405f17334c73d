//! Snapshot Source Trait
//!
//! Defines a common interface for option-chain data providers.
//! The Deribit client is the production implementation; tests substitute
//! in-memory sources.

use crate::error::TransportError;
use crate::models::{Currency, Instrument, SnapshotResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Instrument class requested from discovery
pub const OPTION_KIND: &str = "option";

/// Provider health/availability status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceStatus {
    /// Provider is operational and responding normally
    Healthy,
    /// Provider is rate limited, requests should be delayed
    RateLimited,
    /// Provider returned an error, may be temporarily down
    Error,
}

impl Default for SourceStatus {
    fn default() -> Self {
        Self::Healthy
    }
}

/// Common trait for option-chain snapshot providers
///
/// Stateless request/response: implementations do not retry. Retry and
/// pacing policy belong to the caller.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Get the provider's display name (e.g., "Deribit")
    fn source_name(&self) -> &str;

    /// Get the current status of the provider
    fn status(&self) -> SourceStatus;

    /// List instruments of `kind` for an underlying currency
    ///
    /// # Returns
    /// * `Ok(vec![])` - Upstream reports zero instruments
    /// * `Err` - Network/HTTP failure or malformed response
    async fn list_instruments(
        &self,
        currency: Currency,
        kind: &str,
        include_expired: bool,
    ) -> Result<Vec<Instrument>, TransportError>;

    /// Get the current order-book snapshot for one instrument
    ///
    /// # Returns
    /// * `Ok(SnapshotResponse::Available)` - Market data (fields may be missing)
    /// * `Ok(SnapshotResponse::NotAvailable)` - Upstream has no book for it
    /// * `Err` - Network/HTTP failure
    async fn get_snapshot(&self, instrument_name: &str)
        -> Result<SnapshotResponse, TransportError>;
}
