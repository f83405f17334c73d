//! Data models for options market snapshots.
//!
//! Shared types used by the exchange client, the collector service and the
//! partition store. Every market-data field that upstream may omit is an
//! `Option` so "not reported" never collapses into zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Currency
// ============================================================================

/// Underlying currency whose option chain is collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    BTC,
    ETH,
    USDC,
    USDT,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::BTC => "BTC",
            Currency::ETH => "ETH",
            Currency::USDC => "USDC",
            Currency::USDT => "USDT",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BTC" => Ok(Currency::BTC),
            "ETH" => Ok(Currency::ETH),
            "USDC" => Ok(Currency::USDC),
            "USDT" => Ok(Currency::USDT),
            other => Err(format!("Unknown currency: {}", other)),
        }
    }
}

// ============================================================================
// Instruments
// ============================================================================

/// Call or put
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Call,
    Put,
}

impl OptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionKind::Call => "call",
            OptionKind::Put => "put",
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "call" => Ok(OptionKind::Call),
            "put" => Ok(OptionKind::Put),
            other => Err(format!("Unknown option type: {}", other)),
        }
    }
}

/// One live option contract as returned by instrument discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// Exchange identifier, e.g. "BTC-27DEC24-100000-C"
    pub instrument_name: String,
    /// Expiration instant in epoch milliseconds
    pub expiration_timestamp: i64,
    pub strike: f64,
    pub option_type: OptionKind,
}

// ============================================================================
// Snapshots
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub vega: Option<f64>,
    pub theta: Option<f64>,
    pub rho: Option<f64>,
}

/// Point-in-time market data for one instrument.
///
/// Any field may be absent; absence means upstream did not report it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub mark_price: Option<f64>,
    pub last_price: Option<f64>,
    pub best_bid_price: Option<f64>,
    pub best_ask_price: Option<f64>,
    pub greeks: Greeks,
    pub mark_iv: Option<f64>,
    pub bid_iv: Option<f64>,
    pub ask_iv: Option<f64>,
    pub open_interest: Option<f64>,
    pub volume_24h: Option<f64>,
    pub underlying_price: Option<f64>,
    pub underlying_index: Option<String>,
}

/// Outcome of a snapshot request that reached upstream
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotResponse {
    Available(Snapshot),
    /// Upstream has no order book for the instrument (e.g. delisted since discovery)
    NotAvailable,
}

// ============================================================================
// Records
// ============================================================================

/// The persisted unit: one instrument's snapshot at one collection instant,
/// flattened into the partition schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub instrument_name: String,
    pub expiration_timestamp: i64,
    pub strike: f64,
    pub option_type: OptionKind,

    // Prices
    pub mark_price: Option<f64>,
    pub last_price: Option<f64>,
    pub bid_price: Option<f64>,
    pub ask_price: Option<f64>,
    pub mid_price: Option<f64>,

    // Greeks
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub vega: Option<f64>,
    pub theta: Option<f64>,
    pub rho: Option<f64>,

    // Volatility
    pub mark_iv: Option<f64>,
    pub bid_iv: Option<f64>,
    pub ask_iv: Option<f64>,

    // Volume
    pub open_interest: Option<f64>,
    pub volume_24h: Option<f64>,

    // Underlying
    pub underlying_price: Option<f64>,
    pub underlying_index: Option<String>,
}

impl Record {
    /// Both sides of the book are known and there is open interest
    pub fn is_two_sided(&self) -> bool {
        self.bid_price.is_some()
            && self.ask_price.is_some()
            && self.open_interest.map(|oi| oi > 0.0).unwrap_or(false)
    }
}

/// Mid price, only when both sides are known.
pub fn mid_price(bid: Option<f64>, ask: Option<f64>) -> Option<f64> {
    match (bid, ask) {
        (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
        _ => None,
    }
}
