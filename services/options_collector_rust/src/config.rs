//! Configuration for options_collector_rust

use crate::fetcher::RateLimit;
use anyhow::{anyhow, Result};
use collector_rust_core::clients::deribit::DERIBIT_API_PROD;
use collector_rust_core::models::Currency;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How many cycles the periodic loop runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleCount {
    Bounded(u32),
    Unbounded,
}

impl fmt::Display for CycleCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleCount::Bounded(n) => write!(f, "{}", n),
            CycleCount::Unbounded => write!(f, "unbounded"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    // Target
    pub currency: Currency,
    pub storage_root: PathBuf,
    pub base_url: String,

    // Fetch pacing
    pub max_concurrent: usize,
    pub inter_request_delay: Duration,
    pub request_timeout: Duration,

    // Discovery
    pub discovery_attempts: u32,
    pub discovery_backoff: Duration,

    // Schedule
    pub cycle_interval: Duration,
    pub cycle_count: CycleCount,
}

impl CollectorConfig {
    /// Defaults for everything except what to collect and where to put it
    pub fn new(currency: Currency, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            currency,
            storage_root: storage_root.into(),
            base_url: DERIBIT_API_PROD.to_string(),
            max_concurrent: 4,
            inter_request_delay: Duration::from_millis(50),
            request_timeout: Duration::from_secs(10),
            discovery_attempts: 3,
            discovery_backoff: Duration::from_millis(500),
            cycle_interval: Duration::from_secs(300),
            cycle_count: CycleCount::Bounded(12),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let currency: Currency = lookup("COLLECTOR_CURRENCY")
            .unwrap_or_else(|| "BTC".to_string())
            .parse()
            .map_err(|e| anyhow!("COLLECTOR_CURRENCY: {}", e))?;

        let config = Self {
            currency,
            storage_root: lookup("COLLECTOR_STORAGE_ROOT")
                .unwrap_or_else(|| "deribit_data".to_string())
                .into(),
            base_url: lookup("DERIBIT_BASE_URL").unwrap_or_else(|| DERIBIT_API_PROD.to_string()),

            max_concurrent: parse_u64(&lookup, "COLLECTOR_MAX_CONCURRENT", 4)? as usize,
            inter_request_delay: Duration::from_millis(parse_u64(
                &lookup,
                "COLLECTOR_INTER_REQUEST_DELAY_MS",
                50,
            )?),
            request_timeout: Duration::from_secs(parse_u64(
                &lookup,
                "COLLECTOR_REQUEST_TIMEOUT_SECS",
                10,
            )?),

            discovery_attempts: parse_u32(&lookup, "COLLECTOR_DISCOVERY_ATTEMPTS", 3)?,
            discovery_backoff: Duration::from_millis(parse_u64(
                &lookup,
                "COLLECTOR_DISCOVERY_BACKOFF_MS",
                500,
            )?),

            cycle_interval: Duration::from_secs(parse_u64(
                &lookup,
                "COLLECTOR_CYCLE_INTERVAL_SECS",
                300,
            )?),
            cycle_count: parse_cycle_count(&lookup, "COLLECTOR_CYCLE_COUNT", CycleCount::Bounded(12))?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(anyhow!("COLLECTOR_MAX_CONCURRENT must be >= 1"));
        }
        if self.cycle_interval.is_zero() {
            return Err(anyhow!("COLLECTOR_CYCLE_INTERVAL_SECS must be > 0"));
        }
        if self.discovery_attempts == 0 {
            return Err(anyhow!("COLLECTOR_DISCOVERY_ATTEMPTS must be >= 1"));
        }
        if self.request_timeout.is_zero() {
            return Err(anyhow!("COLLECTOR_REQUEST_TIMEOUT_SECS must be > 0"));
        }
        Ok(())
    }

    pub fn rate_limit(&self) -> RateLimit {
        RateLimit {
            max_concurrent: self.max_concurrent,
            inter_request_delay: self.inter_request_delay,
        }
    }
}

/// Parse variable as u64 with default fallback
fn parse_u64<F>(lookup: &F, var_name: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var_name) {
        Some(val) => val
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} must be a valid u64", var_name)),
        None => Ok(default),
    }
}

/// Parse variable as u32 with default fallback
fn parse_u32<F>(lookup: &F, var_name: &str, default: u32) -> Result<u32>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var_name) {
        Some(val) => val
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} must be a valid u32", var_name)),
        None => Ok(default),
    }
}

/// `0` and `unbounded` both mean run until shut down
fn parse_cycle_count<F>(lookup: &F, var_name: &str, default: CycleCount) -> Result<CycleCount>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(val) = lookup(var_name) else {
        return Ok(default);
    };
    let val = val.trim();
    if val.eq_ignore_ascii_case("unbounded") {
        return Ok(CycleCount::Unbounded);
    }
    match val.parse::<u32>() {
        Ok(0) => Ok(CycleCount::Unbounded),
        Ok(n) => Ok(CycleCount::Bounded(n)),
        Err(_) => Err(anyhow!("{} must be a count or \"unbounded\"", var_name)),
    }
}
