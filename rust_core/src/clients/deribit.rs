//! Deribit Public API Client
//!
//! Provides option instruments and order-book snapshots from the Deribit
//! public JSON-RPC-over-HTTP API. No API key required for public endpoints.
//!
//! Rate limits: credit based per IP; pacing is the caller's responsibility.

use super::snapshot_source::{SnapshotSource, SourceStatus};
use crate::error::TransportError;
use crate::models::{Currency, Greeks, Instrument, OptionKind, Snapshot, SnapshotResponse};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DERIBIT_API_PROD: &str = "https://www.deribit.com";

/// JSON-RPC error code for an unknown entity
const NOT_FOUND_CODE: i64 = 13020;
/// JSON-RPC error code for invalid params (unknown instrument_name lands here)
const INVALID_PARAMS_CODE: i64 = -32602;
/// JSON-RPC error code for credit exhaustion
pub const TOO_MANY_REQUESTS_CODE: i64 = 10028;

/// Deribit API client implementing SnapshotSource
#[derive(Clone)]
pub struct DeribitClient {
    client: Client,
    base_url: String,
    /// Current provider status
    status: Arc<RwLock<SourceStatus>>,
}

impl std::fmt::Debug for DeribitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeribitClient")
            .field("base_url", &self.base_url)
            .field("status", &*self.status.read())
            .finish()
    }
}

impl DeribitClient {
    /// Create a new client against `base_url` (e.g. `DERIBIT_API_PROD`)
    ///
    /// Returns Result so HTTP client construction failure is surfaced, not panicked on.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("options-collector/0.1")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            status: Arc::new(RwLock::new(SourceStatus::Healthy)),
        })
    }

    /// Production endpoint with a 10s timeout
    pub fn with_defaults() -> Result<Self, TransportError> {
        Self::new(DERIBIT_API_PROD, Duration::from_secs(10))
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/api/v2/public/{}", self.base_url, method)
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<String, TransportError> {
        response.text().await.map_err(|e| {
            *self.status.write() = SourceStatus::Error;
            TransportError::Http(e)
        })
    }

    fn record_outcome<T>(&self, http_status: u16, outcome: &Result<T, TransportError>) {
        let status = match outcome {
            Ok(_) => SourceStatus::Healthy,
            Err(TransportError::Api { code, .. }) if *code == TOO_MANY_REQUESTS_CODE => {
                SourceStatus::RateLimited
            }
            Err(_) if http_status == 429 => SourceStatus::RateLimited,
            Err(_) => SourceStatus::Error,
        };
        *self.status.write() = status;
    }
}

#[async_trait]
impl SnapshotSource for DeribitClient {
    fn source_name(&self) -> &str {
        "Deribit"
    }

    fn status(&self) -> SourceStatus {
        *self.status.read()
    }

    async fn list_instruments(
        &self,
        currency: Currency,
        kind: &str,
        include_expired: bool,
    ) -> Result<Vec<Instrument>, TransportError> {
        let url = self.endpoint("get_instruments");
        let expired = if include_expired { "true" } else { "false" };

        debug!("Fetching {} {} instruments from Deribit", currency, kind);

        let response = self
            .client
            .get(&url)
            .query(&[("currency", currency.as_str()), ("kind", kind), ("expired", expired)])
            .send()
            .await
            .map_err(|e| {
                *self.status.write() = SourceStatus::Error;
                TransportError::Http(e)
            })?;

        let http_status = response.status().as_u16();
        let body = self.read_body(response).await?;
        let outcome = decode_instruments(http_status, &body);
        self.record_outcome(http_status, &outcome);
        outcome
    }

    async fn get_snapshot(
        &self,
        instrument_name: &str,
    ) -> Result<SnapshotResponse, TransportError> {
        let url = self.endpoint("get_order_book");

        let response = self
            .client
            .get(&url)
            .query(&[("instrument_name", instrument_name)])
            .send()
            .await
            .map_err(|e| {
                *self.status.write() = SourceStatus::Error;
                TransportError::Http(e)
            })?;

        let http_status = response.status().as_u16();
        let body = self.read_body(response).await?;
        let outcome = decode_order_book(http_status, &body);
        self.record_outcome(http_status, &outcome);
        outcome
    }
}

// ============================================================================
// Response decoding
// ============================================================================

/// JSON-RPC envelope shared by every public method
#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl RpcError {
    fn is_not_found(&self) -> bool {
        if self.code == NOT_FOUND_CODE {
            return true;
        }
        if self.code != INVALID_PARAMS_CODE {
            return false;
        }
        let detail = self
            .data
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default();
        format!("{} {}", self.message, detail)
            .to_lowercase()
            .contains("instrument")
    }

    fn into_transport(self) -> TransportError {
        TransportError::Api {
            code: self.code,
            message: self.message,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawInstrument {
    instrument_name: String,
    expiration_timestamp: Option<i64>,
    strike: Option<f64>,
    option_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawOrderBook {
    mark_price: Option<f64>,
    last_price: Option<f64>,
    best_bid_price: Option<f64>,
    best_ask_price: Option<f64>,
    greeks: Option<RawGreeks>,
    mark_iv: Option<f64>,
    bid_iv: Option<f64>,
    ask_iv: Option<f64>,
    open_interest: Option<f64>,
    stats: Option<RawStats>,
    underlying_price: Option<f64>,
    underlying_index: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGreeks {
    delta: Option<f64>,
    gamma: Option<f64>,
    vega: Option<f64>,
    theta: Option<f64>,
    rho: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStats {
    volume: Option<f64>,
}

fn is_success(http_status: u16) -> bool {
    (200..300).contains(&http_status)
}

/// Decode a `get_instruments` reply.
///
/// Entries lacking a strike, expiry or recognised option type are skipped.
pub fn decode_instruments(http_status: u16, body: &str) -> Result<Vec<Instrument>, TransportError> {
    let envelope: RpcEnvelope<Vec<RawInstrument>> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(_) if !is_success(http_status) => {
            return Err(TransportError::Status {
                status: http_status,
                body: body.to_string(),
            })
        }
        Err(e) => return Err(TransportError::Malformed(e.to_string())),
    };

    if let Some(error) = envelope.error {
        return Err(error.into_transport());
    }
    if !is_success(http_status) {
        return Err(TransportError::Status {
            status: http_status,
            body: body.to_string(),
        });
    }

    let raw = envelope
        .result
        .ok_or_else(|| TransportError::Malformed("get_instruments reply has no result".to_string()))?;

    let instruments = raw
        .into_iter()
        .filter_map(|entry| {
            let option_type = entry.option_type.as_deref().and_then(|t| t.parse::<OptionKind>().ok());
            match (entry.expiration_timestamp, entry.strike, option_type) {
                (Some(expiration_timestamp), Some(strike), Some(option_type)) => Some(Instrument {
                    instrument_name: entry.instrument_name,
                    expiration_timestamp,
                    strike,
                    option_type,
                }),
                _ => {
                    warn!("Skipping incomplete instrument entry {}", entry.instrument_name);
                    None
                }
            }
        })
        .collect();

    Ok(instruments)
}

/// Decode a `get_order_book` reply.
pub fn decode_order_book(http_status: u16, body: &str) -> Result<SnapshotResponse, TransportError> {
    if http_status == 404 {
        return Ok(SnapshotResponse::NotAvailable);
    }

    let envelope: RpcEnvelope<RawOrderBook> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(_) if !is_success(http_status) => {
            return Err(TransportError::Status {
                status: http_status,
                body: body.to_string(),
            })
        }
        Err(e) => return Err(TransportError::Malformed(e.to_string())),
    };

    if let Some(error) = envelope.error {
        if error.is_not_found() {
            return Ok(SnapshotResponse::NotAvailable);
        }
        return Err(error.into_transport());
    }
    if !is_success(http_status) {
        return Err(TransportError::Status {
            status: http_status,
            body: body.to_string(),
        });
    }

    Ok(match envelope.result {
        Some(book) => SnapshotResponse::Available(snapshot_from_book(book)),
        None => SnapshotResponse::NotAvailable,
    })
}

/// Deribit reports an empty book side as best price 0, whatever the amount.
fn quoted_side(price: Option<f64>) -> Option<f64> {
    price.filter(|p| *p != 0.0)
}

fn snapshot_from_book(book: RawOrderBook) -> Snapshot {
    let greeks = book
        .greeks
        .map(|g| Greeks {
            delta: g.delta,
            gamma: g.gamma,
            vega: g.vega,
            theta: g.theta,
            rho: g.rho,
        })
        .unwrap_or_default();

    Snapshot {
        mark_price: book.mark_price,
        last_price: book.last_price,
        best_bid_price: quoted_side(book.best_bid_price),
        best_ask_price: quoted_side(book.best_ask_price),
        greeks,
        mark_iv: book.mark_iv,
        bid_iv: book.bid_iv,
        ask_iv: book.ask_iv,
        open_interest: book.open_interest,
        volume_24h: book.stats.and_then(|s| s.volume),
        underlying_price: book.underlying_price,
        underlying_index: book.underlying_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTRUMENTS_BODY: &str = r#"{
        "jsonrpc": "2.0",
        "result": [
            {"instrument_name": "BTC-27DEC24-100000-C", "kind": "option",
             "expiration_timestamp": 1735286400000, "strike": 100000.0, "option_type": "call"},
            {"instrument_name": "BTC-27DEC24-80000-P", "kind": "option",
             "expiration_timestamp": 1735286400000, "strike": 80000.0, "option_type": "put"},
            {"instrument_name": "BTC-PERPETUAL", "kind": "future",
             "expiration_timestamp": 32503708800000}
        ],
        "usIn": 1, "usOut": 2, "usDiff": 1, "testnet": false
    }"#;

    const ORDER_BOOK_BODY: &str = r#"{
        "jsonrpc": "2.0",
        "result": {
            "instrument_name": "BTC-27DEC24-100000-C",
            "mark_price": 0.0425, "last_price": 0.041,
            "best_bid_price": 0.041, "best_bid_amount": 12.5,
            "best_ask_price": 0.044, "best_ask_amount": 3.0,
            "greeks": {"delta": 0.42, "gamma": 0.00001, "vega": 123.4, "theta": -55.1, "rho": 60.2},
            "mark_iv": 55.3, "bid_iv": 54.1, "ask_iv": 56.9,
            "open_interest": 812.4,
            "stats": {"volume": 41.2, "high": 0.05, "low": 0.039},
            "underlying_price": 97250.5, "underlying_index": "BTC-27DEC24"
        }
    }"#;

    #[test]
    fn test_decode_instruments_skips_incomplete_entries() {
        let instruments = decode_instruments(200, INSTRUMENTS_BODY).unwrap();
        assert_eq!(instruments.len(), 2);
        assert_eq!(instruments[0].instrument_name, "BTC-27DEC24-100000-C");
        assert_eq!(instruments[0].option_type, OptionKind::Call);
        assert_eq!(instruments[0].expiration_timestamp, 1_735_286_400_000);
        assert_eq!(instruments[1].strike, 80_000.0);
        assert_eq!(instruments[1].option_type, OptionKind::Put);
    }

    #[test]
    fn test_decode_instruments_empty_result_is_not_an_error() {
        let instruments = decode_instruments(200, r#"{"jsonrpc":"2.0","result":[]}"#).unwrap();
        assert!(instruments.is_empty());
    }

    #[test]
    fn test_decode_instruments_errors() {
        let api = decode_instruments(
            400,
            r#"{"jsonrpc":"2.0","error":{"code":-32602,"message":"Invalid params"}}"#,
        );
        assert!(matches!(api, Err(TransportError::Api { code: -32602, .. })));

        let status = decode_instruments(502, "<html>bad gateway</html>");
        assert!(matches!(status, Err(TransportError::Status { status: 502, .. })));

        let malformed = decode_instruments(200, r#"{"jsonrpc":"2.0"}"#);
        assert!(matches!(malformed, Err(TransportError::Malformed(_))));

        let garbage = decode_instruments(200, "not json");
        assert!(matches!(garbage, Err(TransportError::Malformed(_))));
    }

    #[test]
    fn test_decode_full_order_book() {
        let snapshot = match decode_order_book(200, ORDER_BOOK_BODY).unwrap() {
            SnapshotResponse::Available(s) => s,
            other => panic!("expected snapshot, got {:?}", other),
        };
        assert_eq!(snapshot.mark_price, Some(0.0425));
        assert_eq!(snapshot.best_bid_price, Some(0.041));
        assert_eq!(snapshot.best_ask_price, Some(0.044));
        assert_eq!(snapshot.greeks.delta, Some(0.42));
        assert_eq!(snapshot.greeks.theta, Some(-55.1));
        assert_eq!(snapshot.volume_24h, Some(41.2));
        assert_eq!(snapshot.underlying_index.as_deref(), Some("BTC-27DEC24"));
    }

    #[test]
    fn test_decode_partial_order_book_keeps_unknowns_absent() {
        let body = r#"{"jsonrpc":"2.0","result":{"mark_price":0.01,"last_price":null,
            "best_bid_price":0.0,"best_bid_amount":0.0,"best_ask_price":0.012,"best_ask_amount":1.0}}"#;
        let snapshot = match decode_order_book(200, body).unwrap() {
            SnapshotResponse::Available(s) => s,
            other => panic!("expected snapshot, got {:?}", other),
        };
        assert_eq!(snapshot.last_price, None);
        assert_eq!(snapshot.best_bid_price, None);
        assert_eq!(snapshot.best_ask_price, Some(0.012));
        assert_eq!(snapshot.greeks, Greeks::default());
        assert_eq!(snapshot.volume_24h, None);
        assert_eq!(snapshot.open_interest, None);
    }

    #[test]
    fn test_zero_best_price_is_empty_side_even_with_amount() {
        let body = r#"{"jsonrpc":"2.0","result":{"mark_price":0.01,
            "best_bid_price":0.0,"best_bid_amount":4.0,"best_ask_price":0.0,"best_ask_amount":2.5}}"#;
        let snapshot = match decode_order_book(200, body).unwrap() {
            SnapshotResponse::Available(s) => s,
            other => panic!("expected snapshot, got {:?}", other),
        };
        assert_eq!(snapshot.best_bid_price, None);
        assert_eq!(snapshot.best_ask_price, None);
        assert_eq!(snapshot.mark_price, Some(0.01));
    }

    #[tokio::test]
    async fn test_truncated_body_marks_status_error() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            // promises 100 bytes, sends 10, hangs up
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n{\"jsonrpc\"")
                .await;
            let _ = socket.shutdown().await;
        });

        let client = DeribitClient::new(format!("http://{}", addr), Duration::from_secs(2)).unwrap();
        let result = client.get_snapshot("BTC-27DEC24-100000-C").await;
        assert!(matches!(result, Err(TransportError::Http(_))));
        assert_eq!(client.status(), SourceStatus::Error);
    }

    #[test]
    fn test_decode_order_book_not_available() {
        assert_eq!(
            decode_order_book(200, r#"{"jsonrpc":"2.0","result":null}"#).unwrap(),
            SnapshotResponse::NotAvailable
        );
        assert_eq!(
            decode_order_book(404, "").unwrap(),
            SnapshotResponse::NotAvailable
        );
        let unknown = r#"{"jsonrpc":"2.0","error":{"code":-32602,"message":"Invalid params",
            "data":{"reason":"instrument not found","param":"instrument_name"}}}"#;
        assert_eq!(
            decode_order_book(400, unknown).unwrap(),
            SnapshotResponse::NotAvailable
        );
        let not_found = r#"{"jsonrpc":"2.0","error":{"code":13020,"message":"not_found"}}"#;
        assert_eq!(
            decode_order_book(400, not_found).unwrap(),
            SnapshotResponse::NotAvailable
        );
    }

    #[test]
    fn test_decode_order_book_transport_errors() {
        let throttled = r#"{"jsonrpc":"2.0","error":{"code":10028,"message":"too_many_requests"}}"#;
        assert!(matches!(
            decode_order_book(429, throttled),
            Err(TransportError::Api { code: TOO_MANY_REQUESTS_CODE, .. })
        ));
        assert!(matches!(
            decode_order_book(500, "internal error"),
            Err(TransportError::Status { status: 500, .. })
        ));
        assert!(matches!(
            decode_order_book(200, "{"),
            Err(TransportError::Malformed(_))
        ));
    }

    #[test]
    fn test_client_creation() {
        let client = DeribitClient::new("https://test.deribit.com/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.source_name(), "Deribit");
        assert_eq!(client.status(), SourceStatus::Healthy);
        assert_eq!(
            client.endpoint("get_order_book"),
            "https://test.deribit.com/api/v2/public/get_order_book"
        );
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_list_and_snapshot_live() {
        let client = DeribitClient::with_defaults().unwrap();
        let instruments = client
            .list_instruments(Currency::BTC, "option", false)
            .await
            .unwrap();
        assert!(!instruments.is_empty());
        let response = client
            .get_snapshot(&instruments[0].instrument_name)
            .await
            .unwrap();
        assert!(matches!(response, SnapshotResponse::Available(_)));
    }
}
