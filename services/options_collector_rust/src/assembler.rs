//! Flattening fetched snapshots into persisted records.

use crate::fetcher::{FetchOutcome, FetchTally, FetchedSnapshot};
use chrono::{DateTime, Utc};
use collector_rust_core::models::{mid_price, Instrument, OptionKind, Record, Snapshot};
use std::collections::HashSet;

/// Build one record. Absent snapshot fields stay absent.
pub fn assemble(collected_at: DateTime<Utc>, instrument: &Instrument, snapshot: &Snapshot) -> Record {
    Record {
        timestamp: collected_at,
        instrument_name: instrument.instrument_name.clone(),
        expiration_timestamp: instrument.expiration_timestamp,
        strike: instrument.strike,
        option_type: instrument.option_type,

        mark_price: snapshot.mark_price,
        last_price: snapshot.last_price,
        bid_price: snapshot.best_bid_price,
        ask_price: snapshot.best_ask_price,
        mid_price: mid_price(snapshot.best_bid_price, snapshot.best_ask_price),

        delta: snapshot.greeks.delta,
        gamma: snapshot.greeks.gamma,
        vega: snapshot.greeks.vega,
        theta: snapshot.greeks.theta,
        rho: snapshot.greeks.rho,

        mark_iv: snapshot.mark_iv,
        bid_iv: snapshot.bid_iv,
        ask_iv: snapshot.ask_iv,

        open_interest: snapshot.open_interest,
        volume_24h: snapshot.volume_24h,

        underlying_price: snapshot.underlying_price,
        underlying_index: snapshot.underlying_index.clone(),
    }
}

/// Records for every successful fetch, plus the outcome tally for the whole batch.
pub fn assemble_batch(fetched: Vec<FetchedSnapshot>) -> (Vec<Record>, FetchTally) {
    let mut tally = FetchTally::default();
    let mut records = Vec::with_capacity(fetched.len());
    for item in fetched {
        tally.record(&item.outcome);
        if let FetchOutcome::Snapshot(snapshot) = &item.outcome {
            records.push(assemble(item.received_at, &item.instrument, snapshot));
        }
    }
    (records, tally)
}

/// Composition of one batch of records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProfile {
    pub calls: usize,
    pub puts: usize,
    pub unique_expirations: usize,
    pub unique_strikes: usize,
    /// Bid and ask both known with open interest
    pub two_sided: usize,
}

impl BatchProfile {
    pub fn from_records(records: &[Record]) -> Self {
        let mut profile = Self::default();
        let mut expirations = HashSet::new();
        let mut strikes = HashSet::new();

        for record in records {
            match record.option_type {
                OptionKind::Call => profile.calls += 1,
                OptionKind::Put => profile.puts += 1,
            }
            expirations.insert(record.expiration_timestamp);
            strikes.insert(record.strike.to_bits());
            if record.is_two_sided() {
                profile.two_sided += 1;
            }
        }

        profile.unique_expirations = expirations.len();
        profile.unique_strikes = strikes.len();
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use collector_rust_core::error::TransportError;
    use collector_rust_core::models::Greeks;

    fn instrument(name: &str, expiry: i64, strike: f64, kind: OptionKind) -> Instrument {
        Instrument {
            instrument_name: name.to_string(),
            expiration_timestamp: expiry,
            strike,
            option_type: kind,
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn full_snapshot() -> Snapshot {
        Snapshot {
            mark_price: Some(0.0425),
            last_price: Some(0.04),
            best_bid_price: Some(0.041),
            best_ask_price: Some(0.044),
            greeks: Greeks {
                delta: Some(0.42),
                gamma: Some(0.00002),
                vega: Some(110.5),
                theta: Some(-55.1),
                rho: Some(12.3),
            },
            mark_iv: Some(55.3),
            bid_iv: Some(54.0),
            ask_iv: Some(56.9),
            open_interest: Some(120.5),
            volume_24h: Some(33.0),
            underlying_price: Some(97_250.5),
            underlying_index: Some("BTC-27DEC24".to_string()),
        }
    }

    #[test]
    fn test_assemble_copies_every_field() {
        let inst = instrument("BTC-27DEC24-100000-C", 1_735_286_400_000, 100_000.0, OptionKind::Call);
        let record = assemble(at(), &inst, &full_snapshot());

        assert_eq!(record.timestamp, at());
        assert_eq!(record.instrument_name, "BTC-27DEC24-100000-C");
        assert_eq!(record.expiration_timestamp, 1_735_286_400_000);
        assert_eq!(record.strike, 100_000.0);
        assert_eq!(record.option_type, OptionKind::Call);
        assert_eq!(record.bid_price, Some(0.041));
        assert_eq!(record.ask_price, Some(0.044));
        assert_eq!(record.mid_price, Some((0.041 + 0.044) / 2.0));
        assert_eq!(record.rho, Some(12.3));
        assert_eq!(record.volume_24h, Some(33.0));
        assert_eq!(record.underlying_index.as_deref(), Some("BTC-27DEC24"));
    }

    #[test]
    fn test_missing_fields_stay_null() {
        let inst = instrument("BTC-X", 1, 1.0, OptionKind::Put);
        let record = assemble(at(), &inst, &Snapshot::default());

        assert_eq!(record.mark_price, None);
        assert_eq!(record.bid_price, None);
        assert_eq!(record.ask_price, None);
        assert_eq!(record.mid_price, None);
        assert_eq!(record.delta, None);
        assert_eq!(record.open_interest, None);
        assert_eq!(record.underlying_index, None);
    }

    #[test]
    fn test_mid_price_never_from_one_side() {
        let inst = instrument("BTC-X", 1, 1.0, OptionKind::Put);
        let bid_only = Snapshot {
            best_bid_price: Some(0.05),
            ..Snapshot::default()
        };
        let ask_only = Snapshot {
            best_ask_price: Some(0.07),
            ..Snapshot::default()
        };
        assert_eq!(assemble(at(), &inst, &bid_only).mid_price, None);
        assert_eq!(assemble(at(), &inst, &ask_only).mid_price, None);
    }

    #[test]
    fn test_zero_values_are_kept() {
        let inst = instrument("BTC-X", 1, 1.0, OptionKind::Call);
        let snapshot = Snapshot {
            best_bid_price: Some(0.0),
            best_ask_price: Some(0.0),
            greeks: Greeks {
                gamma: Some(0.0),
                ..Greeks::default()
            },
            ..Snapshot::default()
        };
        let record = assemble(at(), &inst, &snapshot);
        assert_eq!(record.mid_price, Some(0.0));
        assert_eq!(record.gamma, Some(0.0));
    }

    #[test]
    fn test_batch_keeps_only_snapshots() {
        let fetched = vec![
            FetchedSnapshot {
                instrument: instrument("A", 1, 1.0, OptionKind::Call),
                received_at: at(),
                outcome: FetchOutcome::Failed(TransportError::Malformed("boom".to_string())),
            },
            FetchedSnapshot {
                instrument: instrument("B", 1, 2.0, OptionKind::Put),
                received_at: at(),
                outcome: FetchOutcome::Snapshot(full_snapshot()),
            },
            FetchedSnapshot {
                instrument: instrument("C", 1, 3.0, OptionKind::Put),
                received_at: at(),
                outcome: FetchOutcome::NotAvailable,
            },
            FetchedSnapshot {
                instrument: instrument("D", 1, 4.0, OptionKind::Put),
                received_at: at(),
                outcome: FetchOutcome::Skipped,
            },
        ];

        let (records, tally) = assemble_batch(fetched);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].instrument_name, "B");
        assert_eq!(tally.snapshots, 1);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.not_available, 1);
        assert_eq!(tally.skipped, 1);
    }

    #[test]
    fn test_batch_profile() {
        let mut illiquid = full_snapshot();
        illiquid.open_interest = Some(0.0);
        let one_sided = Snapshot {
            best_bid_price: Some(0.01),
            open_interest: Some(5.0),
            ..Snapshot::default()
        };

        let records = vec![
            assemble(at(), &instrument("A", 100, 90_000.0, OptionKind::Call), &full_snapshot()),
            assemble(at(), &instrument("B", 100, 90_000.0, OptionKind::Put), &illiquid),
            assemble(at(), &instrument("C", 200, 95_000.0, OptionKind::Call), &one_sided),
        ];

        let profile = BatchProfile::from_records(&records);
        assert_eq!(
            profile,
            BatchProfile {
                calls: 2,
                puts: 1,
                unique_expirations: 2,
                unique_strikes: 2,
                two_sided: 1,
            }
        );
        assert_eq!(BatchProfile::from_records(&[]), BatchProfile::default());
    }
}
