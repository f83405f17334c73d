//! Arrow schema for partition files and Record <-> RecordBatch conversion.

use crate::error::StoreError;
use crate::models::{OptionKind, Record};
use arrow::array::{
    Array, ArrayRef, Float64Array, Int64Array, StringArray, TimestampMillisecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const TIMESTAMP_TZ: &str = "UTC";

const FLOAT_COLUMN_COUNT: usize = 16;

/// Nullable f64 columns in schema order, after the instrument fields.
const FLOAT_COLUMNS: [&str; FLOAT_COLUMN_COUNT] = [
    "mark_price",
    "last_price",
    "bid_price",
    "ask_price",
    "mid_price",
    "delta",
    "gamma",
    "vega",
    "theta",
    "rho",
    "mark_iv",
    "bid_iv",
    "ask_iv",
    "open_interest",
    "volume_24h",
    "underlying_price",
];

/// Flattened Record layout, one column per field.
pub fn record_schema() -> Schema {
    let mut fields = vec![
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Millisecond, Some(TIMESTAMP_TZ.into())),
            false,
        ),
        Field::new("instrument_name", DataType::Utf8, false),
        Field::new("expiration_timestamp", DataType::Int64, false),
        Field::new("strike", DataType::Float64, false),
        Field::new("option_type", DataType::Utf8, false),
    ];
    fields.extend(
        FLOAT_COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Float64, true)),
    );
    fields.push(Field::new("underlying_index", DataType::Utf8, true));
    Schema::new(fields)
}

pub fn record_schema_ref() -> SchemaRef {
    Arc::new(record_schema())
}

fn float_values(record: &Record) -> [Option<f64>; FLOAT_COLUMN_COUNT] {
    [
        record.mark_price,
        record.last_price,
        record.bid_price,
        record.ask_price,
        record.mid_price,
        record.delta,
        record.gamma,
        record.vega,
        record.theta,
        record.rho,
        record.mark_iv,
        record.bid_iv,
        record.ask_iv,
        record.open_interest,
        record.volume_24h,
        record.underlying_price,
    ]
}

pub fn records_to_batch(records: &[Record]) -> Result<RecordBatch, StoreError> {
    let timestamp = Arc::new(
        TimestampMillisecondArray::from(
            records
                .iter()
                .map(|r| r.timestamp.timestamp_millis())
                .collect::<Vec<_>>(),
        )
        .with_timezone(TIMESTAMP_TZ),
    ) as ArrayRef;
    let instrument_name = Arc::new(StringArray::from(
        records
            .iter()
            .map(|r| r.instrument_name.as_str())
            .collect::<Vec<_>>(),
    )) as ArrayRef;
    let expiration = Arc::new(Int64Array::from(
        records
            .iter()
            .map(|r| r.expiration_timestamp)
            .collect::<Vec<_>>(),
    )) as ArrayRef;
    let strike = Arc::new(Float64Array::from(
        records.iter().map(|r| r.strike).collect::<Vec<_>>(),
    )) as ArrayRef;
    let option_type = Arc::new(StringArray::from(
        records
            .iter()
            .map(|r| r.option_type.as_str())
            .collect::<Vec<_>>(),
    )) as ArrayRef;

    let rows: Vec<[Option<f64>; FLOAT_COLUMN_COUNT]> = records.iter().map(float_values).collect();

    let mut arrays = vec![timestamp, instrument_name, expiration, strike, option_type];
    for col in 0..FLOAT_COLUMN_COUNT {
        arrays.push(Arc::new(rows.iter().map(|row| row[col]).collect::<Float64Array>()) as ArrayRef);
    }
    arrays.push(Arc::new(StringArray::from(
        records
            .iter()
            .map(|r| r.underlying_index.as_deref())
            .collect::<Vec<_>>(),
    )) as ArrayRef);

    Ok(RecordBatch::try_new(record_schema_ref(), arrays)?)
}

/// Project a batch onto the record schema by column name, without casting.
///
/// Fails if a column is missing or typed differently.
pub fn conform_batch(batch: &RecordBatch) -> Result<RecordBatch, StoreError> {
    let schema = record_schema_ref();
    let mut columns = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let column = batch
            .column_by_name(field.name())
            .ok_or_else(|| StoreError::Schema(format!("missing column {}", field.name())))?;
        if column.data_type() != field.data_type() {
            return Err(StoreError::Schema(format!(
                "column {} is {:?}, expected {:?}",
                field.name(),
                column.data_type(),
                field.data_type()
            )));
        }
        columns.push(column.clone());
    }
    Ok(RecordBatch::try_new(schema, columns)?)
}

fn typed_col<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, StoreError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| StoreError::Schema(format!("missing column {}", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| StoreError::Schema(format!("column {} has unexpected type", name)))
}

fn opt_f64(array: &Float64Array, idx: usize) -> Option<f64> {
    if array.is_null(idx) {
        None
    } else {
        Some(array.value(idx))
    }
}

pub fn batch_to_records(batch: &RecordBatch) -> Result<Vec<Record>, StoreError> {
    let timestamp = typed_col::<TimestampMillisecondArray>(batch, "timestamp")?;
    let instrument_name = typed_col::<StringArray>(batch, "instrument_name")?;
    let expiration = typed_col::<Int64Array>(batch, "expiration_timestamp")?;
    let strike = typed_col::<Float64Array>(batch, "strike")?;
    let option_type = typed_col::<StringArray>(batch, "option_type")?;
    let underlying_index = typed_col::<StringArray>(batch, "underlying_index")?;
    let floats = FLOAT_COLUMNS
        .iter()
        .map(|name| typed_col::<Float64Array>(batch, name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut records = Vec::with_capacity(batch.num_rows());
    for idx in 0..batch.num_rows() {
        let ts_ms = timestamp.value(idx);
        let ts: DateTime<Utc> = DateTime::from_timestamp_millis(ts_ms)
            .ok_or_else(|| StoreError::Schema(format!("timestamp {} out of range", ts_ms)))?;
        let kind: OptionKind = option_type
            .value(idx)
            .parse()
            .map_err(StoreError::Schema)?;
        let f = |col: usize| opt_f64(floats[col], idx);

        records.push(Record {
            timestamp: ts,
            instrument_name: instrument_name.value(idx).to_string(),
            expiration_timestamp: expiration.value(idx),
            strike: strike.value(idx),
            option_type: kind,
            mark_price: f(0),
            last_price: f(1),
            bid_price: f(2),
            ask_price: f(3),
            mid_price: f(4),
            delta: f(5),
            gamma: f(6),
            vega: f(7),
            theta: f(8),
            rho: f(9),
            mark_iv: f(10),
            bid_iv: f(11),
            ask_iv: f(12),
            open_interest: f(13),
            volume_24h: f(14),
            underlying_price: f(15),
            underlying_index: if underlying_index.is_null(idx) {
                None
            } else {
                Some(underlying_index.value(idx).to_string())
            },
        });
    }
    Ok(records)
}
