//! Date-partitioned columnar storage for collected records.
//!
//! One Parquet file per (currency, calendar day), named
//! `{CURRENCY}_options_{YYYYMMDD}.parquet` so a lexicographic sort of the
//! file names is a date sort. Appends read the whole partition, concatenate
//! the new batch after it and replace the file atomically.
//!
//! Single writer per partition is assumed; nothing here locks the file.

pub mod schema;

use crate::error::StoreError;
use crate::models::{Currency, Record};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub use schema::{batch_to_records, record_schema, records_to_batch};

const PARTITION_EXTENSION: &str = "parquet";
const DATE_FORMAT: &str = "%Y%m%d";

/// File name for a (currency, day) partition
pub fn partition_file_name(currency: Currency, date: NaiveDate) -> String {
    format!(
        "{}_options_{}.{}",
        currency.as_str(),
        date.format(DATE_FORMAT),
        PARTITION_EXTENSION
    )
}

/// Inverse of `partition_file_name`; `None` for anything else in the directory.
pub fn parse_partition_date(file_name: &str, currency: Currency) -> Option<NaiveDate> {
    let prefix = format!("{}_options_", currency.as_str());
    let suffix = format!(".{}", PARTITION_EXTENSION);
    let stamp = file_name.strip_prefix(&prefix)?.strip_suffix(&suffix)?;
    if stamp.len() != 8 || !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(stamp, DATE_FORMAT).ok()
}

/// Inclusive date filter; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self::new(Some(start), Some(end))
    }

    pub fn since(start: NaiveDate) -> Self {
        Self::new(Some(start), None)
    }

    pub fn until(end: NaiveDate) -> Self {
        Self::new(None, Some(end))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

/// Result of a successful append
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionHandle {
    pub path: PathBuf,
    pub currency: Currency,
    pub date: NaiveDate,
    pub records_appended: usize,
    pub total_records: usize,
}

/// Partition files under one storage root
#[derive(Debug, Clone)]
pub struct PartitionStore {
    root: PathBuf,
}

impl PartitionStore {
    /// Open (creating if needed) a storage root
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partition_path(&self, currency: Currency, date: NaiveDate) -> PathBuf {
        self.root.join(partition_file_name(currency, date))
    }

    /// Append `records` after the existing content of the (currency, as_of) partition.
    ///
    /// The existing file is only replaced once the merged content has been
    /// fully written to a sibling temp file.
    pub fn append(
        &self,
        currency: Currency,
        records: &[Record],
        as_of: NaiveDate,
    ) -> Result<PartitionHandle, StoreError> {
        if records.is_empty() {
            return Err(StoreError::NoData);
        }

        let path = self.partition_path(currency, as_of);
        let mut batches = if path.exists() {
            let existing = read_batches(&path)?;
            info!(
                "Appending {} records to existing partition {}",
                records.len(),
                path.display()
            );
            existing
        } else {
            info!("Creating partition {}", path.display());
            Vec::new()
        };

        batches.push(records_to_batch(records)?);
        let total_records = batches.iter().map(|b| b.num_rows()).sum();
        write_batches_atomic(&path, &batches)?;

        info!("Total records in {}: {}", path.display(), total_records);

        Ok(PartitionHandle {
            path,
            currency,
            date: as_of,
            records_appended: records.len(),
            total_records,
        })
    }

    /// Partition files for `currency`, ascending by date
    pub fn list_partitions(&self, currency: Currency) -> Result<Vec<(NaiveDate, PathBuf)>, StoreError> {
        let mut named = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(date) = parse_partition_date(name, currency) {
                named.push((name.to_string(), date, entry.path()));
            }
        }
        named.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(named.into_iter().map(|(_, date, path)| (date, path)).collect())
    }

    /// Load every partition for `currency` whose date is in `range`, oldest first.
    pub fn load(&self, currency: Currency, range: Option<DateRange>) -> Result<Vec<Record>, StoreError> {
        let partitions = self.list_partitions(currency)?;
        if partitions.is_empty() {
            info!("No saved data found for {} in {}", currency, self.root.display());
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for (date, path) in partitions {
            if let Some(range) = range {
                if !range.contains(date) {
                    debug!("Skipping partition {} outside range", path.display());
                    continue;
                }
            }
            let loaded = read_partition(&path)?;
            info!("Loaded: {} ({} records)", path.display(), loaded.len());
            records.extend(loaded);
        }

        info!("Total loaded records: {}", records.len());
        Ok(records)
    }
}

/// Read one partition file
pub fn read_partition(path: &Path) -> Result<Vec<Record>, StoreError> {
    let mut records = Vec::new();
    for batch in read_batches(path)? {
        records.extend(batch_to_records(&batch)?);
    }
    Ok(records)
}

fn read_batches(path: &Path) -> Result<Vec<RecordBatch>, StoreError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let reader = builder.build()?;
    let mut batches = Vec::new();
    for batch in reader {
        batches.push(schema::conform_batch(&batch?)?);
    }
    Ok(batches)
}

fn write_batches_atomic(path: &Path, batches: &[RecordBatch]) -> Result<(), StoreError> {
    let tmp_path = path.with_extension(format!("{}.tmp", PARTITION_EXTENSION));
    if let Err(e) = write_batches(&tmp_path, batches) {
        if let Err(cleanup) = fs::remove_file(&tmp_path) {
            warn!("Failed to remove {}: {}", tmp_path.display(), cleanup);
        }
        return Err(e);
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn write_batches(path: &Path, batches: &[RecordBatch]) -> Result<(), StoreError> {
    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, schema::record_schema_ref(), Some(props))?;
    for batch in batches {
        writer.write(batch)?;
    }
    let file = writer.into_inner()?;
    file.sync_all()?;
    Ok(())
}
