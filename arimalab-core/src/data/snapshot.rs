//! Parquet snapshots of acquired OHLCV data.
//!
//! A snapshot lets a backtest be repeated offline on exactly the bars a
//! previous run downloaded. Layout: `{name}.parquet` plus a
//! `{name}.parquet.meta.json` sidecar recording where the bars came from.
//!
//! Writes are atomic (write to `.tmp`, rename into place). Reads validate
//! the schema and re-check every OHLCV invariant.

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::acquire::Acquired;
use super::provider::DataSource;
use crate::domain::{DomainError, OhlcvRow, OhlcvTable};
use crate::fingerprint::table_fingerprint;

/// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O: {0}")]
    Io(String),

    #[error("parquet: {0}")]
    Parquet(String),

    #[error("invalid snapshot: {0}")]
    Validation(String),

    #[error("snapshot rows violate OHLCV invariants: {0}")]
    Domain(#[from] DomainError),
}

/// Sidecar describing a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub symbol: String,
    /// Source of the bars when the snapshot was taken.
    pub origin: DataSource,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rows: usize,
    pub fingerprint: String,
    pub written_at: chrono::NaiveDateTime,
}

fn meta_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".meta.json");
    PathBuf::from(name)
}

/// Write `table` to `path` as Parquet.
pub fn write_snapshot(path: &Path, table: &OhlcvTable) -> Result<(), SnapshotError> {
    if table.is_empty() {
        return Err(SnapshotError::Validation("no rows to write".into()));
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| SnapshotError::Io(format!("create dir: {e}")))?;
    }

    let mut df = table_to_dataframe(table)?;
    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path)
        .map_err(|e| SnapshotError::Io(format!("create {}: {e}", tmp_path.display())))?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .map_err(|e| SnapshotError::Parquet(format!("write: {e}")))?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        SnapshotError::Io(format!("atomic rename failed: {e}"))
    })
}

/// Write an acquisition result together with its sidecar.
pub fn save_acquired(
    path: &Path,
    symbol: &str,
    acquired: &Acquired<OhlcvTable>,
) -> Result<SnapshotMeta, SnapshotError> {
    write_snapshot(path, &acquired.data)?;

    let (Some(first), Some(last)) = (acquired.data.first(), acquired.data.last()) else {
        return Err(SnapshotError::Validation("no rows to write".into()));
    };
    let meta = SnapshotMeta {
        symbol: symbol.to_string(),
        origin: acquired.source,
        start_date: first.date,
        end_date: last.date,
        rows: acquired.data.len(),
        fingerprint: table_fingerprint(&acquired.data).0,
        written_at: chrono::Local::now().naive_local(),
    };
    let json = serde_json::to_string_pretty(&meta)
        .map_err(|e| SnapshotError::Io(format!("meta serialization: {e}")))?;
    fs::write(meta_path(path), json).map_err(|e| SnapshotError::Io(format!("meta write: {e}")))?;

    tracing::info!(
        path = %path.display(),
        rows = meta.rows,
        origin = %meta.origin,
        "wrote snapshot"
    );
    Ok(meta)
}

/// Read the sidecar for a snapshot, if there is one.
pub fn read_meta(path: &Path) -> Option<SnapshotMeta> {
    let content = fs::read_to_string(meta_path(path)).ok()?;
    serde_json::from_str(&content).ok()
}

/// Read and validate a Parquet snapshot.
pub fn read_snapshot(path: &Path) -> Result<OhlcvTable, SnapshotError> {
    let file = fs::File::open(path)
        .map_err(|e| SnapshotError::Io(format!("open {}: {e}", path.display())))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| SnapshotError::Parquet(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(SnapshotError::Validation("empty snapshot".into()));
    }
    for name in COLUMNS {
        if df.column(name).is_err() {
            return Err(SnapshotError::Validation(format!("missing column '{name}'")));
        }
    }
    dataframe_to_table(&df)
}

/// Read a snapshot as an acquisition result. Bars that were synthetic when
/// saved stay tagged synthetic.
pub fn load_snapshot(path: &Path) -> Result<Acquired<OhlcvTable>, SnapshotError> {
    let table = read_snapshot(path)?;
    let source = match read_meta(path) {
        Some(meta) if meta.origin.is_synthetic() => DataSource::Synthetic,
        _ => DataSource::Snapshot,
    };
    Ok(Acquired {
        data: table,
        source,
        failures: Vec::new(),
    })
}

fn table_to_dataframe(table: &OhlcvTable) -> Result<DataFrame, SnapshotError> {
    let rows = table.rows();
    let dates: Vec<i32> = rows
        .iter()
        .map(|r| r.date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
        .collect();
    let opens: Vec<f64> = rows.iter().map(|r| r.open).collect();
    let highs: Vec<f64> = rows.iter().map(|r| r.high).collect();
    let lows: Vec<f64> = rows.iter().map(|r| r.low).collect();
    let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
    let volumes: Vec<u64> = rows.iter().map(|r| r.volume).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| SnapshotError::Parquet(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| SnapshotError::Parquet(format!("dataframe creation: {e}")))
}

fn dataframe_to_table(df: &DataFrame) -> Result<OhlcvTable, SnapshotError> {
    let col = |name: &str| {
        df.column(name)
            .map_err(|e| SnapshotError::Parquet(format!("column {name}: {e}")))
    };
    let type_err =
        |name: &str, e: PolarsError| SnapshotError::Parquet(format!("{name} column type: {e}"));

    let date_col = col("date")?;
    let open_col = col("open")?;
    let high_col = col("high")?;
    let low_col = col("low")?;
    let close_col = col("close")?;
    let volume_col = col("volume")?;

    let date_ca = date_col.date().map_err(|e| type_err("date", e))?;
    let open_ca = open_col.f64().map_err(|e| type_err("open", e))?;
    let high_ca = high_col.f64().map_err(|e| type_err("high", e))?;
    let low_ca = low_col.f64().map_err(|e| type_err("low", e))?;
    let close_ca = close_col.f64().map_err(|e| type_err("close", e))?;
    let volume_ca = volume_col.u64().map_err(|e| type_err("volume", e))?;

    let null = |name: &str, i: usize| SnapshotError::Validation(format!("null {name} at row {i}"));

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let days = date_ca.get(i).ok_or_else(|| null("date", i))?;
        let date = NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
            .ok_or_else(|| SnapshotError::Validation(format!("date out of range at row {i}")))?;
        rows.push(OhlcvRow {
            date,
            open: open_ca.get(i).ok_or_else(|| null("open", i))?,
            high: high_ca.get(i).ok_or_else(|| null("high", i))?,
            low: low_ca.get(i).ok_or_else(|| null("low", i))?,
            close: close_ca.get(i).ok_or_else(|| null("close", i))?,
            volume: volume_ca.get(i).ok_or_else(|| null("volume", i))?,
        });
    }
    Ok(OhlcvTable::new(rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_offset_is_1970() {
        let epoch = NaiveDate::from_num_days_from_ce_opt(UNIX_EPOCH_DAYS_FROM_CE).unwrap();
        assert_eq!(epoch, NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
    }

    #[test]
    fn meta_path_appends_suffix() {
        assert_eq!(
            meta_path(Path::new("data/spy.parquet")),
            PathBuf::from("data/spy.parquet.meta.json")
        );
    }

    #[test]
    fn empty_table_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let empty = OhlcvTable::new(Vec::new()).unwrap();
        let err = write_snapshot(&dir.path().join("x.parquet"), &empty).unwrap_err();
        assert!(matches!(err, SnapshotError::Validation(_)));
    }
}
