//! Dataset fingerprints.
//!
//! A BLAKE3 hash over every value of a series or table, so two reports can
//! be checked for having run on byte-identical data.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{OhlcvTable, PriceSeries};

/// Hex-encoded BLAKE3 digest of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetHash(pub String);

impl DatasetHash {
    /// First 12 hex characters, for log lines and report headers.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for DatasetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn series_fingerprint(series: &PriceSeries) -> DatasetHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(series.name().as_bytes());
    for p in series.points() {
        hasher.update(p.date.to_string().as_bytes());
        hasher.update(&p.close.to_le_bytes());
    }
    DatasetHash(hasher.finalize().to_hex().to_string())
}

pub fn table_fingerprint(table: &OhlcvTable) -> DatasetHash {
    let mut hasher = blake3::Hasher::new();
    for row in table.rows() {
        hasher.update(row.date.to_string().as_bytes());
        hasher.update(&row.open.to_le_bytes());
        hasher.update(&row.high.to_le_bytes());
        hasher.update(&row.low.to_le_bytes());
        hasher.update(&row.close.to_le_bytes());
        hasher.update(&row.volume.to_le_bytes());
    }
    DatasetHash(hasher.finalize().to_hex().to_string())
}
