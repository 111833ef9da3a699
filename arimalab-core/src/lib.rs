//! ArimaLab Core: price data acquisition with a deterministic fallback.
//!
//! - Domain types (date ranges, close series, OHLCV tables, raw source tables)
//! - Source adapters for Yahoo Finance, FRED and Alpha Vantage
//! - Acquisition orchestrator with synthetic fallback
//! - OHLCV synthesis and cleaning
//! - Parquet snapshots and dataset fingerprints

pub mod data;
pub mod domain;
pub mod fingerprint;
