//! Price data acquisition: source adapters, synthetic fallback, OHLCV
//! normalization and Parquet snapshots.

pub mod acquire;
pub mod alphavantage;
pub mod circuit_breaker;
pub mod fred;
pub mod provider;
pub mod settings;
pub mod snapshot;
pub mod synthesize;
pub mod synthetic;
pub mod yahoo;

pub use acquire::{AcquireError, Acquired, Dataset, Orchestrator, OutputShape, SourceFailure};
pub use provider::{DataSource, FetchError, PriceSource};
pub use settings::SourceSettings;
pub use snapshot::SnapshotError;
pub use synthesize::SynthError;
