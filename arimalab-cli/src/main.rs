//! ArimaLab CLI: fetch, forecast and backtest commands.
//!
//! Commands:
//! - `fetch`: acquire prices through the source chain, optionally saving a Parquet snapshot
//! - `forecast`: fit the AR model and write a short-horizon forecast
//! - `backtest`: run the confidence-band strategy and write reports
//! - `config`: print the default TOML configuration

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use arimalab_core::data::snapshot::save_acquired;
use arimalab_core::data::{Acquired, Dataset, Orchestrator, OutputShape, SourceSettings};
use arimalab_core::domain::{parse_date, DateRange};
use arimalab_core::fingerprint::{series_fingerprint, table_fingerprint};
use arimalab_runner::{run_backtest, run_forecast, PipelineConfig, StageOutcome};

#[derive(Parser)]
#[command(
    name = "arimalab",
    about = "ArimaLab CLI: AR forecasts and confidence-band backtests"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire price data (Yahoo Finance, FRED, Alpha Vantage, then synthetic).
    Fetch {
        /// Path to a TOML config file; only its `[sources]` section is used.
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "SPY")]
        symbol: String,

        /// Start date (YYYY-MM-DD). Defaults to 2020-01-01.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to yesterday.
        #[arg(long)]
        end: Option<String>,

        /// Fetch closes only instead of OHLCV bars.
        #[arg(long, default_value_t = false)]
        close_only: bool,

        /// Seed for synthetic data.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Save the OHLCV bars as a Parquet snapshot.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Offline mode: skip every network source.
        #[arg(long, default_value_t = false)]
        offline: bool,
    },
    /// Fit the model and forecast the next few days.
    Forecast {
        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        symbol: Option<String>,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to yesterday.
        #[arg(long)]
        end: Option<String>,

        /// Forecast steps.
        #[arg(long)]
        horizon: Option<usize>,

        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Offline mode: skip every network source.
        #[arg(long, default_value_t = false)]
        offline: bool,
    },
    /// Backtest the confidence-band strategy.
    Backtest {
        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        symbol: Option<String>,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        end: Option<String>,

        /// Run on a Parquet snapshot instead of fetching.
        #[arg(long)]
        snapshot: Option<PathBuf>,

        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Offline mode: skip every network source.
        #[arg(long, default_value_t = false)]
        offline: bool,
    },
    /// Print the default configuration as TOML.
    Config,
}

fn main() -> Result<()> {
    load_dotenv(None);
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            config,
            symbol,
            start,
            end,
            close_only,
            seed,
            out,
            offline,
        } => {
            let config = load_config(config.as_deref())?;
            let request = FetchRequest {
                symbol,
                start,
                end,
                close_only,
                seed,
                out,
                offline,
            };
            run_fetch(&config.sources, request)
        }
        Commands::Forecast {
            config,
            symbol,
            start,
            end,
            horizon,
            output_dir,
            offline,
        } => {
            let mut config = load_config(config.as_deref())?;
            apply_common(&mut config, symbol, output_dir);
            if let Some(start) = start {
                config.data.forecast_start = parse_date(&start)?;
            }
            if let Some(end) = end {
                config.data.forecast_end = Some(parse_date(&end)?);
            }
            if let Some(horizon) = horizon {
                config.forecast.horizon = horizon;
            }
            config.validate()?;

            let orchestrator = orchestrator(&config, offline)?;
            let now = chrono::Local::now().naive_local();
            finish(run_forecast(&config, &orchestrator, now)?)
        }
        Commands::Backtest {
            config,
            symbol,
            start,
            end,
            snapshot,
            output_dir,
            offline,
        } => {
            let mut config = load_config(config.as_deref())?;
            apply_common(&mut config, symbol, output_dir);
            if let Some(start) = start {
                config.data.backtest_start = parse_date(&start)?;
            }
            if let Some(end) = end {
                config.data.backtest_end = parse_date(&end)?;
            }
            config.validate()?;

            let orchestrator = orchestrator(&config, offline)?;
            let now = chrono::Local::now().naive_local();
            finish(run_backtest(
                &config,
                &orchestrator,
                snapshot.as_deref(),
                now,
            )?)
        }
        Commands::Config => {
            print!("{}", PipelineConfig::default().to_toml()?);
            Ok(())
        }
    }
}

/// Load `path`, or a `.env` in the working directory or one of its parents.
/// Variables already set in the environment win. Returns the file loaded.
fn load_dotenv(path: Option<&Path>) -> Option<PathBuf> {
    match path {
        Some(path) => dotenvy::from_path(path).ok().map(|()| path.to_path_buf()),
        None => dotenvy::dotenv().ok(),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn apply_common(
    config: &mut PipelineConfig,
    symbol: Option<String>,
    output_dir: Option<PathBuf>,
) {
    if let Some(symbol) = symbol {
        config.data.symbol = symbol;
    }
    if let Some(dir) = output_dir {
        config.output.dir = dir;
    }
}

fn orchestrator(config: &PipelineConfig, offline: bool) -> Result<Orchestrator> {
    if offline {
        return Ok(Orchestrator::new(Vec::new(), config.data.seed));
    }
    Orchestrator::standard(&config.sources, config.data.seed)
        .context("failed to initialise price sources")
}

/// Print a stage result; a failed stage exits with status 1.
fn finish(outcome: StageOutcome) -> Result<()> {
    match outcome {
        StageOutcome::Completed(report) => {
            println!("{}", report.summary);
            for path in &report.artifacts {
                println!("Saved: {}", path.display());
            }
            Ok(())
        }
        StageOutcome::Failed(reason) => {
            eprintln!("Error: {reason}");
            std::process::exit(1);
        }
    }
}

struct FetchRequest {
    symbol: String,
    start: Option<String>,
    end: Option<String>,
    close_only: bool,
    seed: u64,
    out: Option<PathBuf>,
    offline: bool,
}

fn run_fetch(sources: &SourceSettings, request: FetchRequest) -> Result<()> {
    let FetchRequest {
        symbol,
        start,
        end,
        close_only,
        seed,
        out,
        offline,
    } = request;
    let symbol = symbol.as_str();
    if close_only && out.is_some() {
        bail!("--out saves OHLCV snapshots and cannot be combined with --close-only");
    }
    let start_date = match start {
        Some(s) => parse_date(&s)?,
        None => NaiveDate::from_ymd_opt(2020, 1, 1).context("invalid default start")?,
    };
    let end_date = match end {
        Some(s) => parse_date(&s)?,
        None => chrono::Local::now().date_naive() - chrono::Duration::days(1),
    };
    let range = DateRange::new(start_date, end_date)?;

    let orchestrator = if offline {
        Orchestrator::new(Vec::new(), seed)
    } else {
        Orchestrator::standard(sources, seed)
            .context("failed to initialise price sources")?
    };
    let shape = if close_only {
        OutputShape::CloseOnly
    } else {
        OutputShape::Ohlcv
    };
    let acquired = orchestrator.acquire(symbol, range, shape)?;

    print_fetch_summary(symbol, &acquired);

    if let (Some(path), Dataset::Ohlcv(table)) = (out, &acquired.data) {
        let snapshot = Acquired {
            data: table.clone(),
            source: acquired.source,
            failures: acquired.failures.clone(),
        };
        let meta = save_acquired(&path, symbol, &snapshot)?;
        println!("Snapshot saved to: {} ({} rows)", path.display(), meta.rows);
    }
    Ok(())
}

fn print_fetch_summary(symbol: &str, acquired: &Acquired<Dataset>) {
    let closes = acquired.data.close_series();
    let fingerprint = match &acquired.data {
        Dataset::Close(series) => series_fingerprint(series),
        Dataset::Ohlcv(table) => table_fingerprint(table),
    };

    println!("{symbol}: {} rows from {}", acquired.data.len(), acquired.source);
    if let (Some(first), Some(last)) = (closes.first(), closes.last()) {
        println!("Period: {} to {}", first.date, last.date);
    }
    if let Some((min, max)) = closes.min_max() {
        println!("Price range: ${min:.2} - ${max:.2}");
    }
    println!("Fingerprint: {}", fingerprint.short());
    for failure in &acquired.failures {
        println!("Skipped {}: {}", failure.provider, failure.reason);
    }
    if acquired.is_synthetic() {
        eprintln!("Warning: all sources failed; data is SYNTHETIC");
    }
}
