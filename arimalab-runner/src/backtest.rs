//! Bar-by-bar backtester.
//!
//! Execution model:
//! - The rule sees closes up to and including bar `i` and its decision
//!   fills at bar `i+1`'s open. No decision is taken on the last bar.
//! - An entry buys or sells as many whole units as the current equity
//!   covers including commission. Commission is charged on entry and exit
//!   notional.
//! - With `exclusive_orders`, an entry against an open position closes it
//!   first and then opens the new one. Without it, the opposing entry only
//!   closes the open position.
//! - Equity is marked at every close. A position still open after the last
//!   bar is closed at the last close.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use arimalab_core::domain::{OhlcvRow, OhlcvTable};

use crate::metrics::BacktestStats;
use crate::strategy::{Decision, DecisionRule, PositionSide};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BacktestError {
    #[error("no bars to backtest")]
    EmptyData,

    #[error("starting cash must be positive and finite, got {0}")]
    InvalidCash(f64),

    #[error("commission must be in [0, 1), got {0}")]
    InvalidCommission(f64),
}

/// A closed round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    /// Positive for long, negative for short.
    pub size: i64,
    pub exit_date: NaiveDate,
    pub exit_price: f64,
    /// Net of entry and exit commission.
    pub pnl: f64,
    /// `pnl` over entry notional, in percent.
    pub return_pct: f64,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn side(&self) -> PositionSide {
        if self.size >= 0 {
            PositionSide::Long
        } else {
            PositionSide::Short
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub stats: BacktestStats,
    pub trades: Vec<Trade>,
    pub equity: Vec<EquityPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Backtester {
    pub cash: f64,
    pub commission: f64,
    pub exclusive_orders: bool,
}

impl Default for Backtester {
    fn default() -> Self {
        Self {
            cash: 10_000.0,
            commission: 0.001,
            exclusive_orders: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenPosition {
    size: i64,
    entry_price: f64,
    entry_date: NaiveDate,
    entry_commission: f64,
}

impl OpenPosition {
    fn side(&self) -> PositionSide {
        if self.size > 0 {
            PositionSide::Long
        } else {
            PositionSide::Short
        }
    }

    fn unrealized(&self, price: f64) -> f64 {
        self.size as f64 * (price - self.entry_price)
    }
}

/// Running account state for one backtest.
struct Account {
    commission: f64,
    balance: f64,
    position: Option<OpenPosition>,
    trades: Vec<Trade>,
}

impl Account {
    fn side(&self) -> PositionSide {
        self.position.map_or(PositionSide::Flat, |p| p.side())
    }

    fn equity(&self, price: f64) -> f64 {
        self.balance + self.position.map_or(0.0, |p| p.unrealized(price))
    }

    fn open(&mut self, side: PositionSide, date: NaiveDate, price: f64) {
        let units = (self.balance / (price * (1.0 + self.commission))).floor();
        if units < 1.0 {
            tracing::debug!(%date, price, balance = self.balance, "cannot afford one unit");
            return;
        }
        let units = units as i64;
        let size = if side == PositionSide::Short { -units } else { units };
        let entry_commission = units as f64 * price * self.commission;
        self.balance -= entry_commission;
        self.position = Some(OpenPosition {
            size,
            entry_price: price,
            entry_date: date,
            entry_commission,
        });
        tracing::debug!(%date, price, size, "opened position");
    }

    fn close(&mut self, date: NaiveDate, price: f64) {
        let Some(pos) = self.position.take() else {
            return;
        };
        let exit_commission = pos.size.unsigned_abs() as f64 * price * self.commission;
        let gross = pos.unrealized(price);
        self.balance += gross - exit_commission;

        let pnl = gross - pos.entry_commission - exit_commission;
        let notional = pos.size.unsigned_abs() as f64 * pos.entry_price;
        self.trades.push(Trade {
            entry_date: pos.entry_date,
            entry_price: pos.entry_price,
            size: pos.size,
            exit_date: date,
            exit_price: price,
            pnl,
            return_pct: pnl / notional * 100.0,
        });
        tracing::debug!(%date, price, pnl, "closed position");
    }
}

impl Backtester {
    fn validate(&self) -> Result<(), BacktestError> {
        if !self.cash.is_finite() || self.cash <= 0.0 {
            return Err(BacktestError::InvalidCash(self.cash));
        }
        if !(0.0..1.0).contains(&self.commission) {
            return Err(BacktestError::InvalidCommission(self.commission));
        }
        Ok(())
    }

    pub fn run(
        &self,
        table: &OhlcvTable,
        rule: &dyn DecisionRule,
    ) -> Result<BacktestResult, BacktestError> {
        self.validate()?;
        let rows = table.rows();
        let Some(last) = rows.last() else {
            return Err(BacktestError::EmptyData);
        };

        let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
        let mut account = Account {
            commission: self.commission,
            balance: self.cash,
            position: None,
            trades: Vec::new(),
        };
        let mut equity = Vec::with_capacity(rows.len());
        let mut bars_in_market = 0;
        let mut pending = Decision::Hold;

        for (i, row) in rows.iter().enumerate() {
            self.fill(&mut account, pending, row);

            equity.push(EquityPoint {
                date: row.date,
                equity: account.equity(row.close),
            });
            if account.position.is_some() {
                bars_in_market += 1;
            }

            pending = if i + 1 < rows.len() {
                rule.decide(&closes[..=i], account.side())
            } else {
                Decision::Hold
            };
        }

        if account.position.is_some() {
            account.close(last.date, last.close);
            if let Some(point) = equity.last_mut() {
                point.equity = account.balance;
            }
        }

        let curve: Vec<f64> = equity.iter().map(|p| p.equity).collect();
        let stats = BacktestStats::compute(&curve, &account.trades, &closes, bars_in_market);
        Ok(BacktestResult {
            stats,
            trades: account.trades,
            equity,
        })
    }

    fn fill(&self, account: &mut Account, decision: Decision, bar: &OhlcvRow) {
        let target = match decision {
            Decision::Hold => return,
            Decision::ClosePosition => {
                account.close(bar.date, bar.open);
                return;
            }
            Decision::EnterLong => PositionSide::Long,
            Decision::EnterShort => PositionSide::Short,
        };

        let current = account.side();
        if current == target {
            return;
        }
        if !current.is_flat() {
            account.close(bar.date, bar.open);
            if !self.exclusive_orders {
                return;
            }
        }
        account.open(target, bar.date, bar.open);
    }
}
