//! Performance metrics: pure functions that compute backtest statistics.
//!
//! Every metric is a pure function: equity curve and/or trade list in, scalar out.

use serde::{Deserialize, Serialize};

use crate::backtest::Trade;

const TRADING_DAYS: f64 = 252.0;

/// Summary statistics for one backtest run. Percentages are in percent
/// (12.5 means 12.5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestStats {
    pub return_pct: f64,
    pub buy_and_hold_pct: f64,
    pub sharpe: f64,
    pub volatility_ann_pct: f64,
    /// Negative or zero.
    pub max_drawdown_pct: f64,
    pub trade_count: usize,
    pub win_rate_pct: Option<f64>,
    pub best_trade_pct: Option<f64>,
    pub worst_trade_pct: Option<f64>,
    /// Share of bars with an open position.
    pub exposure_pct: f64,
    pub final_equity: f64,
}

impl BacktestStats {
    /// `closes` is the traded close series, used for buy-and-hold.
    /// `bars_in_market` counts bars that ended with a position open.
    pub fn compute(
        equity_curve: &[f64],
        trades: &[Trade],
        closes: &[f64],
        bars_in_market: usize,
    ) -> Self {
        let returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();
        let exposure_pct = if equity_curve.is_empty() {
            0.0
        } else {
            bars_in_market as f64 / equity_curve.len() as f64 * 100.0
        };
        Self {
            return_pct: total_return(equity_curve) * 100.0,
            buy_and_hold_pct: total_return(closes) * 100.0,
            sharpe: sharpe_ratio(equity_curve, 0.0),
            volatility_ann_pct: annualized_volatility(equity_curve) * 100.0,
            max_drawdown_pct: max_drawdown(equity_curve) * 100.0,
            trade_count: trades.len(),
            win_rate_pct: win_rate(trades).map(|w| w * 100.0),
            best_trade_pct: returns.iter().copied().reduce(f64::max),
            worst_trade_pct: returns.iter().copied().reduce(f64::min),
            exposure_pct,
            final_equity: equity_curve.last().copied().unwrap_or(0.0),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    let (Some(&initial), Some(&final_eq)) = (equity_curve.first(), equity_curve.last()) else {
        return 0.0;
    };
    if equity_curve.len() < 2 || initial <= 0.0 {
        return 0.0;
    }
    (final_eq - initial) / initial
}

/// Annualized Sharpe ratio from daily returns.
///
/// Sharpe = mean(daily returns - rf) / std(daily returns) * sqrt(252).
/// Returns 0.0 if variance is zero or fewer than 2 bars.
pub fn sharpe_ratio(equity_curve: &[f64], risk_free_rate: f64) -> f64 {
    let returns = daily_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let daily_rf = risk_free_rate / TRADING_DAYS;
    let excess: Vec<f64> = returns.iter().map(|r| r - daily_rf).collect();
    let std = std_dev(&excess);
    if std < 1e-15 {
        return 0.0;
    }
    (mean_f64(&excess) / std) * TRADING_DAYS.sqrt()
}

/// Standard deviation of daily returns scaled by sqrt(252), as a fraction.
pub fn annualized_volatility(equity_curve: &[f64]) -> f64 {
    std_dev(&daily_returns(equity_curve)) * TRADING_DAYS.sqrt()
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
///
/// Returns 0.0 if equity is constant or monotonically increasing.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;

    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

/// Fraction of trades with positive net P&L. `None` without trades.
pub fn win_rate(trades: &[Trade]) -> Option<f64> {
    if trades.is_empty() {
        return None;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    Some(winners as f64 / trades.len() as f64)
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Compute daily returns from an equity curve.
pub fn daily_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_trade(pnl: f64, return_pct: f64) -> Trade {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        Trade {
            entry_date: date,
            entry_price: 100.0,
            size: 10,
            exit_date: date,
            exit_price: 100.0 + pnl / 10.0,
            pnl,
            return_pct,
        }
    }

    // ── Total return ──

    #[test]
    fn total_return_positive() {
        let eq = vec![10_000.0, 10_050.0, 10_100.0, 11_000.0];
        assert!((total_return(&eq) - 0.1).abs() < 1e-10);
    }

    #[test]
    fn total_return_negative() {
        let eq = vec![10_000.0, 9_500.0, 9_000.0];
        assert!((total_return(&eq) - (-0.1)).abs() < 1e-10);
    }

    #[test]
    fn total_return_single_bar() {
        assert_eq!(total_return(&[10_000.0]), 0.0);
    }

    #[test]
    fn total_return_empty() {
        assert_eq!(total_return(&[]), 0.0);
    }

    // ── Sharpe / volatility ──

    #[test]
    fn sharpe_constant_equity_is_zero() {
        let eq = vec![10_000.0; 100];
        assert_eq!(sharpe_ratio(&eq, 0.0), 0.0);
        assert_eq!(annualized_volatility(&eq), 0.0);
    }

    #[test]
    fn sharpe_known_returns() {
        let mut eq = vec![10_000.0];
        for i in 1..253 {
            let r = if i % 2 == 0 { 1.002 } else { 1.0005 };
            eq.push(eq[i - 1] * r);
        }
        let s = sharpe_ratio(&eq, 0.0);
        assert!(s > 5.0, "consistently positive returns, got {s}");
    }

    #[test]
    fn volatility_of_alternating_returns() {
        // +1%, -1% alternating: sample std of returns ≈ 0.01.
        let mut eq = vec![10_000.0];
        for i in 1..101 {
            let r = if i % 2 == 0 { 0.99 } else { 1.01 };
            eq.push(eq[i - 1] * r);
        }
        let vol = annualized_volatility(&eq);
        assert!((vol - 0.01 * 252f64.sqrt()).abs() < 0.002, "got {vol}");
    }

    // ── Max drawdown ──

    #[test]
    fn max_drawdown_known_curve() {
        let eq = vec![100.0, 120.0, 90.0, 110.0, 130.0, 117.0];
        assert!((max_drawdown(&eq) - (-0.25)).abs() < 1e-10);
    }

    #[test]
    fn max_drawdown_monotonic_is_zero() {
        assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    // ── Trades ──

    #[test]
    fn win_rate_counts_positive_pnl() {
        let trades = vec![
            make_trade(50.0, 5.0),
            make_trade(-20.0, -2.0),
            make_trade(10.0, 1.0),
            make_trade(0.0, 0.0),
        ];
        assert_eq!(win_rate(&trades), Some(0.5));
        assert_eq!(win_rate(&[]), None);
    }

    #[test]
    fn stats_from_known_inputs() {
        let eq = vec![10_000.0, 10_200.0, 9_900.0, 10_500.0];
        let trades = vec![make_trade(300.0, 3.0), make_trade(-100.0, -1.0)];
        let closes = vec![100.0, 101.0, 99.0, 110.0];

        let stats = BacktestStats::compute(&eq, &trades, &closes, 2);

        assert!((stats.return_pct - 5.0).abs() < 1e-9);
        assert!((stats.buy_and_hold_pct - 10.0).abs() < 1e-9);
        assert_eq!(stats.trade_count, 2);
        assert_eq!(stats.win_rate_pct, Some(50.0));
        assert_eq!(stats.best_trade_pct, Some(3.0));
        assert_eq!(stats.worst_trade_pct, Some(-1.0));
        assert!((stats.exposure_pct - 50.0).abs() < 1e-9);
        assert_eq!(stats.final_equity, 10_500.0);
        assert!(stats.max_drawdown_pct < 0.0);
    }

    #[test]
    fn stats_without_trades_leave_trade_fields_empty() {
        let stats = BacktestStats::compute(&[10_000.0; 5], &[], &[1.0; 5], 0);
        assert_eq!(stats.trade_count, 0);
        assert_eq!(stats.win_rate_pct, None);
        assert_eq!(stats.best_trade_pct, None);
        assert_eq!(stats.return_pct, 0.0);
        assert_eq!(stats.exposure_pct, 0.0);
    }
}
