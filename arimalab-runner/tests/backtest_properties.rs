//! Property tests for backtest accounting.
//!
//! Uses proptest to verify, for arbitrary bars and decision sequences:
//! 1. Final equity equals starting cash plus the net P&L of every trade
//! 2. Trades never overlap and never exit before they enter
//! 3. The equity curve has one point per bar

use arimalab_core::domain::{OhlcvRow, OhlcvTable};
use arimalab_runner::{Backtester, Decision, DecisionRule, PositionSide};
use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

struct Script(Vec<Decision>);

impl DecisionRule for Script {
    fn decide(&self, closes: &[f64], _position: PositionSide) -> Decision {
        self.0.get(closes.len() - 1).copied().unwrap_or(Decision::Hold)
    }
}

fn arb_decision() -> impl Strategy<Value = Decision> {
    prop_oneof![
        Just(Decision::EnterLong),
        Just(Decision::EnterShort),
        Just(Decision::ClosePosition),
        Just(Decision::Hold),
    ]
}

fn arb_case() -> impl Strategy<Value = (Vec<(f64, f64)>, Vec<Decision>)> {
    (2usize..60).prop_flat_map(|n| {
        (
            prop::collection::vec((50.0..150.0_f64, 50.0..150.0_f64), n),
            prop::collection::vec(arb_decision(), n),
        )
    })
}

fn table(prices: &[(f64, f64)]) -> OhlcvTable {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let rows = prices
        .iter()
        .enumerate()
        .map(|(i, &(open, close))| OhlcvRow {
            date: start + Duration::days(i as i64),
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: 1,
        })
        .collect();
    OhlcvTable::new(rows).unwrap()
}

proptest! {
    #[test]
    fn equity_reconciles_with_trades(
        (prices, decisions) in arb_case(),
        commission in 0.0..0.01_f64,
        exclusive_orders in any::<bool>(),
    ) {
        let bt = Backtester { cash: 10_000.0, commission, exclusive_orders };
        let result = bt.run(&table(&prices), &Script(decisions)).unwrap();

        let pnl: f64 = result.trades.iter().map(|t| t.pnl).sum();
        prop_assert!((result.stats.final_equity - (10_000.0 + pnl)).abs() < 1e-6);
        prop_assert_eq!(result.equity.len(), prices.len());
        prop_assert_eq!(result.stats.trade_count, result.trades.len());
    }

    #[test]
    fn trades_are_sequential(
        (prices, decisions) in arb_case(),
    ) {
        let result = Backtester::default().run(&table(&prices), &Script(decisions)).unwrap();
        for t in &result.trades {
            prop_assert!(t.exit_date >= t.entry_date);
            prop_assert!(t.size != 0);
        }
        for pair in result.trades.windows(2) {
            prop_assert!(pair[1].entry_date >= pair[0].exit_date);
        }
    }
}
