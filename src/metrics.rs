//! Performance metrics
//!
//! Converts a sequence of closed trades plus an equity curve into
//! return, risk, and distribution statistics. The snapshot is computed
//! once per (ticker, config) and shared read-only by both gate
//! evaluations.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::Trade;

/// Candles are 24/7 crypto bars, so annualization uses calendar days.
const PERIODS_PER_YEAR: f64 = 365.0;

/// One equity point per processed candle, monotonic in time
pub type EquityCurve = Vec<(DateTime<Utc>, f64)>;

/// Immutable backtest result snapshot.
///
/// Units: `win_rate` and `avg_loss_pct` are fractions in [0, 1];
/// `avg_win_loss_ratio` is an R-multiple; fields named `*_pct` are
/// percentages (already scaled by 100).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub total_return_pct: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub max_drawdown_pct: f64,
    pub max_consecutive_losses: usize,
    pub max_consecutive_wins: usize,
    pub trade_count: usize,
    pub avg_win_loss_ratio: f64,
    /// Mean absolute losing return, fractional and unfloored; flooring
    /// belongs to the expectancy filter
    pub avg_loss_pct: f64,
    /// Annualized standard deviation of equity-curve returns, percent.
    /// This is strategy volatility, not the asset's price volatility.
    pub volatility_pct: f64,
    pub trades: Vec<Trade>,
}

/// Compute the metrics snapshot for one backtest run.
pub fn calculate(trades: Vec<Trade>, equity_curve: &EquityCurve, initial_balance: f64) -> BacktestMetrics {
    let trade_count = trades.len();

    let final_balance = equity_curve
        .last()
        .map(|(_, balance)| *balance)
        .unwrap_or(initial_balance);
    let total_return_pct = if initial_balance > 0.0 {
        (final_balance / initial_balance - 1.0) * 100.0
    } else {
        0.0
    };

    let winners: Vec<&Trade> = trades.iter().filter(|t| t.is_win()).collect();
    let losers: Vec<&Trade> = trades.iter().filter(|t| !t.is_win()).collect();

    let win_rate = if trade_count > 0 {
        winners.len() as f64 / trade_count as f64
    } else {
        0.0
    };

    let gross_profit: f64 = winners.iter().map(|t| t.net_pnl).sum();
    let gross_loss: f64 = losers.iter().map(|t| t.net_pnl.abs()).sum();

    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if !winners.is_empty() {
        f64::INFINITY
    } else {
        0.0
    };

    let avg_win_pct = if winners.is_empty() {
        0.0
    } else {
        winners.iter().map(|t| t.pnl_pct).sum::<f64>() / winners.len() as f64
    };
    let avg_loss_pct = if losers.is_empty() {
        0.0
    } else {
        losers.iter().map(|t| t.pnl_pct.abs()).sum::<f64>() / losers.len() as f64
    };

    let avg_win_loss_ratio = if avg_loss_pct > 0.0 {
        avg_win_pct / avg_loss_pct
    } else if !winners.is_empty() {
        f64::INFINITY
    } else {
        0.0
    };

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .filter(|w| w[0].1 > 0.0)
        .map(|w| (w[1].1 - w[0].1) / w[0].1)
        .collect();

    let (sharpe, sortino, volatility_pct) = ratio_stats(&returns);

    let max_drawdown_pct = max_drawdown(equity_curve, initial_balance) * 100.0;

    let calmar = if max_drawdown_pct > 0.0 {
        total_return_pct / max_drawdown_pct
    } else {
        0.0
    };

    let (max_consecutive_wins, max_consecutive_losses) = longest_runs(&trades);

    BacktestMetrics {
        total_return_pct,
        win_rate,
        profit_factor,
        sharpe,
        sortino,
        calmar,
        max_drawdown_pct,
        max_consecutive_losses,
        max_consecutive_wins,
        trade_count,
        avg_win_loss_ratio,
        avg_loss_pct,
        volatility_pct,
        trades,
    }
}

/// Sharpe, Sortino, and annualized volatility from per-bar returns.
fn ratio_stats(returns: &[f64]) -> (f64, f64, f64) {
    if returns.len() < 2 {
        return (0.0, 0.0, 0.0);
    }

    let mean = returns.mean();
    let std_dev = returns.std_dev();

    let sharpe = if std_dev > 0.0 {
        mean / std_dev * PERIODS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    // Downside deviation: root-mean-square of negative returns only
    let downside_sq: f64 = returns.iter().map(|r| r.min(0.0).powi(2)).sum();
    let downside_dev = (downside_sq / returns.len() as f64).sqrt();
    let sortino = if downside_dev > 0.0 {
        mean / downside_dev * PERIODS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let volatility_pct = std_dev * PERIODS_PER_YEAR.sqrt() * 100.0;

    (sharpe, sortino, volatility_pct)
}

/// Largest peak-to-trough decline of the equity curve, fractional.
fn max_drawdown(equity_curve: &EquityCurve, initial_balance: f64) -> f64 {
    let mut peak = initial_balance;
    let mut max_dd = 0.0;

    for &(_, equity) in equity_curve {
        if equity > peak {
            peak = equity;
        }
        if peak > 0.0 {
            let dd = (peak - equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }

    max_dd
}

/// Longest win run and loss run over trades in chronological order.
fn longest_runs(trades: &[Trade]) -> (usize, usize) {
    let mut max_wins = 0;
    let mut max_losses = 0;

    for (is_win, run) in &trades.iter().chunk_by(|t| t.is_win()) {
        let len = run.count();
        if is_win {
            max_wins = max_wins.max(len);
        } else {
            max_losses = max_losses.max(len);
        }
    }

    (max_wins, max_losses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExitReason, Symbol};
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn trade(i: usize, net_pnl: f64, pnl_pct: f64) -> Trade {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let entry = start + Duration::days(i as i64 * 2);
        Trade {
            symbol: Symbol::new("BTCUSDT"),
            entry_time: entry,
            entry_price: 100.0,
            exit_time: entry + Duration::days(1),
            exit_price: 100.0 + net_pnl,
            size: 1.0,
            pnl: net_pnl,
            commission: 0.0,
            net_pnl,
            pnl_pct,
            exit_reason: if net_pnl > 0.0 {
                ExitReason::TakeProfit
            } else {
                ExitReason::StopLoss
            },
        }
    }

    fn equity(points: &[f64]) -> EquityCurve {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        points
            .iter()
            .enumerate()
            .map(|(i, &b)| (start + Duration::days(i as i64), b))
            .collect()
    }

    #[test]
    fn test_profit_factor_edge_cases() {
        // Zero trades -> 0
        let m = calculate(vec![], &equity(&[1000.0, 1000.0]), 1000.0);
        assert_eq!(m.profit_factor, 0.0);
        assert_eq!(m.win_rate, 0.0);

        // Winners only -> +infinity
        let m = calculate(
            vec![trade(0, 10.0, 0.10), trade(1, 5.0, 0.05)],
            &equity(&[1000.0, 1015.0]),
            1000.0,
        );
        assert!(m.profit_factor.is_infinite());
        assert!(m.avg_win_loss_ratio.is_infinite());

        // Mixed
        let m = calculate(
            vec![trade(0, 30.0, 0.03), trade(1, -10.0, -0.01)],
            &equity(&[1000.0, 1020.0]),
            1000.0,
        );
        assert_relative_eq!(m.profit_factor, 3.0);
        assert_relative_eq!(m.win_rate, 0.5);
        assert_relative_eq!(m.avg_win_loss_ratio, 3.0);
        assert_relative_eq!(m.avg_loss_pct, 0.01);
    }

    #[test]
    fn test_avg_loss_pct_not_floored() {
        // Implausibly tiny losses are reported raw; flooring is the
        // expectancy filter's job.
        let m = calculate(
            vec![trade(0, -0.01, -0.0001)],
            &equity(&[1000.0, 999.99]),
            1000.0,
        );
        assert_relative_eq!(m.avg_loss_pct, 0.0001);
    }

    #[test]
    fn test_max_drawdown() {
        let m = calculate(vec![], &equity(&[1000.0, 1200.0, 900.0, 1100.0]), 1000.0);
        // Peak 1200 -> trough 900 = 25%
        assert_relative_eq!(m.max_drawdown_pct, 25.0);
    }

    #[test]
    fn test_total_return_and_calmar() {
        let m = calculate(vec![], &equity(&[1000.0, 1200.0, 900.0, 1100.0]), 1000.0);
        assert_relative_eq!(m.total_return_pct, 10.0);
        assert_relative_eq!(m.calmar, 10.0 / 25.0);
    }

    #[test]
    fn test_consecutive_runs() {
        let trades = vec![
            trade(0, 1.0, 0.01),
            trade(1, 1.0, 0.01),
            trade(2, -1.0, -0.01),
            trade(3, -1.0, -0.01),
            trade(4, -1.0, -0.01),
            trade(5, 1.0, 0.01),
        ];
        let m = calculate(trades, &equity(&[1000.0, 1000.0]), 1000.0);
        assert_eq!(m.max_consecutive_wins, 2);
        assert_eq!(m.max_consecutive_losses, 3);
    }

    #[test]
    fn test_volatility_from_equity_not_price() {
        // A flat equity curve has zero strategy volatility regardless of
        // what the underlying asset did.
        let m = calculate(vec![], &equity(&[1000.0, 1000.0, 1000.0, 1000.0]), 1000.0);
        assert_eq!(m.volatility_pct, 0.0);
        assert_eq!(m.sharpe, 0.0);
        assert_eq!(m.sortino, 0.0);
    }
}
