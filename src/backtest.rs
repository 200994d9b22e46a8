//! Backtesting engine
//!
//! Sequential bar-by-bar replay for one ticker: a signal produced at
//! one candle close is consumed by the execution model on the next
//! candle; exits are evaluated before anything else on a bar; every
//! timestamp written to a trade is a candle time, never wall-clock
//! time.

use chrono::{DateTime, Utc};

use crate::execution::ExecutionModel;
use crate::indicators;
use crate::metrics::{self, BacktestMetrics, EquityCurve};
use crate::risk::{self, RiskConfig};
use crate::signal::SignalGenerator;
use crate::{BreakoutSignal, Candle, ExitReason, Position, Symbol, Trade};

/// Bars of history handed to the signal generator each step. Covers the
/// ATR window with generous warmup room while keeping the scan O(n*k).
const MAX_LOOKBACK: usize = 300;

/// Backtest engine for one (ticker, config) pair
pub struct Backtester {
    signal: SignalGenerator,
    execution: Box<dyn ExecutionModel>,
    risk: RiskConfig,
    /// Per-side commission, fractional
    commission: f64,
    /// Per-side slippage, fractional, applied adversely to fills
    slippage: f64,
    initial_capital: f64,
}

#[derive(Debug, Default)]
pub struct BacktestResult {
    pub equity_curve: EquityCurve,
    pub metrics: BacktestMetrics,
}

impl Backtester {
    pub fn new(
        signal: SignalGenerator,
        execution: Box<dyn ExecutionModel>,
        risk: RiskConfig,
        commission: f64,
        slippage: f64,
        initial_capital: f64,
    ) -> Self {
        Self {
            signal,
            execution,
            risk,
            commission,
            slippage,
            initial_capital,
        }
    }

    /// Replay the candle series. A series shorter than the indicator
    /// warmup simply produces zero trades.
    pub fn run(&self, symbol: &Symbol, candles: &[Candle]) -> BacktestResult {
        let mut cash = self.initial_capital;
        let mut position: Option<Position> = None;
        let mut pending: Option<BreakoutSignal> = None;
        let mut trades: Vec<Trade> = Vec::new();
        let mut equity_curve: EquityCurve = Vec::with_capacity(candles.len());

        for i in 0..candles.len() {
            let candle = &candles[i];
            let start_idx = (i + 1).saturating_sub(MAX_LOOKBACK);
            let window = &candles[start_idx..=i];

            if let Some(pos) = position.take() {
                match self.execution.check_exit(&pos, candle) {
                    Some(fill) => {
                        let exit_price = fill.price * (1.0 - self.slippage);
                        let trade =
                            self.close_position(&pos, exit_price, candle.datetime, fill.reason);
                        cash += pos.size * exit_price - pos.size * exit_price * self.commission;

                        tracing::debug!(
                            %symbol,
                            time = %candle.datetime.format("%Y-%m-%d"),
                            price = exit_price,
                            reason = %fill.reason,
                            net_pnl = trade.net_pnl,
                            "exit filled"
                        );

                        trades.push(trade);
                    }
                    None => {
                        position = Some(self.ratchet(pos, candle, window));
                    }
                }
            } else if let Some(signal) = pending.take() {
                // A signal is valid for exactly this bar; unfilled ones
                // are discarded and regenerated at the next close.
                if let Some(fill_price) = self.execution.check_entry(&signal, candle) {
                    let entry_price = fill_price * (1.0 + self.slippage);
                    let spendable = cash / (1.0 + self.commission);
                    let size = risk::position_size(
                        &self.risk,
                        cash,
                        spendable,
                        entry_price,
                        signal.stop_price,
                    );

                    if size > 0.0 {
                        let notional = size * entry_price;
                        cash -= notional + notional * self.commission;

                        tracing::debug!(
                            %symbol,
                            time = %candle.datetime.format("%Y-%m-%d"),
                            price = entry_price,
                            size,
                            "entry filled"
                        );

                        position = Some(Position {
                            symbol: symbol.clone(),
                            entry_time: candle.datetime,
                            entry_price,
                            size,
                            stop_price: signal.stop_price,
                            take_profit_price: signal.take_profit_price,
                            highest_price_since_entry: entry_price,
                        });
                    }
                }
            }

            // A new signal is only produced when nothing is open or
            // pending at this close.
            if position.is_none() && pending.is_none() {
                pending = self.signal.generate(symbol, window);
            }

            let equity = cash
                + position
                    .as_ref()
                    .map(|p| p.size * candle.close)
                    .unwrap_or(0.0);
            equity_curve.push((candle.datetime, equity));
        }

        // Close anything still open at the final candle for bookkeeping.
        if let Some(pos) = position {
            let last = candles.last().unwrap();
            let trade =
                self.close_position(&pos, last.close, last.datetime, ExitReason::SignalExit);
            cash += pos.size * last.close - pos.size * last.close * self.commission;
            trades.push(trade);

            if let Some(point) = equity_curve.last_mut() {
                point.1 = cash;
            }
        }

        let metrics = metrics::calculate(trades, &equity_curve, self.initial_capital);

        BacktestResult {
            equity_curve,
            metrics,
        }
    }

    /// No-exit bar: track the running high and, when trailing is
    /// enabled, ratchet the stop upward. The stop never moves down.
    fn ratchet(&self, mut pos: Position, candle: &Candle, window: &[Candle]) -> Position {
        pos.highest_price_since_entry = pos.highest_price_since_entry.max(candle.high);

        if let Some(trail_mult) = self.signal.config().trail_atr_mult {
            if let Some(atr) = indicators::latest_atr(window, self.signal.config().atr_period) {
                let trailed = pos.highest_price_since_entry - atr * trail_mult;
                if trailed > pos.stop_price {
                    pos.stop_price = trailed;
                }
            }
        }

        pos
    }

    fn close_position(
        &self,
        pos: &Position,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        exit_reason: ExitReason,
    ) -> Trade {
        let pnl = (exit_price - pos.entry_price) * pos.size;
        let commission = pos.size * pos.entry_price * self.commission
            + pos.size * exit_price * self.commission;
        let net_pnl = pnl - commission;
        let pnl_pct = if pos.notional() > 0.0 {
            net_pnl / pos.notional()
        } else {
            0.0
        };

        Trade {
            symbol: pos.symbol.clone(),
            entry_time: pos.entry_time,
            entry_price: pos.entry_price,
            exit_time,
            exit_price,
            size: pos.size,
            pnl,
            commission,
            net_pnl,
            pnl_pct,
            exit_reason,
        }
    }
}
