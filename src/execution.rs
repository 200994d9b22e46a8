//! Intrabar execution models
//!
//! Given one candle and either a pending entry signal or an open
//! position, an execution model decides whether and at what price a fill
//! happens on that bar. Models return fill events and mutate nothing;
//! the backtest loop owns position lifecycle transitions.
//!
//! Two models share the same contract so callers can swap them without
//! other code changes: the close-only legacy baseline and the intrabar
//! model with gap handling.

use serde::{Deserialize, Serialize};

use crate::{BreakoutSignal, Candle, ExitReason, Position};

/// Exit fill produced by an execution model for one bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitFill {
    pub price: f64,
    pub reason: ExitReason,
}

/// Execution model selector for configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Simple,
    Intrabar,
}

impl ExecutionMode {
    pub fn build(self) -> Box<dyn ExecutionModel> {
        match self {
            ExecutionMode::Simple => Box::new(SimpleExecution),
            ExecutionMode::Intrabar => Box::new(IntrabarExecution),
        }
    }
}

/// Per-bar fill contract shared by all execution models.
///
/// A bar carries either a pending signal or an open position, never
/// both; an entry filled on bar t has its exits evaluated from bar t+1.
pub trait ExecutionModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Entry fill price for a pending signal on this bar, if any.
    fn check_entry(&self, signal: &BreakoutSignal, candle: &Candle) -> Option<f64>;

    /// Exit fill for an open position on this bar, if any.
    fn check_exit(&self, position: &Position, candle: &Candle) -> Option<ExitFill>;
}

/// Close-only execution: fills only at bar close.
///
/// Conservative legacy baseline; misses intrabar touches entirely, so a
/// stop is only honored when the bar *closes* through it.
pub struct SimpleExecution;

impl ExecutionModel for SimpleExecution {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn check_entry(&self, signal: &BreakoutSignal, candle: &Candle) -> Option<f64> {
        if candle.close >= signal.breakout_price {
            Some(candle.close)
        } else {
            None
        }
    }

    fn check_exit(&self, position: &Position, candle: &Candle) -> Option<ExitFill> {
        // Stop checked before target: both-crossed resolves worst-case.
        if candle.close <= position.stop_price {
            return Some(ExitFill {
                price: candle.close,
                reason: ExitReason::StopLoss,
            });
        }
        if candle.close >= position.take_profit_price {
            return Some(ExitFill {
                price: candle.close,
                reason: ExitReason::TakeProfit,
            });
        }
        None
    }
}

/// Intrabar execution with gap handling.
///
/// The true intrabar path is unknown from OHLC alone, so when both the
/// stop and the target are crossed within one bar the fill resolves as
/// a stop-loss, the worst-case-for-trader assumption.
pub struct IntrabarExecution;

impl ExecutionModel for IntrabarExecution {
    fn name(&self) -> &'static str {
        "intrabar"
    }

    fn check_entry(&self, signal: &BreakoutSignal, candle: &Candle) -> Option<f64> {
        if candle.high >= signal.breakout_price {
            // Never filled below the breakout level; a gap-up open fills
            // at the worse open price.
            Some(candle.open.max(signal.breakout_price))
        } else {
            None
        }
    }

    fn check_exit(&self, position: &Position, candle: &Candle) -> Option<ExitFill> {
        let stop_hit = candle.low <= position.stop_price;
        let target_hit = candle.high >= position.take_profit_price;

        if stop_hit && target_hit {
            return Some(ExitFill {
                price: position.stop_price,
                reason: ExitReason::StopLoss,
            });
        }

        if stop_hit {
            // Gap below the stop fills at the open, a worse price.
            let price = if candle.open < position.stop_price {
                candle.open
            } else {
                position.stop_price
            };
            return Some(ExitFill {
                price,
                reason: ExitReason::StopLoss,
            });
        }

        if target_hit {
            // Gap above the target fills at the open, a better price.
            let price = if candle.open > position.take_profit_price {
                candle.open
            } else {
                position.take_profit_price
            };
            return Some(ExitFill {
                price,
                reason: ExitReason::TakeProfit,
            });
        }

        None
    }
}
