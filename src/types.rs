//! Core data types used across the screening engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for candle construction
#[derive(Debug, Error, PartialEq)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// OHLCV candlestick data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        };
        candle.validate()?;
        Ok(candle)
    }

    /// Create a candle without validation (for trusted sources)
    pub fn new_unchecked(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Validate the candle data
    pub fn validate(&self) -> Result<(), CandleValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }
        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }
        if self.open < self.low || self.open > self.high {
            return Err(CandleValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }
        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }
        if self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }
        Ok(())
    }
}

/// Trading pair symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Symbol(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entry/stop/target levels produced at one candle close.
///
/// Long-only model: `breakout_price > stop_price` always holds for a
/// constructed signal. Consumed by the execution model on the *next*
/// candle only, then discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakoutSignal {
    pub symbol: Symbol,
    pub as_of: DateTime<Utc>,
    pub breakout_price: f64,
    pub stop_price: f64,
    pub take_profit_price: f64,
}

/// Open position state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub size: f64,
    pub stop_price: f64,
    pub take_profit_price: f64,
    pub highest_price_since_entry: f64,
}

impl Position {
    pub fn notional(&self) -> f64 {
        self.size * self.entry_price
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        (current_price - self.entry_price) * self.size
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    SignalExit,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TakeProfit => write!(f, "take_profit"),
            ExitReason::SignalExit => write!(f, "signal_exit"),
        }
    }
}

/// Completed trade record.
///
/// `entry_time` and `exit_time` are candle times, never wall-clock time;
/// holding-period and regime statistics depend on this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: Symbol,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub size: f64,
    /// Gross profit/loss before commission
    pub pnl: f64,
    /// Round-trip commission paid
    pub commission: f64,
    /// Profit/loss net of commission
    pub net_pnl: f64,
    /// Net return on entry notional, fractional (0.05 = 5%)
    pub pnl_pct: f64,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.net_pnl > 0.0
    }
}

/// Outcome of one gate evaluation
#[derive(Debug, Clone)]
pub struct PassResult {
    pub passed: bool,
    pub reason: String,
    pub metrics: std::sync::Arc<crate::metrics::BacktestMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_candle_validation() {
        let dt = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        assert!(Candle::new(dt, 100.0, 110.0, 95.0, 105.0, 1000.0).is_ok());

        let bad_range = Candle::new(dt, 100.0, 90.0, 95.0, 92.0, 1000.0);
        assert!(matches!(
            bad_range,
            Err(CandleValidationError::HighLessThanLow { .. })
        ));

        let open_outside = Candle::new(dt, 120.0, 110.0, 95.0, 105.0, 1000.0);
        assert!(matches!(
            open_outside,
            Err(CandleValidationError::OpenOutOfRange { .. })
        ));

        let negative_volume = Candle::new(dt, 100.0, 110.0, 95.0, 105.0, -1.0);
        assert!(matches!(
            negative_volume,
            Err(CandleValidationError::NegativeVolume(_))
        ));
    }

    #[test]
    fn test_position_unrealized_pnl() {
        let pos = Position {
            symbol: Symbol::new("BTCUSDT"),
            entry_time: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            entry_price: 100.0,
            size: 2.0,
            stop_price: 95.0,
            take_profit_price: 110.0,
            highest_price_since_entry: 100.0,
        };

        assert_eq!(pos.unrealized_pnl(105.0), 10.0);
        assert_eq!(pos.unrealized_pnl(95.0), -10.0);
        assert_eq!(pos.notional(), 200.0);
    }
}
