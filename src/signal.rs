//! Volatility-breakout signal generation
//!
//! Turns a candle series into entry/stop/target levels using ATR-scaled
//! bands. In `dynamic` mode the band multiplier adapts to the current
//! volatility regime (ATR as a percentage of price); `fixed` mode is the
//! legacy open-plus-range formula.
//!
//! Stop and target are derived from the same ATR with independent
//! multipliers, never from the breakout band itself.

use serde::{Deserialize, Serialize};

use crate::indicators;
use crate::{BreakoutSignal, Candle, Symbol};

/// ATR%-regime boundaries for dynamic band selection
const LOW_VOL_ATR_PCT: f64 = 2.0;
const HIGH_VOL_ATR_PCT: f64 = 4.0;

/// Band multiplier selection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KMode {
    Fixed,
    Dynamic,
}

/// Signal generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// ATR window (default: 14)
    pub atr_period: usize,

    /// Band multiplier in low-volatility regimes (ATR% < 2)
    pub k_low: f64,

    /// Band multiplier in mid-volatility regimes (2 <= ATR% < 4)
    pub k_mid: f64,

    /// Band multiplier in high-volatility regimes (ATR% >= 4)
    pub k_high: f64,

    /// Multiplier for fixed mode and dynamic fallback
    pub k_default: f64,

    pub mode: KMode,

    /// Stop distance in ATRs below the breakout level
    pub stop_mult: f64,

    /// Target distance in ATRs above the breakout level
    pub tp_mult: f64,

    /// Trailing-stop distance in ATRs below the highest price since
    /// entry; `None` disables trailing
    #[serde(default)]
    pub trail_atr_mult: Option<f64>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            k_low: 0.4,
            k_mid: 0.5,
            k_high: 0.7,
            k_default: 0.5,
            mode: KMode::Dynamic,
            stop_mult: 1.5,
            tp_mult: 3.0,
            trail_atr_mult: None,
        }
    }
}

/// Produces at most one long breakout signal per candle close.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    config: SignalConfig,
}

impl SignalGenerator {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Generate a signal from the series up to and including the latest
    /// bar. Fewer bars than the ATR window means no signal, not an error.
    pub fn generate(&self, symbol: &Symbol, candles: &[Candle]) -> Option<BreakoutSignal> {
        let cfg = &self.config;
        if candles.len() < cfg.atr_period.max(2) {
            return None;
        }

        let atr = indicators::latest_atr(candles, cfg.atr_period)?;
        if atr <= 0.0 {
            return None;
        }

        let last = candles.last().unwrap();
        let prev = &candles[candles.len() - 2];

        let breakout_price = match cfg.mode {
            KMode::Dynamic => match indicators::atr_percent(atr, last.close) {
                Some(atr_pct) => last.close + atr * self.dynamic_k(atr_pct),
                // ATR% undefined: fall back to the fixed formula
                None => self.fixed_breakout(last, prev),
            },
            KMode::Fixed => self.fixed_breakout(last, prev),
        };

        let stop_price = breakout_price - atr * cfg.stop_mult;
        let take_profit_price = breakout_price + atr * cfg.tp_mult;

        // Long-only invariant; a non-positive stop distance would make
        // position sizing meaningless.
        if stop_price >= breakout_price || stop_price <= 0.0 {
            return None;
        }

        Some(BreakoutSignal {
            symbol: symbol.clone(),
            as_of: last.datetime,
            breakout_price,
            stop_price,
            take_profit_price,
        })
    }

    fn dynamic_k(&self, atr_pct: f64) -> f64 {
        if atr_pct < LOW_VOL_ATR_PCT {
            self.config.k_low
        } else if atr_pct < HIGH_VOL_ATR_PCT {
            self.config.k_mid
        } else {
            self.config.k_high
        }
    }

    fn fixed_breakout(&self, last: &Candle, prev: &Candle) -> f64 {
        last.open + (prev.high - prev.low) * self.config.k_default
    }
}
