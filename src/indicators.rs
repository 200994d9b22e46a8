//! Volatility indicators powered by the `ta` crate
//!
//! The breakout model only needs True Range and its rolling mean (ATR).
//! The smoothing here is a plain rolling mean — `ta`'s
//! `SimpleMovingAverage` over the TR series — not Wilder's recursive
//! smoothing, so a window of N bars fully determines the value.

use ta::indicators::SimpleMovingAverage;
use ta::Next;

use crate::Candle;

/// Calculate True Range per bar.
///
/// First bar has no previous close, so TR degrades to `high - low`.
pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(candles.len());

    for (i, c) in candles.iter().enumerate() {
        let value = if i == 0 {
            c.high - c.low
        } else {
            let prev_close = candles[i - 1].close;
            let hl = c.high - c.low;
            let hc = (c.high - prev_close).abs();
            let lc = (c.low - prev_close).abs();
            hl.max(hc).max(lc)
        };
        tr.push(value);
    }

    tr
}

/// Calculate ATR as the rolling mean of True Range.
///
/// Returns `None` for the warmup region (fewer than `period` bars seen).
pub fn atr(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    if candles.is_empty() || period == 0 {
        return vec![];
    }

    let mut sma = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; candles.len()],
    };

    let tr = true_range(candles);
    let mut result = Vec::with_capacity(candles.len());

    for (i, &value) in tr.iter().enumerate() {
        let sma_val = sma.next(value);
        if i + 1 >= period {
            result.push(Some(sma_val));
        } else {
            result.push(None);
        }
    }

    result
}

/// Latest ATR value for a series, if warmed up.
pub fn latest_atr(candles: &[Candle], period: usize) -> Option<f64> {
    atr(candles, period).last().copied().flatten()
}

/// ATR as a percentage of the reference close.
///
/// Returns `None` when ATR is not warmed up or the reference close is
/// non-positive.
pub fn atr_percent(atr_value: f64, reference_close: f64) -> Option<f64> {
    if reference_close > 0.0 {
        Some(atr_value / reference_close * 100.0)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn candle(i: usize, open: f64, high: f64, low: f64, close: f64) -> Candle {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Candle::new_unchecked(start + Duration::days(i as i64), open, high, low, close, 1000.0)
    }

    #[test]
    fn test_true_range_uses_prev_close() {
        let candles = vec![
            candle(0, 100.0, 105.0, 98.0, 102.0),
            // Gap up: high-low = 4, but |low - prev_close| = 8
            candle(1, 112.0, 114.0, 110.0, 111.0),
        ];

        let tr = true_range(&candles);
        assert_relative_eq!(tr[0], 7.0);
        assert_relative_eq!(tr[1], 12.0); // high - prev_close = 114 - 102
    }

    #[test]
    fn test_atr_is_rolling_mean() {
        let candles = vec![
            candle(0, 100.0, 104.0, 100.0, 102.0), // TR 4
            candle(1, 102.0, 104.0, 98.0, 100.0),  // TR 6
            candle(2, 100.0, 102.0, 98.0, 101.0),  // TR 4
            candle(3, 101.0, 109.0, 101.0, 105.0), // TR 8
        ];

        let values = atr(&candles, 3);
        assert_eq!(values.len(), 4);
        assert!(values[0].is_none());
        assert!(values[1].is_none());
        assert_relative_eq!(values[2].unwrap(), (4.0 + 6.0 + 4.0) / 3.0);
        assert_relative_eq!(values[3].unwrap(), (6.0 + 4.0 + 8.0) / 3.0);
    }

    #[test]
    fn test_atr_warmup_and_empty() {
        assert!(atr(&[], 14).is_empty());

        let candles = vec![candle(0, 100.0, 104.0, 100.0, 102.0)];
        assert_eq!(atr(&candles, 14), vec![None]);
        assert!(latest_atr(&candles, 14).is_none());
    }

    #[test]
    fn test_atr_percent() {
        assert_relative_eq!(atr_percent(3.0, 150.0).unwrap(), 2.0);
        assert!(atr_percent(3.0, 0.0).is_none());
    }
}
