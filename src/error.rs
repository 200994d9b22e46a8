//! Error taxonomy for the screening engine
//!
//! Computation errors carry enough context (which filter, which
//! parameter, actual vs expected) to log and alert. They are never
//! downgraded to a default pass/fail; the trading gate's fail-closed
//! handling of filter errors is the one documented fallback.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Fewer candles than an indicator window requires. Non-fatal where
    /// the contract is Option-shaped (a withheld signal), fatal where a
    /// caller needs a series that does not exist.
    #[error("insufficient data for {context}: have {have} candles, need {need}")]
    InsufficientData {
        context: &'static str,
        have: usize,
        need: usize,
    },

    /// Out-of-range input to a filter or guard. Fatal to that
    /// evaluation call; never silently coerced.
    #[error("invalid parameter {name}={value} for {filter}: expected {constraint}")]
    InvalidParameter {
        filter: &'static str,
        name: &'static str,
        value: f64,
        constraint: &'static str,
    },

    /// A cache entry recorded under one config hash was read under
    /// another. Treated as a miss by the evaluator, never a stale hit.
    #[error("cache entry for {symbol} written under config {found}, read under {expected}")]
    CacheMisuse {
        symbol: String,
        expected: String,
        found: String,
    },
}
