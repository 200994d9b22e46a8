//! Position sizing
//!
//! Risk a fixed fraction of current equity per trade, sized off the
//! stop distance, with a position-value cap and no leverage.
//!
//! ```text
//! size = (equity * risk_per_trade) / (entry_price - stop_price)
//! ```

use serde::{Deserialize, Serialize};

/// Sizing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Fraction of equity risked per trade (e.g., 0.02 = 2%)
    pub risk_per_trade: f64,

    /// Maximum position value as a fraction of equity
    pub max_position_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_per_trade: 0.02,
            max_position_pct: 0.95,
        }
    }
}

/// Calculate position size for an entry at `entry_price` with a stop at
/// `stop_price`, given current `equity` and available `cash`.
///
/// Returns 0 when the stop distance is degenerate or no cash remains.
pub fn position_size(config: &RiskConfig, equity: f64, cash: f64, entry_price: f64, stop_price: f64) -> f64 {
    let stop_distance = entry_price - stop_price;
    if stop_distance <= 0.0 || entry_price <= 0.0 || equity <= 0.0 || cash <= 0.0 {
        return 0.0;
    }

    let risk_amount = equity * config.risk_per_trade;
    let mut size = risk_amount / stop_distance;

    // Position-value cap
    let max_value = equity * config.max_position_pct;
    if size * entry_price > max_value {
        size = max_value / entry_price;
    }

    // No leverage: never spend more than available cash
    if size * entry_price > cash {
        size = cash / entry_price;
    }

    size.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_risk_based_sizing() {
        let config = RiskConfig {
            risk_per_trade: 0.02,
            max_position_pct: 0.95,
        };

        // Risk 2,000 over a stop distance of 5 -> 400 units
        let size = position_size(&config, 100_000.0, 100_000.0, 100.0, 95.0);
        assert_relative_eq!(size, 400.0);
    }

    #[test]
    fn test_position_value_cap() {
        let config = RiskConfig {
            risk_per_trade: 0.10,
            max_position_pct: 0.20,
        };

        // Uncapped: 10,000 / 1 = 10,000 units = 1,000,000 value.
        // Cap: 20% of equity = 20,000 value -> 200 units.
        let size = position_size(&config, 100_000.0, 100_000.0, 100.0, 99.0);
        assert_relative_eq!(size, 200.0);
    }

    #[test]
    fn test_cash_cap_and_degenerate_stop() {
        let config = RiskConfig {
            risk_per_trade: 0.50,
            max_position_pct: 1.0,
        };

        // Only 10,000 cash left at price 100 -> 100 units max
        let size = position_size(&config, 100_000.0, 10_000.0, 100.0, 99.0);
        assert_relative_eq!(size, 100.0);

        assert_eq!(position_size(&config, 100_000.0, 100_000.0, 100.0, 100.0), 0.0);
        assert_eq!(position_size(&config, 100_000.0, 100_000.0, 100.0, 105.0), 0.0);
        assert_eq!(position_size(&config, 100_000.0, 0.0, 100.0, 95.0), 0.0);
    }
}
