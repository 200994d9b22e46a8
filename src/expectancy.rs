//! Expectancy viability filter
//!
//! Rejects any (win rate, win/loss ratio) combination whose
//! cost-adjusted expected value is non-positive, expressed in
//! R-multiples of the average loss size:
//!
//! ```text
//! cost_R  = cost_pct / max(avg_loss_pct, FLOOR)
//! gross_R = win_rate * avg_win_loss_ratio - (1 - win_rate)
//! net_R   = gross_R - cost_R          pass iff net_R >= margin_R
//! ```
//!
//! Every input is a mandatory argument. In particular `cost_pct` is
//! externally derived and has no default anywhere in the call chain; a
//! silently-defaulted cost invalidates the guarantee the moment real
//! cost assumptions change.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::EngineError;

/// Lower bound applied to `avg_loss_pct` before dividing.
///
/// Prevents `cost_R` from blowing up on implausibly tiny losses.
/// Frequent flooring signals a data problem, so applications are
/// counted and logged.
pub const AVG_LOSS_FLOOR: f64 = 0.002;

static FLOOR_APPLICATIONS: AtomicU64 = AtomicU64::new(0);

/// How many times the average-loss floor has been applied in this
/// process. Exposed for telemetry.
pub fn floor_application_count() -> u64 {
    FLOOR_APPLICATIONS.load(Ordering::Relaxed)
}

/// Inputs to one expectancy evaluation. All fields required.
#[derive(Debug, Clone, Copy)]
pub struct ExpectancyInputs {
    /// Fraction of winning trades, strictly inside (0, 1)
    pub win_rate: f64,
    /// Average win divided by average loss (R), finite and > 0
    pub avg_win_loss_ratio: f64,
    /// Mean absolute losing return, fractional, inside (0, 1)
    pub avg_loss_pct: f64,
    /// Round-trip commission + slippage, fractional, inside [0, 1)
    pub cost_pct: f64,
    /// Safety buffer in R the net expectancy must clear, >= 0
    pub margin_r: f64,
}

/// Breakdown of one expectancy evaluation
#[derive(Debug, Clone, Copy)]
pub struct ExpectancyReport {
    pub gross_expectancy_r: f64,
    pub cost_r: f64,
    pub net_expectancy_r: f64,
    pub floored_avg_loss_pct: f64,
    pub floor_applied: bool,
    pub margin_r: f64,
    pub passed: bool,
}

/// Evaluate the filter. Out-of-range inputs are errors, never coerced.
pub fn evaluate(inputs: ExpectancyInputs) -> Result<ExpectancyReport, EngineError> {
    validate_open_unit("win_rate", inputs.win_rate)?;
    if !(inputs.avg_win_loss_ratio > 0.0) || !inputs.avg_win_loss_ratio.is_finite() {
        return Err(invalid("avg_win_loss_ratio", inputs.avg_win_loss_ratio, "finite and > 0"));
    }
    validate_open_unit("avg_loss_pct", inputs.avg_loss_pct)?;
    validate_cost_and_margin(inputs.cost_pct, inputs.margin_r)?;

    let (cost_r, floored_avg_loss_pct, floor_applied) =
        cost_r(inputs.avg_loss_pct, inputs.cost_pct);

    let gross_expectancy_r =
        inputs.win_rate * inputs.avg_win_loss_ratio - (1.0 - inputs.win_rate);
    let net_expectancy_r = gross_expectancy_r - cost_r;

    Ok(ExpectancyReport {
        gross_expectancy_r,
        cost_r,
        net_expectancy_r,
        floored_avg_loss_pct,
        floor_applied,
        margin_r: inputs.margin_r,
        passed: net_expectancy_r >= inputs.margin_r,
    })
}

/// Minimum win/loss ratio a strategy needs at `win_rate` to clear the
/// filter. Derivation is shared with [`evaluate`] through the same
/// `cost_R` computation, so the two can never diverge.
pub fn min_win_loss_ratio(
    win_rate: f64,
    avg_loss_pct: f64,
    cost_pct: f64,
    margin_r: f64,
) -> Result<f64, EngineError> {
    validate_open_unit("win_rate", win_rate)?;
    validate_open_unit("avg_loss_pct", avg_loss_pct)?;
    validate_cost_and_margin(cost_pct, margin_r)?;

    let (cost_r, _, _) = cost_r(avg_loss_pct, cost_pct);
    Ok(((1.0 - win_rate) + cost_r + margin_r) / win_rate)
}

/// Single source of truth for the cost-in-R computation.
///
/// Returns `(cost_r, floored_avg_loss_pct, floor_applied)`.
fn cost_r(avg_loss_pct: f64, cost_pct: f64) -> (f64, f64, bool) {
    let floor_applied = avg_loss_pct < AVG_LOSS_FLOOR;
    let floored = avg_loss_pct.max(AVG_LOSS_FLOOR);

    if floor_applied {
        let total = FLOOR_APPLICATIONS.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(
            avg_loss_pct,
            floor = AVG_LOSS_FLOOR,
            total_applications = total,
            "average loss below floor; check input data quality"
        );
    }

    (cost_pct / floored, floored, floor_applied)
}

fn validate_open_unit(name: &'static str, value: f64) -> Result<(), EngineError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(invalid(name, value, "strictly inside (0, 1)"))
    }
}

fn validate_cost_and_margin(cost_pct: f64, margin_r: f64) -> Result<(), EngineError> {
    if !(0.0..1.0).contains(&cost_pct) {
        return Err(invalid("cost_pct", cost_pct, "inside [0, 1)"));
    }
    if !(margin_r >= 0.0) || !margin_r.is_finite() {
        return Err(invalid("margin_r", margin_r, "finite and >= 0"));
    }
    Ok(())
}

fn invalid(name: &'static str, value: f64, constraint: &'static str) -> EngineError {
    EngineError::InvalidParameter {
        filter: "expectancy",
        name,
        value,
        constraint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn inputs(win_rate: f64, ratio: f64, avg_loss: f64, cost: f64, margin: f64) -> ExpectancyInputs {
        ExpectancyInputs {
            win_rate,
            avg_win_loss_ratio: ratio,
            avg_loss_pct: avg_loss,
            cost_pct: cost,
            margin_r: margin,
        }
    }

    #[test]
    fn test_reference_cases() {
        // cost_R = 0.0012 / 0.01 = 0.12; gross = 0.33*2.5 - 0.67 = 0.155
        let report = evaluate(inputs(0.33, 2.5, 0.01, 0.0012, 0.0)).unwrap();
        assert_relative_eq!(report.net_expectancy_r, 0.035, epsilon = 1e-9);
        assert!(report.passed);
        assert!(!report.floor_applied);

        // Higher cost flips the verdict: cost_R = 0.2, net = -0.045
        let report = evaluate(inputs(0.33, 2.5, 0.01, 0.002, 0.0)).unwrap();
        assert_relative_eq!(report.net_expectancy_r, -0.045, epsilon = 1e-9);
        assert!(!report.passed);
    }

    #[test]
    fn test_margin_is_a_hurdle_on_net_expectancy() {
        // net 0.035 clears margin 0.03 but not 0.05
        assert!(evaluate(inputs(0.33, 2.5, 0.01, 0.0012, 0.03)).unwrap().passed);
        assert!(!evaluate(inputs(0.33, 2.5, 0.01, 0.0012, 0.05)).unwrap().passed);
    }

    #[test]
    fn test_floor_applies_to_tiny_losses() {
        let before = floor_application_count();
        let report = evaluate(inputs(0.5, 2.0, 0.0001, 0.001, 0.0)).unwrap();

        assert!(report.floor_applied);
        assert_relative_eq!(report.floored_avg_loss_pct, AVG_LOSS_FLOOR);
        assert_relative_eq!(report.cost_r, 0.001 / AVG_LOSS_FLOOR);
        assert!(floor_application_count() > before);
    }

    #[test]
    fn test_round_trip_with_min_win_loss_ratio() {
        // At R = min_win_loss_ratio the net expectancy equals the
        // margin exactly; any larger R passes.
        for &wr in &[0.05, 0.2, 0.33, 0.5, 0.7, 0.95] {
            for &margin in &[0.0, 0.05, 0.2] {
                let min_r = min_win_loss_ratio(wr, 0.01, 0.0012, margin).unwrap();

                let at_boundary = evaluate(inputs(wr, min_r, 0.01, 0.0012, margin)).unwrap();
                assert_relative_eq!(at_boundary.net_expectancy_r, margin, epsilon = 1e-9);
                assert!(at_boundary.passed);

                let above = evaluate(inputs(wr, min_r + 0.1, 0.01, 0.0012, margin)).unwrap();
                assert!(above.net_expectancy_r >= margin);
                assert!(above.passed);
            }
        }
    }

    #[test]
    fn test_min_ratio_monotonically_decreasing_in_win_rate() {
        let mut prev = f64::INFINITY;
        for i in 1..100 {
            let wr = i as f64 / 100.0;
            let min_r = min_win_loss_ratio(wr, 0.01, 0.0012, 0.05).unwrap();
            assert!(
                min_r < prev,
                "min ratio must fall as win rate rises: {} at wr={}",
                min_r,
                wr
            );
            prev = min_r;
        }
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(evaluate(inputs(0.0, 2.5, 0.01, 0.001, 0.05)).is_err());
        assert!(evaluate(inputs(1.0, 2.5, 0.01, 0.001, 0.05)).is_err());
        assert!(evaluate(inputs(-0.2, 2.5, 0.01, 0.001, 0.05)).is_err());
        assert!(evaluate(inputs(0.5, 0.0, 0.01, 0.001, 0.05)).is_err());
        assert!(evaluate(inputs(0.5, f64::INFINITY, 0.01, 0.001, 0.05)).is_err());
        assert!(evaluate(inputs(0.5, 2.5, 0.0, 0.001, 0.05)).is_err());
        assert!(evaluate(inputs(0.5, 2.5, 1.5, 0.001, 0.05)).is_err());
        assert!(evaluate(inputs(0.5, 2.5, 0.01, -0.001, 0.05)).is_err());
        assert!(evaluate(inputs(0.5, 2.5, 0.01, 1.0, 0.05)).is_err());
        assert!(evaluate(inputs(0.5, 2.5, 0.01, 0.001, -0.1)).is_err());

        assert!(min_win_loss_ratio(0.0, 0.01, 0.001, 0.05).is_err());
        assert!(min_win_loss_ratio(1.0, 0.01, 0.001, 0.05).is_err());
    }

    #[test]
    fn test_error_carries_context() {
        let err = evaluate(inputs(1.5, 2.5, 0.01, 0.001, 0.05)).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("win_rate"));
        assert!(text.contains("expectancy"));
    }
}
