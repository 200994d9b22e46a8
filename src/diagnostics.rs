//! Scan diagnostics
//!
//! Per-filter pass/fail counts and the average gap between actual
//! metric values and their thresholds, accumulated across a scan. The
//! gap direction distinguishes "threshold too strict" (small negative
//! gaps everywhere) from "strategy genuinely weak" (large negative
//! gaps).

use std::collections::BTreeMap;

/// Accumulated outcomes for one named filter
#[derive(Debug, Clone, Default)]
pub struct FilterStat {
    pub passes: usize,
    pub fails: usize,
    /// Sum of (actual - threshold), sign-normalized so positive means
    /// headroom
    gap_sum: f64,
}

impl FilterStat {
    pub fn evaluations(&self) -> usize {
        self.passes + self.fails
    }

    pub fn avg_gap(&self) -> f64 {
        if self.evaluations() > 0 {
            self.gap_sum / self.evaluations() as f64
        } else {
            0.0
        }
    }
}

/// Per-scan diagnostic accumulator
#[derive(Debug, Clone, Default)]
pub struct ScanDiagnostics {
    filters: BTreeMap<String, FilterStat>,
    pub research_evals: usize,
    pub research_passes: usize,
    pub trading_evals: usize,
    pub trading_passes: usize,
}

impl ScanDiagnostics {
    /// Record one threshold check. `gap` is actual minus threshold,
    /// sign-normalized so positive always means headroom.
    pub fn record_check(&mut self, gate: &str, filter: &str, passed: bool, gap: f64) {
        let stat = self
            .filters
            .entry(format!("{gate}/{filter}"))
            .or_default();
        if passed {
            stat.passes += 1;
        } else {
            stat.fails += 1;
        }
        stat.gap_sum += gap;
    }

    pub fn record_research(&mut self, passed: bool) {
        self.research_evals += 1;
        if passed {
            self.research_passes += 1;
        }
    }

    pub fn record_trading(&mut self, passed: bool) {
        self.trading_evals += 1;
        if passed {
            self.trading_passes += 1;
        }
    }

    pub fn research_pass_rate(&self) -> f64 {
        if self.research_evals > 0 {
            self.research_passes as f64 / self.research_evals as f64
        } else {
            0.0
        }
    }

    /// Research-pass calibration check. The tier targets a 30-50% pass
    /// rate; a rate near 0% or 100% indicates miscalibrated thresholds
    /// and is surfaced as an operational warning, never silently
    /// accepted.
    pub fn warn_if_miscalibrated(&self) {
        if self.research_evals == 0 {
            return;
        }
        let rate = self.research_pass_rate();
        if rate < 0.05 || rate > 0.95 {
            tracing::warn!(
                pass_rate = format!("{:.1}%", rate * 100.0),
                evaluated = self.research_evals,
                "research pass rate far outside the 30-50% target; \
                 thresholds are likely miscalibrated"
            );
        }
    }

    pub fn filters(&self) -> impl Iterator<Item = (&String, &FilterStat)> {
        self.filters.iter()
    }

    /// Render the diagnostic report as a formatted table.
    pub fn render(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("\n{}\n", "=".repeat(72)));
        output.push_str("SCAN DIAGNOSTICS\n");
        output.push_str(&format!("{}\n", "=".repeat(72)));

        output.push_str(&format!(
            "{:<34} {:>7} {:>7} {:>12}\n",
            "Filter", "Pass", "Fail", "Avg Gap"
        ));
        output.push_str(&format!("{}\n", "-".repeat(72)));

        for (name, stat) in &self.filters {
            output.push_str(&format!(
                "{:<34} {:>7} {:>7} {:>12.4}\n",
                name,
                stat.passes,
                stat.fails,
                stat.avg_gap()
            ));
        }

        output.push_str(&format!("{}\n", "-".repeat(72)));
        output.push_str(&format!(
            "Research: {}/{} passed ({:.1}%)\n",
            self.research_passes,
            self.research_evals,
            self.research_pass_rate() * 100.0
        ));
        output.push_str(&format!(
            "Trading:  {}/{} passed\n",
            self.trading_passes, self.trading_evals
        ));
        output.push_str(&format!("{}\n", "=".repeat(72)));

        output
    }
}
