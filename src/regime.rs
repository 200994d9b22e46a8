//! Regime segmentation and consistency guard
//!
//! An aggregate edge can hide a strategy that only worked in one
//! stretch of the backtest. The guard splits the period into calendar
//! segments and requires the edge to hold in (almost) every one of
//! them.
//!
//! Segmentation is a pure function from (trades, period) to an ordered
//! segment list and carries no pass/fail policy; the threshold policy
//! is applied separately so each half can be tested in isolation.

use chrono::{DateTime, Datelike, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Trade;

/// Guard thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// Minimum trades for a segment to be statistically usable
    pub min_regime_trades: usize,

    /// Profit factor every determined segment must reach
    pub regime_min_pf: f64,

    /// Failed segments tolerated, most-recent excluded
    pub max_failed_regimes: usize,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            min_regime_trades: 10,
            regime_min_pf: 1.0,
            max_failed_regimes: 1,
        }
    }
}

/// Calendar month key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            year: dt.year(),
            month: dt.month(),
        }
    }

    fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    fn quarter(self) -> (i32, u32) {
        (self.year, (self.month - 1) / 3)
    }
}

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// One segment of the backtest period
#[derive(Debug, Clone)]
pub struct RegimeSegment {
    pub start: YearMonth,
    pub end: YearMonth,
    pub trade_count: usize,
    pub profit_factor: f64,
    /// False when the trade count stayed below the minimum even after
    /// merging and the quarterly fallback; such segments are excluded
    /// from the profit-factor check and covered by the global
    /// trade-count threshold instead.
    pub determined: bool,
    /// Set on the most recent determined segment
    pub is_most_recent: bool,
}

/// Guard outcome over one segmentation
#[derive(Debug, Clone)]
pub struct RegimeVerdict {
    pub segments: Vec<RegimeSegment>,
    pub failed_count: usize,
    pub most_recent_failed: bool,
    pub undetermined_count: usize,
    pub passed: bool,
}

/// Split `[period_start, period_end]` into regime segments.
///
/// Monthly buckets first; a month below `min_regime_trades` is merged
/// with adjacent months up to a three-month span. If any merged span is
/// still short, the whole period falls back to calendar quarters; a
/// quarter still short is marked undetermined.
pub fn segment_trades(
    trades: &[Trade],
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    min_regime_trades: usize,
) -> Vec<RegimeSegment> {
    if period_end < period_start {
        return Vec::new();
    }

    let months = month_range(
        YearMonth::from_datetime(period_start),
        YearMonth::from_datetime(period_end),
    );

    let mut buckets: BTreeMap<YearMonth, Vec<&Trade>> = BTreeMap::new();
    for month in &months {
        buckets.insert(*month, Vec::new());
    }
    for trade in trades {
        let ym = YearMonth::from_datetime(trade.exit_time);
        // A trade dated outside the stated period lands in its own
        // bucket and is ignored by every span.
        buckets.entry(ym).or_default().push(trade);
    }

    let merged = merge_months(&months, &buckets, min_regime_trades);

    let spans: Vec<(YearMonth, YearMonth)> = if merged
        .iter()
        .any(|(_, _, count)| *count < min_regime_trades)
    {
        quarterly_spans(&months)
    } else {
        merged.into_iter().map(|(s, e, _)| (s, e)).collect()
    };

    let mut segments: Vec<RegimeSegment> = spans
        .into_iter()
        .map(|(start, end)| {
            let span_trades: Vec<&Trade> = buckets
                .range(start..=end)
                .flat_map(|(_, ts)| ts.iter().copied())
                .collect();
            RegimeSegment {
                start,
                end,
                trade_count: span_trades.len(),
                profit_factor: profit_factor(&span_trades),
                determined: span_trades.len() >= min_regime_trades,
                is_most_recent: false,
            }
        })
        .collect();

    if let Some(last_determined) = segments.iter_mut().rev().find(|s| s.determined) {
        last_determined.is_most_recent = true;
    }

    segments
}

/// Apply the threshold policy to a segmentation.
pub fn evaluate_guard(segments: Vec<RegimeSegment>, config: &RegimeConfig) -> RegimeVerdict {
    let undetermined_count = segments.iter().filter(|s| !s.determined).count();

    let failed: Vec<&RegimeSegment> = segments
        .iter()
        .filter(|s| s.determined && s.profit_factor < config.regime_min_pf)
        .collect();

    // A collapse in the most recent period is the highest-risk failure
    // mode and is never tolerated.
    let most_recent_failed = failed.iter().any(|s| s.is_most_recent);
    let failed_count = failed.len();
    let passed = !most_recent_failed && failed_count <= config.max_failed_regimes;

    RegimeVerdict {
        segments,
        failed_count,
        most_recent_failed,
        undetermined_count,
        passed,
    }
}

fn month_range(start: YearMonth, end: YearMonth) -> Vec<YearMonth> {
    let mut months = Vec::new();
    let mut current = start;
    while current <= end {
        months.push(current);
        current = current.next();
    }
    months
}

/// Greedy forward merge of adjacent months up to a three-month span.
fn merge_months(
    months: &[YearMonth],
    buckets: &BTreeMap<YearMonth, Vec<&Trade>>,
    min_regime_trades: usize,
) -> Vec<(YearMonth, YearMonth, usize)> {
    const MAX_SPAN: usize = 3;

    let mut merged = Vec::new();
    let mut iter = months.iter().peekable();

    while let Some(&start) = iter.next() {
        let mut end = start;
        let mut count = buckets.get(&start).map_or(0, |t| t.len());
        let mut span = 1;

        while count < min_regime_trades && span < MAX_SPAN {
            match iter.peek() {
                Some(&&next) => {
                    end = next;
                    count += buckets.get(&next).map_or(0, |t| t.len());
                    span += 1;
                    iter.next();
                }
                None => break,
            }
        }

        merged.push((start, end, count));
    }

    merged
}

fn quarterly_spans(months: &[YearMonth]) -> Vec<(YearMonth, YearMonth)> {
    let quarters = months.iter().chunk_by(|m| m.quarter());
    quarters
        .into_iter()
        .map(|(_, group)| {
            let group: Vec<&YearMonth> = group.collect();
            (**group.first().unwrap(), **group.last().unwrap())
        })
        .collect()
}

fn profit_factor(trades: &[&Trade]) -> f64 {
    let gross_profit: f64 = trades.iter().filter(|t| t.is_win()).map(|t| t.net_pnl).sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| !t.is_win())
        .map(|t| t.net_pnl.abs())
        .sum();

    if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}
