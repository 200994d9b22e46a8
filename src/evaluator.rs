//! Two-gate evaluation over one scan cycle
//!
//! One backtest per (ticker, config), cached under a key that includes
//! the cycle `run_id` and a digest of every simulation-affecting
//! parameter. Both gate evaluations are terminal reads of the same
//! cached snapshot; re-running a backtest to apply a different
//! threshold set is a correctness bug, not an inefficiency, because the
//! two evaluations must observe identical inputs.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::backtest::Backtester;
use crate::config::Config;
use crate::diagnostics::ScanDiagnostics;
use crate::error::EngineError;
use crate::expectancy::{self, ExpectancyInputs};
use crate::metrics::BacktestMetrics;
use crate::regime;
use crate::signal::SignalGenerator;
use crate::{Candle, PassResult, Symbol};

static CYCLE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Immutable, structurally hashable cache key. `config_hash` is part of
/// the key so that two backtests run under different simulation
/// parameters can never share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub symbol: Symbol,
    pub timeframe: String,
    pub run_id: String,
    pub config_hash: String,
}

struct CacheEntry {
    /// Recorded again inside the entry and verified on read; a mismatch
    /// with the key is a `CacheMisuse` and is treated as a miss.
    config_hash: String,
    metrics: Arc<BacktestMetrics>,
}

/// One scan cycle: fresh `run_id`, fixed `config_hash`, private cache.
///
/// Starting a new cycle is the `start_cycle` operation: the previous
/// cycle's cache lives inside the previous instance and is discarded
/// with it, so stale metrics can never leak across cycles. An aborted
/// cycle is simply dropped.
pub struct ScanCycle {
    config: Config,
    run_id: String,
    config_hash: String,
    cache: Mutex<HashMap<CacheKey, CacheEntry>>,
    backtest_runs: AtomicUsize,
    diagnostics: Mutex<ScanDiagnostics>,
}

impl ScanCycle {
    /// Start a cycle: generate a fresh `run_id` and compute the config
    /// digest once, up front, so every lookup in this cycle uses the
    /// same key material.
    pub fn start(config: Config) -> Self {
        let seq = CYCLE_SEQ.fetch_add(1, Ordering::Relaxed);
        let run_id = format!("{}-{:03}", Utc::now().format("%Y%m%dT%H%M%SZ"), seq);
        let config_hash = config.config_hash();

        tracing::info!(%run_id, %config_hash, "scan cycle started");

        Self {
            config,
            run_id,
            config_hash,
            cache: Mutex::new(HashMap::new()),
            backtest_runs: AtomicUsize::new(0),
            diagnostics: Mutex::new(ScanDiagnostics::default()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// How many simulations actually executed in this cycle. Test and
    /// telemetry observability for the exactly-once cache contract.
    pub fn backtest_runs(&self) -> usize {
        self.backtest_runs.load(Ordering::Relaxed)
    }

    /// Return cached metrics for the symbol, running the backtest on a
    /// miss. Two calls under the same key return the identical
    /// snapshot and execute the simulation exactly once.
    pub fn get_or_run_backtest(
        &self,
        symbol: &Symbol,
        candles: &[Candle],
    ) -> Result<Arc<BacktestMetrics>, EngineError> {
        if candles.is_empty() {
            return Err(EngineError::InsufficientData {
                context: "backtest",
                have: 0,
                need: 1,
            });
        }

        let key = CacheKey {
            symbol: symbol.clone(),
            timeframe: self.config.backtest.timeframe.clone(),
            run_id: self.run_id.clone(),
            config_hash: self.config_hash.clone(),
        };

        {
            let cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.get(&key) {
                if entry.config_hash == self.config_hash {
                    return Ok(Arc::clone(&entry.metrics));
                }
                // Structurally unreachable while the hash is part of
                // the key; verified anyway and treated as a miss.
                let err = EngineError::CacheMisuse {
                    symbol: symbol.to_string(),
                    expected: self.config_hash.clone(),
                    found: entry.config_hash.clone(),
                };
                tracing::warn!(error = %err, "discarding cache entry, recomputing");
            }
        }

        let metrics = Arc::new(self.run_backtest(symbol, candles));
        self.backtest_runs.fetch_add(1, Ordering::Relaxed);

        let mut cache = self.cache.lock().unwrap();
        match cache.entry(key) {
            Entry::Occupied(mut occupied) => {
                // A mismatched entry is stale and must be replaced; a
                // matching one (a concurrent fill of the same key) wins
                // so both callers observe the same snapshot.
                if occupied.get().config_hash != self.config_hash {
                    occupied.insert(CacheEntry {
                        config_hash: self.config_hash.clone(),
                        metrics,
                    });
                }
                Ok(Arc::clone(&occupied.get().metrics))
            }
            Entry::Vacant(vacant) => {
                let entry = vacant.insert(CacheEntry {
                    config_hash: self.config_hash.clone(),
                    metrics,
                });
                Ok(Arc::clone(&entry.metrics))
            }
        }
    }

    fn run_backtest(&self, symbol: &Symbol, candles: &[Candle]) -> BacktestMetrics {
        let backtester = Backtester::new(
            SignalGenerator::new(self.config.signal.clone()),
            self.config.backtest.execution.build(),
            self.config.risk.clone(),
            self.config.exchange.commission,
            self.config.exchange.slippage,
            self.config.backtest.initial_capital,
        );

        backtester.run(symbol, candles).metrics
    }

    /// Loose gate: intended to pass a broad candidate pool through to
    /// the downstream decision step.
    pub fn evaluate_research_pass(&self, metrics: &Arc<BacktestMetrics>) -> PassResult {
        let r = &self.config.research;
        let checks = threshold_checks(
            metrics,
            r.min_trades,
            r.min_total_return_pct,
            r.min_win_rate,
            r.min_profit_factor,
            r.min_sharpe,
            r.max_drawdown_pct,
        );

        let mut diag = self.diagnostics.lock().unwrap();
        for check in &checks {
            diag.record_check("research", check.name, check.passed, check.gap);
        }

        let failed = checks.iter().find(|c| !c.passed);
        let passed = failed.is_none();
        diag.record_research(passed);

        PassResult {
            passed,
            reason: failed
                .map(|c| c.detail.clone())
                .unwrap_or_else(|| "all checks passed".to_string()),
            metrics: Arc::clone(metrics),
        }
    }

    /// Strict gate: thresholds, then the expectancy filter, then the
    /// regime guard. All three must pass; the first failing check
    /// determines the reported reason.
    pub fn evaluate_trading_pass(&self, metrics: &Arc<BacktestMetrics>) -> PassResult {
        let t = &self.config.trading;
        let checks = threshold_checks(
            metrics,
            t.min_trades,
            t.min_total_return_pct,
            t.min_win_rate,
            t.min_profit_factor,
            t.min_sharpe,
            t.max_drawdown_pct,
        );

        {
            let mut diag = self.diagnostics.lock().unwrap();
            for check in &checks {
                diag.record_check("trading", check.name, check.passed, check.gap);
            }
        }

        if let Some(failed) = checks.iter().find(|c| !c.passed) {
            return self.trading_result(false, failed.detail.clone(), metrics);
        }

        if let Some(reason) = self.expectancy_failure(metrics) {
            return self.trading_result(false, reason, metrics);
        }

        if let Some(reason) = self.regime_failure(metrics) {
            return self.trading_result(false, reason, metrics);
        }

        self.trading_result(true, "all checks passed".to_string(), metrics)
    }

    /// Finish the cycle: emit calibration warnings and return the
    /// diagnostic snapshot.
    pub fn finish(&self) -> ScanDiagnostics {
        let diag = self.diagnostics.lock().unwrap().clone();
        diag.warn_if_miscalibrated();
        diag
    }

    fn trading_result(
        &self,
        passed: bool,
        reason: String,
        metrics: &Arc<BacktestMetrics>,
    ) -> PassResult {
        self.diagnostics.lock().unwrap().record_trading(passed);
        PassResult {
            passed,
            reason,
            metrics: Arc::clone(metrics),
        }
    }

    /// Expectancy check; `None` means passed. A filter error fails the
    /// gate (fail-closed) with the error as the reason.
    fn expectancy_failure(&self, metrics: &BacktestMetrics) -> Option<String> {
        let t = &self.config.trading;
        let inputs = ExpectancyInputs {
            win_rate: metrics.win_rate,
            avg_win_loss_ratio: metrics.avg_win_loss_ratio,
            avg_loss_pct: metrics.avg_loss_pct,
            cost_pct: self.config.exchange.cost_pct(),
            margin_r: t.margin_r,
        };

        match expectancy::evaluate(inputs) {
            Ok(report) => {
                self.diagnostics.lock().unwrap().record_check(
                    "trading",
                    "expectancy",
                    report.passed,
                    report.net_expectancy_r - report.margin_r,
                );
                if report.passed {
                    None
                } else {
                    Some(format!(
                        "net expectancy {:.3}R below margin {:.3}R (gross {:.3}R, cost {:.3}R)",
                        report.net_expectancy_r,
                        report.margin_r,
                        report.gross_expectancy_r,
                        report.cost_r
                    ))
                }
            }
            Err(err) => {
                self.diagnostics
                    .lock()
                    .unwrap()
                    .record_check("trading", "expectancy", false, 0.0);
                tracing::error!(error = %err, "expectancy filter rejected inputs");
                Some(format!("expectancy filter error (fail-closed): {err}"))
            }
        }
    }

    /// Regime guard; `None` means passed. The period is the span of the
    /// trade history; months outside it carry no trades and therefore
    /// no information.
    fn regime_failure(&self, metrics: &BacktestMetrics) -> Option<String> {
        let t = &self.config.trading;
        let (Some(first), Some(last)) = (metrics.trades.first(), metrics.trades.last()) else {
            return None; // min_trades has already rejected empty histories
        };

        let segments = regime::segment_trades(
            &metrics.trades,
            first.entry_time,
            last.exit_time,
            t.regime.min_regime_trades,
        );
        let verdict = regime::evaluate_guard(segments, &t.regime);

        if verdict.undetermined_count > 0 {
            tracing::info!(
                undetermined = verdict.undetermined_count,
                "regime guard downgraded for thin segments; relying on \
                 the global trade-count threshold"
            );
        }

        self.diagnostics.lock().unwrap().record_check(
            "trading",
            "regime_guard",
            verdict.passed,
            t.regime.max_failed_regimes as f64 - verdict.failed_count as f64,
        );

        if verdict.passed {
            return None;
        }

        if verdict.most_recent_failed {
            Some(format!(
                "most recent regime below profit factor {:.2}; never tolerated",
                t.regime.regime_min_pf
            ))
        } else {
            Some(format!(
                "{} regimes below profit factor {:.2} (max {} tolerated)",
                verdict.failed_count, t.regime.regime_min_pf, t.regime.max_failed_regimes
            ))
        }
    }
}

struct Check {
    name: &'static str,
    passed: bool,
    gap: f64,
    detail: String,
}

fn threshold_checks(
    m: &BacktestMetrics,
    min_trades: usize,
    min_total_return_pct: f64,
    min_win_rate: f64,
    min_profit_factor: f64,
    min_sharpe: f64,
    max_drawdown_pct: f64,
) -> Vec<Check> {
    // Infinite profit factors would poison the gap averages
    let bounded_pf = m.profit_factor.min(1e6);

    vec![
        at_least("trade_count", m.trade_count as f64, min_trades as f64),
        at_least("total_return_pct", m.total_return_pct, min_total_return_pct),
        at_least("win_rate", m.win_rate, min_win_rate),
        at_least("profit_factor", bounded_pf, min_profit_factor),
        at_least("sharpe", m.sharpe, min_sharpe),
        at_most("max_drawdown_pct", m.max_drawdown_pct, max_drawdown_pct),
    ]
}

fn at_least(name: &'static str, actual: f64, threshold: f64) -> Check {
    Check {
        name,
        passed: actual >= threshold,
        gap: actual - threshold,
        detail: format!("{name} {actual:.4} below threshold {threshold:.4}"),
    }
}

fn at_most(name: &'static str, actual: f64, threshold: f64) -> Check {
    Check {
        name,
        passed: actual <= threshold,
        gap: threshold - actual,
        detail: format!("{name} {actual:.4} above threshold {threshold:.4}"),
    }
}
