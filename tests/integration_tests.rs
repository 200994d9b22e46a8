//! Integration tests for the breakout screening engine
//!
//! These tests drive the full pipeline: candles through the signal
//! generator and execution model into metrics, then through both gate
//! evaluations of a scan cycle.

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

use breakout_screener::backtest::Backtester;
use breakout_screener::config::{
    BacktestConfig, ExchangeConfig, ResearchThresholds, TradingThresholds,
};
use breakout_screener::risk::RiskConfig;
use breakout_screener::signal::{KMode, SignalConfig};
use breakout_screener::{Candle, Config, ExecutionMode, ScanCycle, SignalGenerator, Symbol};

// =============================================================================
// Test Utilities
// =============================================================================

/// Generate trending candle data: price climbs `trend` per bar inside a
/// fixed-width band, so ATR stabilizes and breakout entries keep
/// filling on the way up.
fn generate_trending_candles(count: usize, base_price: f64, trend: f64) -> Vec<Candle> {
    let start_time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut candles = Vec::with_capacity(count);

    for i in 0..count {
        let price = base_price + i as f64 * trend;
        let volatility = 1.0;

        candles.push(Candle::new_unchecked(
            start_time + Duration::days(i as i64),
            price - trend * 0.3,
            price + volatility,
            price - volatility,
            price + 0.3,
            1000.0 + i as f64 * 10.0,
        ));
    }

    candles
}

/// Choppy data: a deterministic oscillation that produces both winners
/// and losers.
fn generate_choppy_candles(count: usize, base_price: f64) -> Vec<Candle> {
    let start_time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut candles = Vec::with_capacity(count);
    let mut price = base_price;

    for i in 0..count {
        let swing = match i % 7 {
            0 | 1 | 2 => 1.5,
            3 => 0.5,
            _ => -1.2,
        };
        price = (price + swing).max(base_price * 0.5);

        candles.push(Candle::new_unchecked(
            start_time + Duration::days(i as i64),
            price - swing * 0.4,
            price + 1.2,
            price - 1.2,
            price,
            1000.0,
        ));
    }

    candles
}

fn test_config() -> Config {
    Config {
        exchange: ExchangeConfig {
            commission: 0.001,
            slippage: 0.0005,
        },
        backtest: BacktestConfig {
            data_dir: "data".to_string(),
            timeframe: "1d".to_string(),
            tickers: vec!["BTCUSDT".to_string()],
            initial_capital: 100_000.0,
            execution: ExecutionMode::Intrabar,
        },
        signal: SignalConfig::default(),
        risk: RiskConfig::default(),
        research: ResearchThresholds::default(),
        trading: TradingThresholds::default(),
    }
}

// =============================================================================
// Full Pipeline
// =============================================================================

#[test]
fn test_trending_market_produces_trades() {
    let candles = generate_trending_candles(200, 100.0, 1.0);
    let cycle = ScanCycle::start(test_config());

    let metrics = cycle
        .get_or_run_backtest(&Symbol::new("BTCUSDT"), &candles)
        .unwrap();

    assert!(metrics.trade_count > 0, "trend should trigger breakouts");
    assert_eq!(metrics.trade_count, metrics.trades.len());
    assert!(metrics.win_rate >= 0.0 && metrics.win_rate <= 1.0);

    // Every trade obeys the time invariant
    for trade in &metrics.trades {
        assert!(trade.entry_time < trade.exit_time);
    }
}

#[test]
fn test_scan_cycle_gates_run_off_one_snapshot() {
    let candles = generate_choppy_candles(300, 100.0);
    let cycle = ScanCycle::start(test_config());
    let symbol = Symbol::new("BTCUSDT");

    let metrics = cycle.get_or_run_backtest(&symbol, &candles).unwrap();
    let research = cycle.evaluate_research_pass(&metrics);
    let trading = cycle.evaluate_trading_pass(&metrics);

    // Both evaluations read the same instance; no second simulation ran
    assert!(Arc::ptr_eq(&research.metrics, &trading.metrics));
    assert_eq!(cycle.backtest_runs(), 1);
    assert!(!research.reason.is_empty());
    assert!(!trading.reason.is_empty());

    let diag = cycle.finish();
    assert_eq!(diag.research_evals, 1);
    assert_eq!(diag.trading_evals, 1);
}

#[test]
fn test_backtests_are_deterministic_across_cycles() {
    let candles = generate_choppy_candles(250, 100.0);
    let symbol = Symbol::new("BTCUSDT");

    let first = ScanCycle::start(test_config())
        .get_or_run_backtest(&symbol, &candles)
        .unwrap();
    let second = ScanCycle::start(test_config())
        .get_or_run_backtest(&symbol, &candles)
        .unwrap();

    // Same candles, same config: bit-identical snapshots
    assert_eq!(
        serde_json::to_string(&*first).unwrap(),
        serde_json::to_string(&*second).unwrap()
    );
}

#[test]
fn test_execution_modes_share_one_contract() {
    let candles = generate_trending_candles(200, 100.0, 1.0);
    let symbol = Symbol::new("BTCUSDT");

    // The caller swaps models with no other code changes
    for mode in [ExecutionMode::Simple, ExecutionMode::Intrabar] {
        let backtester = Backtester::new(
            SignalGenerator::new(SignalConfig::default()),
            mode.build(),
            RiskConfig::default(),
            0.001,
            0.0005,
            100_000.0,
        );

        let result = backtester.run(&symbol, &candles);
        assert_eq!(result.equity_curve.len(), candles.len());
        for trade in &result.metrics.trades {
            assert!(trade.entry_time < trade.exit_time);
            assert!(trade.size > 0.0);
        }
    }
}

#[test]
fn test_changing_costs_changes_the_cache_key() {
    let config = test_config();
    let mut expensive = config.clone();
    expensive.exchange.commission = 0.005;

    // Different simulation parameters may never share cached output
    assert_ne!(config.config_hash(), expensive.config_hash());

    let candles = generate_choppy_candles(250, 100.0);
    let symbol = Symbol::new("BTCUSDT");

    let cheap_metrics = ScanCycle::start(config)
        .get_or_run_backtest(&symbol, &candles)
        .unwrap();
    let costly_metrics = ScanCycle::start(expensive)
        .get_or_run_backtest(&symbol, &candles)
        .unwrap();

    if cheap_metrics.trade_count > 0 {
        assert!(costly_metrics.total_return_pct < cheap_metrics.total_return_pct);
    }
}

#[test]
fn test_flat_market_produces_no_trades_and_fails_research() {
    let start_time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let candles: Vec<Candle> = (0..100)
        .map(|i| {
            Candle::new_unchecked(
                start_time + Duration::days(i as i64),
                100.0,
                100.4,
                99.6,
                100.0,
                1000.0,
            )
        })
        .collect();

    // Wide bands keep the breakout level above every high in a flat
    // market
    let mut config = test_config();
    config.signal.k_low = 2.0;
    config.signal.k_mid = 2.0;
    config.signal.k_high = 2.0;

    let cycle = ScanCycle::start(config);
    let metrics = cycle
        .get_or_run_backtest(&Symbol::new("BTCUSDT"), &candles)
        .unwrap();

    // Tight flat band: the breakout level sits above every high
    assert_eq!(metrics.trade_count, 0);
    assert_eq!(metrics.profit_factor, 0.0);

    let research = cycle.evaluate_research_pass(&metrics);
    assert!(!research.passed);
    assert!(research.reason.contains("trade_count"));
}

#[test]
fn test_fixed_mode_pipeline() {
    let mut config = test_config();
    config.signal.mode = KMode::Fixed;

    let candles = generate_trending_candles(200, 100.0, 1.0);
    let cycle = ScanCycle::start(config);
    let metrics = cycle
        .get_or_run_backtest(&Symbol::new("BTCUSDT"), &candles)
        .unwrap();

    assert!(metrics.trade_count > 0);
}
