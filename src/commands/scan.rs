//! Scan command implementation
//!
//! Runs one full scan cycle: backtest every configured ticker once,
//! evaluate the research gate for all of them and the trading gate for
//! the research passers, then print the per-ticker verdicts and the
//! scan diagnostics.

use anyhow::Result;
use breakout_screener::{data, Config, PassResult, ScanCycle, Symbol};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{info, warn};

struct TickerOutcome {
    symbol: Symbol,
    research: PassResult,
    trading: Option<PassResult>,
}

pub fn run(config_path: String, tickers_override: Option<String>, sequential: bool) -> Result<()> {
    info!("Starting scan cycle");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(tickers) = tickers_override {
        config.backtest.tickers = tickers
            .split(',')
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect();
    }

    let symbols = config.symbols();
    let timeframe = config.backtest.timeframe.clone();
    let all_data = data::load_multi_symbol(&config.backtest.data_dir, &symbols, &timeframe)?;
    info!("Loaded data for {} symbols", all_data.len());

    let cycle = ScanCycle::start(config);
    info!(run_id = cycle.run_id(), "cycle started");

    let pb = ProgressBar::new(symbols.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}] {msg}")
            .unwrap()
            .progress_chars("█░ "),
    );

    let evaluate = |symbol: &Symbol| -> Option<TickerOutcome> {
        let candles = all_data.get(symbol)?;
        let metrics = match cycle.get_or_run_backtest(symbol, candles) {
            Ok(metrics) => metrics,
            Err(err) => {
                warn!(%symbol, %err, "skipping ticker");
                pb.inc(1);
                return None;
            }
        };

        let research = cycle.evaluate_research_pass(&metrics);
        // The trading gate only matters for candidates that survive the
        // research tier.
        let trading = research
            .passed
            .then(|| cycle.evaluate_trading_pass(&metrics));

        pb.inc(1);
        Some(TickerOutcome {
            symbol: symbol.clone(),
            research,
            trading,
        })
    };

    // Tickers are independent; parallel evaluation is the default.
    let mut outcomes: Vec<TickerOutcome> = if sequential {
        symbols.iter().filter_map(|s| evaluate(s)).collect()
    } else {
        symbols.par_iter().filter_map(|s| evaluate(s)).collect()
    };
    pb.finish_and_clear();

    outcomes.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    println!("\n{}", "=".repeat(96));
    println!("SCAN RESULTS (run {})", cycle.run_id());
    println!("{}", "=".repeat(96));
    println!(
        "{:<10} {:>8} {:>9} {:>8} {:>8} {:>10} {:>10}  {}",
        "Ticker", "Return%", "WinRate%", "PF", "Sharpe", "Research", "Trading", "Reason"
    );
    println!("{}", "-".repeat(96));

    for outcome in &outcomes {
        let m = &outcome.research.metrics;
        let (trading_label, reason) = match (&outcome.trading, outcome.research.passed) {
            (Some(t), _) if t.passed => ("PASS", t.reason.as_str()),
            (Some(t), _) => ("FAIL", t.reason.as_str()),
            (None, _) => ("-", outcome.research.reason.as_str()),
        };

        println!(
            "{:<10} {:>8.2} {:>9.2} {:>8.2} {:>8.2} {:>10} {:>10}  {}",
            outcome.symbol,
            m.total_return_pct,
            m.win_rate * 100.0,
            m.profit_factor.min(999.0),
            m.sharpe,
            if outcome.research.passed { "PASS" } else { "FAIL" },
            trading_label,
            reason
        );
    }
    println!("{}", "=".repeat(96));

    let diagnostics = cycle.finish();
    println!("{}", diagnostics.render());

    info!(
        backtests = cycle.backtest_runs(),
        research_passes = diagnostics.research_passes,
        trading_passes = diagnostics.trading_passes,
        "scan cycle completed"
    );

    Ok(())
}
