//! Backtest command implementation

use anyhow::{Context, Result};
use breakout_screener::{data, Config, ScanCycle, Symbol};
use tracing::info;

pub fn run(config_path: String, ticker: String, capital_override: Option<f64>) -> Result<()> {
    info!("Starting single-ticker backtest");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(capital) = capital_override {
        info!("Overriding initial capital to: {:.2}", capital);
        config.backtest.initial_capital = capital;
    }

    let symbol = Symbol::new(ticker.to_uppercase());
    let path = data::csv_path(&config.backtest.data_dir, &symbol, &config.backtest.timeframe);
    let candles = data::load_csv(&path)
        .with_context(|| format!("Failed to load data for {symbol}"))?;
    info!("Loaded {} candles for {}", candles.len(), symbol);

    let initial_capital = config.backtest.initial_capital;
    let cycle = ScanCycle::start(config);
    let metrics = cycle.get_or_run_backtest(&symbol, &candles)?;

    let research = cycle.evaluate_research_pass(&metrics);
    let trading = cycle.evaluate_trading_pass(&metrics);

    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS: {}", symbol);
    println!("{}", "=".repeat(60));
    println!("Initial Capital:    {:.2}", initial_capital);
    println!("Total Return:       {:.2}%", metrics.total_return_pct);
    println!("Win Rate:           {:.2}%", metrics.win_rate * 100.0);
    println!("Profit Factor:      {:.2}", metrics.profit_factor);
    println!("Sharpe:             {:.2}", metrics.sharpe);
    println!("Sortino:            {:.2}", metrics.sortino);
    println!("Calmar:             {:.2}", metrics.calmar);
    println!("Max Drawdown:       {:.2}%", metrics.max_drawdown_pct);
    println!("Volatility (ann.):  {:.2}%", metrics.volatility_pct);
    println!("Total Trades:       {}", metrics.trade_count);
    println!("Avg Win/Loss (R):   {:.2}", metrics.avg_win_loss_ratio);
    println!("Avg Loss:           {:.3}%", metrics.avg_loss_pct * 100.0);
    println!("Max Consec. Wins:   {}", metrics.max_consecutive_wins);
    println!("Max Consec. Losses: {}", metrics.max_consecutive_losses);
    println!("{}", "-".repeat(60));
    println!(
        "Research Pass:      {} ({})",
        if research.passed { "PASS" } else { "FAIL" },
        research.reason
    );
    println!(
        "Trading Pass:       {} ({})",
        if trading.passed { "PASS" } else { "FAIL" },
        trading.reason
    );
    println!("{}", "=".repeat(60));

    info!("Backtest completed successfully");

    Ok(())
}
