//! Breakout screener - main entry point
//!
//! This binary provides two subcommands:
//! - scan: run one full scan cycle over the configured tickers
//! - backtest: run and report a single-ticker backtest in detail

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "breakout-screener")]
#[command(about = "Volatility-breakout backtesting and trade-viability screening", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one scan cycle across the configured tickers
    Scan {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Tickers to scan (comma-separated, overrides config)
        #[arg(short, long)]
        tickers: Option<String>,

        /// Run sequentially instead of parallel
        #[arg(long)]
        sequential: bool,
    },

    /// Run a single-ticker backtest with a detailed report
    Backtest {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Ticker to backtest
        #[arg(short, long)]
        ticker: String,

        /// Initial capital override
        #[arg(long)]
        capital: Option<f64>,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        // Keep the console clean for the progress bar
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();
    }

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            config,
            tickers,
            sequential,
        } => {
            setup_logging(cli.verbose, "scan", true)?;
            commands::scan::run(config, tickers, sequential)
        }
        Commands::Backtest {
            config,
            ticker,
            capital,
        } => {
            setup_logging(cli.verbose, "backtest", false)?;
            commands::backtest::run(config, ticker, capital)
        }
    }
}
