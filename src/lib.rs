//! Breakout Screener
//!
//! Decision core of an automated breakout-trading bot: replays
//! historical candles through a volatility-breakout signal model,
//! simulates intrabar order execution, and decides whether the
//! resulting statistical edge is strong enough to surface a candidate
//! for research or to risk capital on it.
//!
//! The pipeline per ticker:
//!
//! ```text
//! candles -> SignalGenerator -> ExecutionModel -> metrics -> ScanCycle gates
//! ```
//!
//! # Example
//! ```no_run
//! use breakout_screener::{Config, ScanCycle, Symbol};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file("configs/default.json")?;
//!     let candles = breakout_screener::data::load_csv("data/BTCUSDT_1d.csv")?;
//!
//!     let cycle = ScanCycle::start(config);
//!     let metrics = cycle.get_or_run_backtest(&Symbol::new("BTCUSDT"), &candles)?;
//!     let research = cycle.evaluate_research_pass(&metrics);
//!     println!("research pass: {} ({})", research.passed, research.reason);
//!     Ok(())
//! }
//! ```

pub mod backtest;
pub mod config;
pub mod data;
pub mod diagnostics;
pub mod error;
pub mod evaluator;
pub mod execution;
pub mod expectancy;
pub mod indicators;
pub mod metrics;
pub mod regime;
pub mod risk;
pub mod signal;
pub mod types;

pub use config::Config;
pub use error::EngineError;
pub use evaluator::{CacheKey, ScanCycle};
pub use execution::{ExecutionMode, ExecutionModel};
pub use metrics::{BacktestMetrics, EquityCurve};
pub use signal::{SignalConfig, SignalGenerator};
pub use types::*;
