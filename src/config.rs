//! Configuration management
//!
//! JSON configuration files with typed sections. The exchange cost
//! section deliberately has no defaults: commission and slippage come
//! from the cost source of record, and `cost_pct` is derived in exactly
//! one place from those two fields.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use crate::execution::ExecutionMode;
use crate::regime::RegimeConfig;
use crate::risk::RiskConfig;
use crate::signal::SignalConfig;
use crate::Symbol;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// No serde default: a config file without explicit costs is
    /// rejected rather than silently backtested with invented costs.
    pub exchange: ExchangeConfig,
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub research: ResearchThresholds,
    #[serde(default)]
    pub trading: TradingThresholds,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        Ok(config)
    }

    /// Stable digest over every parameter that affects simulated
    /// outcomes. Threshold sections are excluded on purpose: changing a
    /// threshold must not re-run a backtest, changing a simulation
    /// parameter must.
    pub fn config_hash(&self) -> String {
        #[derive(Serialize)]
        struct Fingerprint<'a> {
            exchange: &'a ExchangeConfig,
            backtest: &'a BacktestConfig,
            signal: &'a SignalConfig,
            risk: &'a RiskConfig,
        }

        let fingerprint = Fingerprint {
            exchange: &self.exchange,
            backtest: &self.backtest,
            signal: &self.signal,
            risk: &self.risk,
        };

        let json = serde_json::to_string(&fingerprint)
            .expect("config fingerprint serialization cannot fail");
        let digest = Sha256::digest(json.as_bytes());
        hex::encode(&digest[..8])
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.backtest
            .tickers
            .iter()
            .map(|s| Symbol::new(s.clone()))
            .collect()
    }
}

/// Per-side trading costs, fractional. Externally derived; there is no
/// `Default` impl and no fallback anywhere in the call chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub commission: f64,
    pub slippage: f64,
}

impl ExchangeConfig {
    /// Round-trip cost: both sides of commission plus slippage.
    pub fn cost_pct(&self) -> f64 {
        (self.commission + self.slippage) * 2.0
    }
}

/// Backtest run parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub data_dir: String,
    pub timeframe: String,
    pub tickers: Vec<String>,
    pub initial_capital: f64,
    pub execution: ExecutionMode,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            timeframe: "1d".to_string(),
            tickers: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "SOLUSDT".to_string(),
                "BNBUSDT".to_string(),
                "XRPUSDT".to_string(),
            ],
            initial_capital: 100_000.0,
            execution: ExecutionMode::Intrabar,
        }
    }
}

/// Loose thresholds meant to produce a broad candidate pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchThresholds {
    pub min_trades: usize,
    pub min_total_return_pct: f64,
    /// Fractional, like `BacktestMetrics::win_rate`
    pub min_win_rate: f64,
    pub min_profit_factor: f64,
    pub min_sharpe: f64,
    pub max_drawdown_pct: f64,
}

impl Default for ResearchThresholds {
    fn default() -> Self {
        Self {
            min_trades: 10,
            min_total_return_pct: 0.0,
            min_win_rate: 0.30,
            min_profit_factor: 1.1,
            min_sharpe: 0.5,
            max_drawdown_pct: 40.0,
        }
    }
}

/// Strict thresholds gating real capital, applied together with the
/// expectancy filter and the regime guard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingThresholds {
    pub min_trades: usize,
    pub min_total_return_pct: f64,
    /// Fractional, like `BacktestMetrics::win_rate`
    pub min_win_rate: f64,
    pub min_profit_factor: f64,
    pub min_sharpe: f64,
    pub max_drawdown_pct: f64,
    /// Safety buffer in R for the expectancy filter
    pub margin_r: f64,
    #[serde(default)]
    pub regime: RegimeConfig,
}

impl Default for TradingThresholds {
    fn default() -> Self {
        Self {
            min_trades: 30,
            min_total_return_pct: 10.0,
            min_win_rate: 0.35,
            min_profit_factor: 1.3,
            min_sharpe: 1.0,
            max_drawdown_pct: 25.0,
            margin_r: 0.05,
            regime: RegimeConfig::default(),
        }
    }
}
