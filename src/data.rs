//! Data loading
//!
//! Loads OHLCV candle series from CSV files, one file per
//! (symbol, timeframe). The market-data provider is a collaborator;
//! this module only enforces the contract at the boundary: validated
//! candles, strictly increasing timestamps, no duplicates.
//!
//! Expected columns: `datetime,open,high,low,close,volume` with the
//! datetime either RFC 3339 or epoch milliseconds.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::{Candle, Symbol};

/// Load a candle series from a CSV file.
///
/// Rows failing candle validation are skipped with a warning;
/// out-of-order or duplicate timestamps are an error because every
/// downstream computation assumes a strictly ordered series.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut candles: Vec<Candle> = Vec::new();
    let mut skipped = 0usize;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;
        if record.len() < 6 {
            bail!(
                "row {} has {} columns, expected 6 (datetime,open,high,low,close,volume)",
                row_idx + 1,
                record.len()
            );
        }

        let datetime = parse_datetime(&record[0])
            .with_context(|| format!("row {}: bad datetime {:?}", row_idx + 1, &record[0]))?;
        let open: f64 = record[1].parse().context("bad open")?;
        let high: f64 = record[2].parse().context("bad high")?;
        let low: f64 = record[3].parse().context("bad low")?;
        let close: f64 = record[4].parse().context("bad close")?;
        let volume: f64 = record[5].parse().context("bad volume")?;

        match Candle::new(datetime, open, high, low, close, volume) {
            Ok(candle) => {
                if let Some(last) = candles.last() {
                    if candle.datetime <= last.datetime {
                        bail!(
                            "row {}: timestamp {} not after previous {} in {}",
                            row_idx + 1,
                            candle.datetime,
                            last.datetime,
                            path.display()
                        );
                    }
                }
                candles.push(candle);
            }
            Err(err) => {
                skipped += 1;
                warn!(row = row_idx + 1, %err, file = %path.display(), "skipping invalid candle");
            }
        }
    }

    if skipped > 0 {
        warn!(
            skipped,
            loaded = candles.len(),
            file = %path.display(),
            "some rows failed validation"
        );
    }

    Ok(candles)
}

/// Path convention: `{data_dir}/{symbol}_{timeframe}.csv`
pub fn csv_path(data_dir: &str, symbol: &Symbol, timeframe: &str) -> PathBuf {
    PathBuf::from(data_dir).join(format!("{}_{}.csv", symbol.as_str(), timeframe))
}

/// Load all requested symbols for one timeframe.
pub fn load_multi_symbol(
    data_dir: &str,
    symbols: &[Symbol],
    timeframe: &str,
) -> Result<HashMap<Symbol, Vec<Candle>>> {
    let mut data = HashMap::new();

    for symbol in symbols {
        let path = csv_path(data_dir, symbol, timeframe);
        let candles = load_csv(&path)
            .with_context(|| format!("Failed to load data for {symbol} ({timeframe})"))?;
        data.insert(symbol.clone(), candles);
    }

    Ok(data)
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(millis) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis)
            .with_context(|| format!("epoch millis out of range: {millis}"));
    }
    let parsed: DateTime<Utc> = raw
        .parse()
        .with_context(|| format!("not RFC 3339 or epoch millis: {raw:?}"))?;
    Ok(parsed)
}
