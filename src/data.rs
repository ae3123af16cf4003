//! Historical price data
//!
//! The simulation consumes prices through [`HistoricalData`]: an ordered time
//! axis plus a per-symbol lookup by time index. [`PriceSeries`] is the
//! in-memory implementation, built from per-symbol rows or loaded from CSV.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use itertools::Itertools;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::Symbol;

/// Price provider consumed by the simulation
pub trait HistoricalData {
    /// Ordered timestamps; a time index is a position in this slice
    fn time_axis(&self) -> &[DateTime<Utc>];

    /// Price of `symbol` at `index`, `None` when absent
    fn price_at(&self, symbol: &Symbol, index: usize) -> Option<f64>;

    /// Symbols the provider has series for
    fn symbols(&self) -> Vec<Symbol>;

    fn len(&self) -> usize {
        self.time_axis().len()
    }

    fn is_empty(&self) -> bool {
        self.time_axis().is_empty()
    }
}

/// One price observation
pub type PriceRow = (DateTime<Utc>, Option<f64>);

/// In-memory price table aligned on a shared time axis
#[derive(Debug, Clone, Default)]
pub struct PriceSeries {
    timestamps: Vec<DateTime<Utc>>,
    prices: BTreeMap<Symbol, Vec<Option<f64>>>,
}

impl PriceSeries {
    /// Empty table over a fixed time axis
    pub fn new(timestamps: Vec<DateTime<Utc>>) -> Self {
        Self {
            timestamps,
            prices: BTreeMap::new(),
        }
    }

    /// Add a column of prices aligned with the time axis
    pub fn with_series(mut self, symbol: impl Into<Symbol>, values: Vec<Option<f64>>) -> Result<Self> {
        let symbol = symbol.into();
        if values.len() != self.timestamps.len() {
            anyhow::bail!(
                "series for {} has {} values but the time axis has {}",
                symbol,
                values.len(),
                self.timestamps.len()
            );
        }
        self.prices.insert(symbol, values);
        Ok(self)
    }

    /// Align per-symbol rows on the union of their timestamps
    ///
    /// Timestamps a symbol has no row for become `None` cells.
    pub fn from_rows(rows: HashMap<Symbol, Vec<PriceRow>>) -> Self {
        let timestamps: Vec<DateTime<Utc>> = rows
            .values()
            .flat_map(|series| series.iter().map(|(ts, _)| *ts))
            .sorted()
            .dedup()
            .collect();

        let prices: BTreeMap<Symbol, Vec<Option<f64>>> = rows
            .into_iter()
            .map(|(symbol, series)| {
                let by_time: HashMap<DateTime<Utc>, Option<f64>> = series.into_iter().collect();
                let column: Vec<Option<f64>> = timestamps
                    .iter()
                    .map(|ts| by_time.get(ts).copied().flatten())
                    .collect();
                (symbol, column)
            })
            .collect();

        Self { timestamps, prices }
    }
}

impl HistoricalData for PriceSeries {
    fn time_axis(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    fn price_at(&self, symbol: &Symbol, index: usize) -> Option<f64> {
        self.prices
            .get(symbol)
            .and_then(|column| column.get(index))
            .copied()
            .flatten()
    }

    fn symbols(&self) -> Vec<Symbol> {
        self.prices.keys().cloned().collect()
    }
}

// =============================================================================
// CSV Data Loading
// =============================================================================

/// Parse a timestamp in RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD` form
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = s.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Failed to parse datetime: {}", s))?;
    let ndt = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("Invalid date: {}", s))?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
}

/// Load `timestamp,price` rows from any CSV source
///
/// The timestamp column is `timestamp`, `datetime` or `date` (else the first
/// column); the price column is `close` or `price`. Empty or unparseable
/// price cells become missing prices.
pub fn load_csv_reader<R: Read>(reader: R) -> Result<Vec<PriceRow>> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers().context("Failed to read CSV header")?.clone();

    let find = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.contains(&h.trim().to_ascii_lowercase().as_str()))
    };
    let ts_col = find(&["timestamp", "datetime", "date"]).unwrap_or(0);
    let price_col = find(&["close", "price"]).context("CSV has no 'close' or 'price' column")?;

    let mut rows = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let ts = record
            .get(ts_col)
            .with_context(|| format!("Missing timestamp in row {}", row_idx + 1))?;
        let timestamp = parse_timestamp(ts)?;

        let price = record
            .get(price_col)
            .and_then(|cell| cell.trim().parse::<f64>().ok())
            .filter(|p| p.is_finite());

        rows.push((timestamp, price));
    }

    Ok(rows)
}

/// Load price rows from a CSV file
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<PriceRow>> {
    let file = std::fs::File::open(path.as_ref())
        .with_context(|| format!("Failed to open CSV file {}", path.as_ref().display()))?;
    load_csv_reader(file)
}

/// Load `<SYMBOL>.csv` for each symbol from `data_dir` into one price table
pub fn load_multi_symbol(data_dir: impl AsRef<Path>, symbols: &[Symbol]) -> Result<PriceSeries> {
    let mut rows = HashMap::new();

    for symbol in symbols {
        let path = data_dir.as_ref().join(format!("{}.csv", symbol.as_str()));

        if !path.exists() {
            warn!("Data file not found: {}", path.display());
            continue;
        }

        let series = load_csv(&path).with_context(|| format!("Failed to load data for {}", symbol))?;

        info!("Loaded {} rows for {}", series.len(), symbol);
        rows.insert(symbol.clone(), series);
    }

    if rows.is_empty() {
        anyhow::bail!("No data loaded for any symbol");
    }

    Ok(PriceSeries::from_rows(rows))
}
