use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// Minimum number of aligned observations a price table needs before any
/// analysis is attempted.
pub const MIN_OBSERVATIONS: usize = 20;

/// Date format used for every string-indexed output.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Validated rectangular time series: dates x symbols -> price.
///
/// Columns are stored symbol-major. A cell is `None` where the symbol has no
/// observation for that date; present values are always finite and > 0.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    symbols: Vec<String>,
    columns: Vec<Vec<Option<f64>>>,
}

impl PriceTable {
    /// Build a table, enforcing the structural invariants.
    ///
    /// Non-finite and non-positive prices are dropped (set to missing)
    /// rather than rejected.
    pub fn new(
        dates: Vec<NaiveDate>,
        symbols: Vec<String>,
        columns: Vec<Vec<Option<f64>>>,
    ) -> Result<Self, AnalysisError> {
        if dates.is_empty() {
            return Err(AnalysisError::InvalidInputData("raw data is empty".to_string()));
        }
        if symbols.is_empty() {
            return Err(AnalysisError::InvalidInputData("no symbols provided".to_string()));
        }
        if columns.len() != symbols.len() {
            return Err(AnalysisError::InvalidInputData(format!(
                "{} symbols but {} price columns",
                symbols.len(),
                columns.len()
            )));
        }
        for (i, symbol) in symbols.iter().enumerate() {
            if symbol.trim().is_empty() {
                return Err(AnalysisError::InvalidInputData("blank symbol name".to_string()));
            }
            if symbols[..i].contains(symbol) {
                return Err(AnalysisError::InvalidInputData(format!(
                    "symbol {} appears more than once",
                    symbol
                )));
            }
        }
        for (symbol, column) in symbols.iter().zip(&columns) {
            if column.len() != dates.len() {
                return Err(AnalysisError::InvalidInputData(format!(
                    "column {} has {} values for {} dates",
                    symbol,
                    column.len(),
                    dates.len()
                )));
            }
        }

        let duplicates = dates.windows(2).filter(|w| w[0] == w[1]).count();
        if duplicates > 0 {
            tracing::error!(duplicates, "raw data contains duplicate dates");
            return Err(AnalysisError::InvalidInputData(format!(
                "raw data contains {} duplicate dates",
                duplicates
            )));
        }
        if let Some(w) = dates.windows(2).find(|w| w[0] > w[1]) {
            return Err(AnalysisError::InvalidInputData(format!(
                "dates are not in chronological order ({} before {})",
                w[0], w[1]
            )));
        }

        let columns = symbols
            .iter()
            .zip(columns)
            .map(|(symbol, column)| {
                let mut dropped = 0usize;
                let cleaned: Vec<Option<f64>> = column
                    .into_iter()
                    .map(|cell| match cell {
                        Some(p) if p.is_finite() && p > 0.0 => Some(p),
                        Some(_) => {
                            dropped += 1;
                            None
                        }
                        None => None,
                    })
                    .collect();
                if dropped > 0 {
                    tracing::warn!(symbol = %symbol, dropped, "dropped non-positive or non-finite prices");
                }
                cleaned
            })
            .collect();

        Ok(Self {
            dates,
            symbols,
            columns,
        })
    }

    /// Convenience constructor for fully populated columns.
    pub fn from_prices(
        dates: Vec<NaiveDate>,
        symbols: Vec<String>,
        columns: Vec<Vec<f64>>,
    ) -> Result<Self, AnalysisError> {
        let columns = columns
            .into_iter()
            .map(|c| c.into_iter().map(Some).collect())
            .collect();
        Self::new(dates, symbols, columns)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn columns(&self) -> &[Vec<Option<f64>>] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&[Option<f64>]> {
        self.columns.get(index).map(|c| c.as_slice())
    }

    pub fn column_by_symbol(&self, symbol: &str) -> Option<&[Option<f64>]> {
        let idx = self.symbols.iter().position(|s| s == symbol)?;
        self.column(idx)
    }

    /// Number of dates (rows).
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Rows where every symbol has a price.
    pub fn aligned_rows(&self) -> usize {
        (0..self.dates.len())
            .filter(|&row| self.columns.iter().all(|c| c[row].is_some()))
            .count()
    }

    pub fn has_missing_values(&self) -> bool {
        self.columns.iter().any(|c| c.iter().any(|v| v.is_none()))
    }

    /// Prices of every symbol on a given row, in column order.
    pub fn row(&self, row: usize) -> Vec<Option<f64>> {
        self.columns.iter().map(|c| c.get(row).copied().flatten()).collect()
    }
}

/// Dense dates x symbols table of derived values (returns, cumulative returns).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    pub dates: Vec<NaiveDate>,
    pub symbols: Vec<String>,
    /// Symbol-major: `columns[symbol][row]`.
    pub columns: Vec<Vec<f64>>,
}

impl DataTable {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column(&self, symbol: &str) -> Option<&[f64]> {
        let idx = self.symbols.iter().position(|s| s == symbol)?;
        self.columns.get(idx).map(|c| c.as_slice())
    }

    /// Multiply every cell by `factor`, returning a new table.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            dates: self.dates.clone(),
            symbols: self.symbols.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| c.iter().map(|v| v * factor).collect())
                .collect(),
        }
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

/// Why a metric could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    InsufficientHistory,
    ZeroVariance,
    NoDownsideObservations,
    NonPositiveGrowthFactor,
    NonPositiveElapsedTime,
}

impl UnavailableReason {
    pub fn describe(&self) -> &'static str {
        match self {
            UnavailableReason::InsufficientHistory => "not enough observations",
            UnavailableReason::ZeroVariance => "returns have zero variance",
            UnavailableReason::NoDownsideObservations => "no negative returns observed",
            UnavailableReason::NonPositiveGrowthFactor => "compounded growth factor is not positive",
            UnavailableReason::NonPositiveElapsedTime => "no time elapsed between first and last date",
        }
    }
}

/// A scalar metric or an explicit "not available" marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricValue {
    Available { value: f64 },
    NotAvailable { reason: UnavailableReason },
}

impl MetricValue {
    pub fn available(value: f64) -> Self {
        MetricValue::Available { value }
    }

    pub fn unavailable(reason: UnavailableReason) -> Self {
        MetricValue::NotAvailable { reason }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            MetricValue::Available { value } => Some(*value),
            MetricValue::NotAvailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, MetricValue::Available { .. })
    }

    pub fn reason(&self) -> Option<UnavailableReason> {
        match self {
            MetricValue::Available { .. } => None,
            MetricValue::NotAvailable { reason } => Some(*reason),
        }
    }

    /// Convert into a hard error for callers that cannot use a partial result.
    pub fn into_result(self, metric: &str) -> Result<f64, AnalysisError> {
        match self {
            MetricValue::Available { value } => Ok(value),
            MetricValue::NotAvailable {
                reason: UnavailableReason::InsufficientHistory,
            } => Err(AnalysisError::InsufficientHistory(format!(
                "{}: {}",
                metric,
                UnavailableReason::InsufficientHistory.describe()
            ))),
            MetricValue::NotAvailable { reason } => Err(AnalysisError::NumericDegenerate(format!(
                "{}: {}",
                metric,
                reason.describe()
            ))),
        }
    }
}

/// Performance statistics for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMetrics {
    pub symbol: String,
    pub total_return: MetricValue,
    pub cagr: MetricValue,
    pub sharpe_ratio: MetricValue,
    pub sortino_ratio: MetricValue,
}

/// Metrics for every symbol, in column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// Annual risk-free rate (decimal) the ratios were computed with.
    pub risk_free_rate: f64,
    pub symbols: Vec<SymbolMetrics>,
}

impl PerformanceReport {
    pub fn get(&self, symbol: &str) -> Option<&SymbolMetrics> {
        self.symbols.iter().find(|m| m.symbol == symbol)
    }
}

/// One peak-to-trough-to-recovery (or peak-to-end) decline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownEpisode {
    /// Date of the running peak the decline started from.
    pub start: NaiveDate,
    /// Date of the lowest price inside the episode.
    pub trough: NaiveDate,
    /// Recovery date, or the last date of the series if still underwater.
    pub end: NaiveDate,
    /// Calendar days between `start` and `end`.
    pub duration_days: i64,
    /// Most negative `price / peak - 1` inside the episode.
    pub drawdown: f64,
    pub recovered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolPrice {
    pub symbol: String,
    pub price: Option<f64>,
}

/// Summary of the raw and effective periods, shown at the top of every report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSummary {
    pub raw_start: NaiveDate,
    pub raw_end: NaiveDate,
    pub effective_start: NaiveDate,
    pub effective_end: NaiveDate,
    pub raw_trading_days: usize,
    pub effective_trading_days: usize,
    pub symbols: Vec<String>,
    pub first_prices: Vec<SymbolPrice>,
    pub last_prices: Vec<SymbolPrice>,
    pub has_missing_values: bool,
}

impl DataSummary {
    pub fn period_was_trimmed(&self) -> bool {
        self.raw_trading_days != self.effective_trading_days
    }
}

/// Symbol x symbol Pearson correlation. Undefined pairs are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub symbols: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.symbols.iter().position(|s| s == a)?;
        let j = self.symbols.iter().position(|s| s == b)?;
        self.values[i][j]
    }
}

/// Flat, string-indexed table ready to be written out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportTable {
    pub index_label: String,
    pub index: Vec<String>,
    pub columns: Vec<String>,
    /// Row-major: `rows[i][j]` is the cell for `index[i]`, `columns[j]`.
    pub rows: Vec<Vec<Option<f64>>>,
}

impl ExportTable {
    pub fn cell(&self, index: &str, column: &str) -> Option<f64> {
        let i = self.index.iter().position(|s| s == index)?;
        let j = self.columns.iter().position(|s| s == column)?;
        self.rows[i][j]
    }
}

/// The four datasets persisted alongside every report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportTables {
    pub price_data: ExportTable,
    pub daily_returns: ExportTable,
    pub cumulative_returns: ExportTable,
    pub correlation_matrix: ExportTable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReturn {
    pub year: i32,
    pub month: u32,
    /// Decimal return for the month.
    pub return_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyReturn {
    pub year: i32,
    pub return_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolPeriodReturns {
    pub symbol: String,
    pub monthly: Vec<MonthlyReturn>,
    pub yearly: Vec<YearlyReturn>,
}

/// Annual risk-free rate, held as a decimal.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskFreeRate(f64);

impl RiskFreeRate {
    /// Accepts an annual percentage in `0..=100` (e.g. `5.0` for 5%).
    pub fn from_percent(percent: f64) -> Result<Self, AnalysisError> {
        if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
            return Err(AnalysisError::InvalidInputData(format!(
                "risk-free rate must be between 0 and 100 percent, got {}",
                percent
            )));
        }
        Ok(Self(percent / 100.0))
    }

    pub fn as_decimal(&self) -> f64 {
        self.0
    }

    pub fn as_percent(&self) -> f64 {
        self.0 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect()
    }

    #[test]
    fn test_price_table_rejects_empty() {
        let err = PriceTable::new(vec![], vec!["AAPL".into()], vec![vec![]]).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInputData(_)));
    }

    #[test]
    fn test_price_table_rejects_duplicates_and_disorder() {
        let d = days(3);
        let dup = vec![d[0], d[1], d[1]];
        let err = PriceTable::from_prices(dup, vec!["A".into()], vec![vec![1.0, 2.0, 3.0]]).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInputData(ref m) if m.contains("duplicate")));

        let unordered = vec![d[0], d[2], d[1]];
        let err = PriceTable::from_prices(unordered, vec!["A".into()], vec![vec![1.0, 2.0, 3.0]])
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInputData(ref m) if m.contains("chronological")));
    }

    #[test]
    fn test_price_table_rejects_shape_mismatch() {
        let err = PriceTable::from_prices(days(3), vec!["A".into()], vec![vec![1.0, 2.0]]).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInputData(_)));

        let err = PriceTable::from_prices(
            days(2),
            vec!["A".into(), "A".into()],
            vec![vec![1.0, 2.0], vec![1.0, 2.0]],
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInputData(ref m) if m.contains("more than once")));
    }

    #[test]
    fn test_price_table_drops_bad_prices() {
        let table = PriceTable::from_prices(
            days(4),
            vec!["A".into()],
            vec![vec![10.0, -1.0, f64::INFINITY, 0.0]],
        )
        .unwrap();
        assert_eq!(table.column(0).unwrap(), &[Some(10.0), None, None, None]);
        assert!(table.has_missing_values());
        assert_eq!(table.aligned_rows(), 1);
    }

    #[test]
    fn test_risk_free_rate_bounds() {
        assert!((RiskFreeRate::from_percent(5.0).unwrap().as_decimal() - 0.05).abs() < 1e-15);
        assert_eq!(RiskFreeRate::from_percent(0.0).unwrap().as_decimal(), 0.0);
        assert!(RiskFreeRate::from_percent(-1.0).is_err());
        assert!(RiskFreeRate::from_percent(100.5).is_err());
        assert!(RiskFreeRate::from_percent(f64::NAN).is_err());
    }

    #[test]
    fn test_metric_value_serde_and_errors() {
        let v = MetricValue::available(0.5);
        let json = serde_json::to_value(v).unwrap();
        assert_eq!(json["status"], "available");
        assert_eq!(json["value"], 0.5);

        let na = MetricValue::unavailable(UnavailableReason::ZeroVariance);
        let json = serde_json::to_value(na).unwrap();
        assert_eq!(json["status"], "not_available");
        assert_eq!(json["reason"], "zero_variance");

        assert!(matches!(
            na.into_result("Sharpe"),
            Err(AnalysisError::NumericDegenerate(_))
        ));
        assert!(matches!(
            MetricValue::unavailable(UnavailableReason::InsufficientHistory).into_result("CAGR"),
            Err(AnalysisError::InsufficientHistory(_))
        ));
        assert_eq!(v.into_result("Total Return").unwrap(), 0.5);
    }

    #[test]
    fn test_data_table_scaled() {
        let t = DataTable {
            dates: days(2),
            symbols: vec!["A".into()],
            columns: vec![vec![0.01, -0.02]],
        };
        let pct = t.scaled(100.0);
        assert_eq!(pct.column("A").unwrap(), &[1.0, -2.0]);
        assert!(t.column("B").is_none());
    }
}
