use std::sync::OnceLock;

use analysis_core::{
    stats, AnalysisError, CorrelationMatrix, DataSummary, DataTable, DrawdownEpisode,
    ExportTables, PerformanceReport, PriceTable, RiskFreeRate, SymbolPeriodReturns, SymbolPrice,
    MIN_OBSERVATIONS,
};

use crate::{correlation, drawdown, export, metrics, monthly, returns};

/// Request-scoped owner of a raw price table and everything derived from it.
///
/// Derived tables are computed once on first access and reused, so every
/// output built from one processor sees the same numbers.
pub struct DataProcessor {
    raw: PriceTable,
    daily: OnceLock<DataTable>,
    daily_pct: OnceLock<DataTable>,
    cumulative: OnceLock<DataTable>,
    cumulative_pct: OnceLock<DataTable>,
    correlation: OnceLock<CorrelationMatrix>,
    exports: OnceLock<ExportTables>,
    period_returns: OnceLock<Vec<SymbolPeriodReturns>>,
}

impl DataProcessor {
    pub fn new(raw: PriceTable) -> Result<Self, AnalysisError> {
        let aligned = raw.aligned_rows();
        if aligned < MIN_OBSERVATIONS {
            tracing::error!(
                aligned_rows = aligned,
                required = MIN_OBSERVATIONS,
                "price table too short for analysis"
            );
            return Err(AnalysisError::InvalidInputData(format!(
                "need at least {} aligned observations, got {}",
                MIN_OBSERVATIONS, aligned
            )));
        }

        tracing::info!(
            symbols = ?raw.symbols(),
            rows = raw.len(),
            aligned_rows = aligned,
            "data processor initialized"
        );

        Ok(Self {
            raw,
            daily: OnceLock::new(),
            daily_pct: OnceLock::new(),
            cumulative: OnceLock::new(),
            cumulative_pct: OnceLock::new(),
            correlation: OnceLock::new(),
            exports: OnceLock::new(),
            period_returns: OnceLock::new(),
        })
    }

    pub fn raw_data(&self) -> &PriceTable {
        &self.raw
    }

    pub fn symbols(&self) -> &[String] {
        self.raw.symbols()
    }

    /// Daily returns over the effective period, decimal or percentage.
    pub fn daily_returns(&self, as_percentage: bool) -> &DataTable {
        let daily = self
            .daily
            .get_or_init(|| returns::daily_returns(&self.raw, false));
        if as_percentage {
            self.daily_pct.get_or_init(|| daily.scaled(100.0))
        } else {
            daily
        }
    }

    /// Cumulative returns compounded from [`Self::daily_returns`].
    pub fn cumulative_returns(&self, as_percentage: bool) -> &DataTable {
        let cumulative = self
            .cumulative
            .get_or_init(|| returns::compound(self.daily_returns(false)));
        if as_percentage {
            self.cumulative_pct.get_or_init(|| cumulative.scaled(100.0))
        } else {
            cumulative
        }
    }

    pub fn correlation_matrix(&self) -> &CorrelationMatrix {
        self.correlation
            .get_or_init(|| correlation::correlation_matrix(self.daily_returns(false)))
    }

    pub fn performance_metrics(&self, risk_free_rate: RiskFreeRate) -> PerformanceReport {
        metrics::performance_metrics(self.daily_returns(false), risk_free_rate.as_decimal())
    }

    /// Drawdown episodes of one symbol's raw prices, most severe first.
    pub fn drawdowns(&self, symbol: &str) -> Result<Vec<DrawdownEpisode>, AnalysisError> {
        let prices = self.raw.column_by_symbol(symbol).ok_or_else(|| {
            AnalysisError::InvalidInputData(format!("unknown symbol {}", symbol))
        })?;
        Ok(drawdown::drawdown_episodes(self.raw.dates(), prices))
    }

    pub fn top_drawdowns(
        &self,
        symbol: &str,
        n: usize,
    ) -> Result<Vec<DrawdownEpisode>, AnalysisError> {
        let mut episodes = self.drawdowns(symbol)?;
        episodes.truncate(n);
        Ok(episodes)
    }

    pub fn monthly_returns(&self) -> &[SymbolPeriodReturns] {
        self.period_returns
            .get_or_init(|| monthly::period_returns(&self.raw))
    }

    pub fn export_tables(&self) -> &ExportTables {
        self.exports.get_or_init(|| {
            export::export_tables(
                &self.raw,
                self.daily_returns(true),
                self.cumulative_returns(true),
                self.correlation_matrix(),
            )
        })
    }

    pub fn summary(&self) -> DataSummary {
        let daily = self.daily_returns(false);
        let dates = self.raw.dates();
        // Both tables are non-empty: construction guarantees at least one row.
        let raw_start = dates[0];
        let raw_end = dates[dates.len() - 1];

        let prices_at = |row: usize| -> Vec<SymbolPrice> {
            self.raw
                .symbols()
                .iter()
                .zip(self.raw.row(row))
                .map(|(symbol, price)| SymbolPrice {
                    symbol: symbol.clone(),
                    price: price.map(|p| stats::round_dp(p, 2)),
                })
                .collect()
        };

        DataSummary {
            raw_start,
            raw_end,
            effective_start: daily.first_date().unwrap_or(raw_start),
            effective_end: daily.last_date().unwrap_or(raw_end),
            raw_trading_days: self.raw.len(),
            effective_trading_days: daily.len(),
            symbols: self.raw.symbols().to_vec(),
            first_prices: prices_at(0),
            last_prices: prices_at(self.raw.len() - 1),
            has_missing_values: self.raw.has_missing_values(),
        }
    }
}
