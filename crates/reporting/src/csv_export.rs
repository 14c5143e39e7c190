use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use analysis_core::{ExportTable, MetricValue, PerformanceReport, SymbolPeriodReturns};
use quant_analysis::DataProcessor;
use serde::{Deserialize, Serialize};

use crate::ReportError;

/// File names (not paths) of every CSV written for one report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvFiles {
    pub price_data: String,
    pub daily_returns: String,
    pub cumulative_returns: String,
    pub correlation_matrix: String,
    pub monthly_returns: String,
    pub summary_statistics: String,
}

impl CsvFiles {
    pub fn for_base(base: &str) -> Self {
        Self {
            price_data: format!("{}_processed_price_data.csv", base),
            daily_returns: format!("{}_daily_returns.csv", base),
            cumulative_returns: format!("{}_cumulative_returns.csv", base),
            correlation_matrix: format!("{}_correlation_matrix.csv", base),
            monthly_returns: format!("{}_monthly_returns.csv", base),
            summary_statistics: format!("{}_summary_statistics.csv", base),
        }
    }

    /// (dataset key, file name) pairs in a stable order.
    pub fn entries(&self) -> [(&'static str, &str); 6] {
        [
            ("price_data", self.price_data.as_str()),
            ("daily_returns", self.daily_returns.as_str()),
            ("cumulative_returns", self.cumulative_returns.as_str()),
            ("correlation_matrix", self.correlation_matrix.as_str()),
            ("monthly_returns", self.monthly_returns.as_str()),
            ("summary_statistics", self.summary_statistics.as_str()),
        ]
    }
}

/// Shortest round-trip text for a cell; missing and non-finite cells are empty.
pub fn format_cell(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => v.to_string(),
        _ => String::new(),
    }
}

fn metric_cell(value: &MetricValue) -> String {
    format_cell(value.value())
}

pub fn write_table<W: Write>(table: &ExportTable, writer: W) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = Vec::with_capacity(table.columns.len() + 1);
    header.push(table.index_label.as_str());
    header.extend(table.columns.iter().map(String::as_str));
    wtr.write_record(&header)?;

    for (label, row) in table.index.iter().zip(&table.rows) {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(label.clone());
        record.extend(row.iter().map(|v| format_cell(*v)));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Long format: one row per symbol and month, returns in percent.
pub fn write_monthly_returns<W: Write>(
    returns: &[SymbolPeriodReturns],
    writer: W,
) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["Symbol", "Year", "Month", "Return_%"])?;

    for symbol in returns {
        for m in &symbol.monthly {
            wtr.write_record([
                symbol.symbol.clone(),
                m.year.to_string(),
                m.month.to_string(),
                format_cell(Some(m.return_value * 100.0)),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

/// One row per symbol with the four headline metrics (decimal units).
pub fn write_summary_statistics<W: Write>(
    report: &PerformanceReport,
    writer: W,
) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "Symbol",
        "Total Return",
        "CAGR",
        "Sharpe Ratio",
        "Sortino Ratio",
    ])?;

    for m in &report.symbols {
        wtr.write_record([
            m.symbol.clone(),
            metric_cell(&m.total_return),
            metric_cell(&m.cagr),
            metric_cell(&m.sharpe_ratio),
            metric_cell(&m.sortino_ratio),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

fn create(dir: &Path, name: &str) -> Result<BufWriter<File>, ReportError> {
    Ok(BufWriter::new(File::create(dir.join(name))?))
}

/// Write every dataset for one report into `dir`.
pub fn export_all(
    processor: &DataProcessor,
    report: &PerformanceReport,
    dir: &Path,
    base: &str,
) -> Result<CsvFiles, ReportError> {
    std::fs::create_dir_all(dir)?;
    let files = CsvFiles::for_base(base);
    let tables = processor.export_tables();

    write_table(&tables.price_data, create(dir, &files.price_data)?)?;
    write_table(&tables.daily_returns, create(dir, &files.daily_returns)?)?;
    write_table(&tables.cumulative_returns, create(dir, &files.cumulative_returns)?)?;
    write_table(&tables.correlation_matrix, create(dir, &files.correlation_matrix)?)?;
    write_monthly_returns(processor.monthly_returns(), create(dir, &files.monthly_returns)?)?;
    write_summary_statistics(report, create(dir, &files.summary_statistics)?)?;

    tracing::info!(
        dir = %dir.display(),
        base,
        rows = tables.daily_returns.rows.len(),
        "exported csv files"
    );
    Ok(files)
}
