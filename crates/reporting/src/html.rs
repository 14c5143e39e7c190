use std::fmt::Write as _;

use analysis_core::{
    DataSummary, DrawdownEpisode, MetricValue, PerformanceReport, RiskFreeRate,
    SymbolPeriodReturns, SymbolPrice, DATE_FORMAT,
};
use chrono::{DateTime, Utc};
use quant_analysis::DataProcessor;

use crate::{CsvFiles, ReportError};

/// Drawdown episodes listed per symbol.
pub const TOP_DRAWDOWNS: usize = 10;

const METRIC_ROWS: [(&str, bool); 4] = [
    ("Total Return", true),
    ("CAGR", true),
    ("Sharpe Ratio", false),
    ("Sortino Ratio", false),
];

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Percent with two decimals for growth metrics, plain two decimals for ratios.
pub fn format_metric(value: &MetricValue, as_percent: bool) -> String {
    match value.value() {
        Some(v) if as_percent => format!("{:.2}%", v * 100.0),
        Some(v) => format!("{:.2}", v),
        None => "N/A".to_string(),
    }
}

fn format_prices(prices: &[SymbolPrice]) -> String {
    prices
        .iter()
        .map(|p| match p.price {
            Some(v) => format!("{}: {:.2}", escape_html(&p.symbol), v),
            None => format!("{}: N/A", escape_html(&p.symbol)),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn summary_section(summary: &DataSummary, risk_free_rate: RiskFreeRate) -> String {
    let note = if summary.period_was_trimmed() {
        r#"<p class="note">Analysis period may differ from the raw data: it begins once every symbol has recorded a price change.</p>"#
    } else {
        ""
    };
    let missing = if summary.has_missing_values {
        r#"<p class="note">Some symbols have missing prices in the raw data.</p>"#
    } else {
        ""
    };

    format!(
        r#"<section>
  <h2>Data Summary</h2>
  <table class="kv">
    <tr><td>Analysis Period</td><td>{eff_start} to {eff_end}</td></tr>
    <tr><td>Trading Days (Analysis)</td><td>{eff_days}</td></tr>
    <tr><td>Raw Data Period</td><td>{raw_start} to {raw_end}</td></tr>
    <tr><td>Trading Days (Raw)</td><td>{raw_days}</td></tr>
    <tr><td>Risk-Free Rate</td><td>{rf:.2}% (annual)</td></tr>
    <tr><td>First Prices</td><td>{first}</td></tr>
    <tr><td>Last Prices</td><td>{last}</td></tr>
  </table>
  {note}{missing}
</section>"#,
        eff_start = summary.effective_start.format(DATE_FORMAT),
        eff_end = summary.effective_end.format(DATE_FORMAT),
        eff_days = summary.effective_trading_days,
        raw_start = summary.raw_start.format(DATE_FORMAT),
        raw_end = summary.raw_end.format(DATE_FORMAT),
        raw_days = summary.raw_trading_days,
        rf = risk_free_rate.as_percent(),
        first = format_prices(&summary.first_prices),
        last = format_prices(&summary.last_prices),
    )
}

fn metrics_section(report: &PerformanceReport) -> String {
    let mut header = String::from("<th>Metric</th>");
    for m in &report.symbols {
        let _ = write!(header, "<th>{}</th>", escape_html(&m.symbol));
    }

    let values: Vec<[MetricValue; 4]> = report
        .symbols
        .iter()
        .map(|m| [m.total_return, m.cagr, m.sharpe_ratio, m.sortino_ratio])
        .collect();

    let mut body = String::new();
    for (i, (name, as_percent)) in METRIC_ROWS.iter().enumerate() {
        let _ = write!(body, "<tr><td>{}</td>", name);
        for v in &values {
            let _ = write!(body, "<td>{}</td>", format_metric(&v[i], *as_percent));
        }
        body.push_str("</tr>\n");
    }

    format!(
        r#"<section>
  <h2>Overall Returns and Risk Measures</h2>
  <table>
    <thead><tr>{header}</tr></thead>
    <tbody>
{body}    </tbody>
  </table>
  <p class="note">Sharpe and Sortino ratios calculated using {rf:.2}% annual risk-free rate.</p>
</section>"#,
        rf = report.risk_free_rate * 100.0,
    )
}

fn drawdown_table(symbol: &str, episodes: &[DrawdownEpisode]) -> String {
    let title = escape_html(symbol);
    if episodes.is_empty() {
        return format!("<h3>{title}</h3>\n<p>No significant drawdowns found.</p>\n");
    }

    let mut rows = String::new();
    for ep in episodes {
        let _ = writeln!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.2}%</td></tr>",
            ep.start.format(DATE_FORMAT),
            ep.trough.format(DATE_FORMAT),
            if ep.recovered {
                ep.end.format(DATE_FORMAT).to_string()
            } else {
                format!("{} (ongoing)", ep.end.format(DATE_FORMAT))
            },
            ep.duration_days,
            ep.drawdown * 100.0
        );
    }

    format!(
        r#"<h3>{title}</h3>
<table>
  <thead><tr><th>Start</th><th>Trough</th><th>End</th><th>Duration (Days)</th><th>Drawdown</th></tr></thead>
  <tbody>
{rows}  </tbody>
</table>
"#
    )
}

fn monthly_section(returns: &SymbolPeriodReturns) -> String {
    let mut years: Vec<i32> = returns.monthly.iter().map(|m| m.year).collect();
    years.dedup();

    let mut header = String::from("<th>Year</th>");
    for m in MONTHS {
        let _ = write!(header, "<th>{}</th>", m);
    }
    header.push_str("<th>YTD</th>");

    let mut body = String::new();
    for year in years {
        let _ = write!(body, "<tr><td>{}</td>", year);
        for month in 1..=12u32 {
            let cell = returns
                .monthly
                .iter()
                .find(|m| m.year == year && m.month == month)
                .map(|m| format!("{:.2}%", m.return_value * 100.0))
                .unwrap_or_else(|| "-".to_string());
            let _ = write!(body, "<td>{}</td>", cell);
        }
        let ytd = returns
            .yearly
            .iter()
            .find(|y| y.year == year)
            .map(|y| format!("{:.2}%", y.return_value * 100.0))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(body, "<td>{}</td></tr>", ytd);
    }

    format!(
        r#"<section>
  <h2>Monthly Returns - {symbol}</h2>
  <table>
    <thead><tr>{header}</tr></thead>
    <tbody>
{body}    </tbody>
  </table>
</section>"#,
        symbol = escape_html(&returns.symbol),
    )
}

fn downloads_section(files: &CsvFiles) -> String {
    let mut items = String::new();
    for (key, name) in files.entries() {
        let name = escape_html(name);
        let _ = writeln!(items, r#"    <li><a href="{name}">{key}</a></li>"#);
    }
    format!("<section>\n  <h2>Data Downloads</h2>\n  <ul>\n{items}  </ul>\n</section>")
}

/// Render the full HTML report for one processor.
///
/// CSV links are relative, so the report must be served from the same
/// directory as the files in `csv_files`.
pub fn render_html_report(
    processor: &DataProcessor,
    report: &PerformanceReport,
    risk_free_rate: RiskFreeRate,
    csv_files: &CsvFiles,
    generated_at: DateTime<Utc>,
) -> Result<String, ReportError> {
    let summary = processor.summary();

    let mut drawdowns = String::new();
    for symbol in processor.symbols() {
        let episodes = processor.top_drawdowns(symbol, TOP_DRAWDOWNS)?;
        drawdowns.push_str(&drawdown_table(symbol, &episodes));
    }

    let monthly: String = processor
        .monthly_returns()
        .iter()
        .map(monthly_section)
        .collect::<Vec<_>>()
        .join("\n");

    let title = summary
        .symbols
        .iter()
        .map(|s| escape_html(s))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width,initial-scale=1">
<title>Security Performance Report - {title}</title>
<style>
body {{ margin:0; padding:24px; background:#f1f5f9; color:#1e293b; font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif; }}
section {{ background:#fff; border-radius:8px; box-shadow:0 1px 3px rgba(0,0,0,0.1); padding:16px 20px; margin-bottom:24px; overflow-x:auto; }}
table {{ border-collapse:collapse; width:100%; font-variant-numeric:tabular-nums; }}
th, td {{ padding:6px 10px; border-bottom:1px solid #e2e8f0; text-align:right; }}
th:first-child, td:first-child {{ text-align:left; }}
.kv td {{ text-align:left; }}
.note {{ color:#64748b; font-size:13px; }}
</style>
</head>
<body>
<h1>Security Performance Report</h1>
<p class="note">{title} &middot; generated {generated} UTC</p>
{summary}
{metrics}
<section>
  <h2>Drawdown Analysis</h2>
{drawdowns}</section>
{monthly}
{downloads}
<p class="note">This report is for informational purposes only and should not be considered as investment advice.</p>
</body>
</html>
"#,
        generated = generated_at.format("%Y-%m-%d %H:%M:%S"),
        summary = summary_section(&summary, risk_free_rate),
        metrics = metrics_section(report),
        downloads = downloads_section(csv_files),
    ))
}
