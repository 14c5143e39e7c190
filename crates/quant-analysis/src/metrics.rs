use analysis_core::{DataTable, MetricValue, PerformanceReport, SymbolMetrics, UnavailableReason};
use chrono::NaiveDate;
use rayon::prelude::*;
use statrs::statistics::Statistics;

/// Annualization factor for the ratio metrics (calendar days).
pub const PERIODS_PER_YEAR: f64 = 365.0;

/// Calendar days per year used to turn elapsed time into years for CAGR.
pub const DAYS_PER_YEAR: f64 = 365.25;

/// A deviation that is exactly zero or not a number leaves the ratio undefined.
fn degenerate_deviation(std_dev: f64) -> bool {
    !std_dev.is_finite() || std_dev == 0.0
}

fn sanitize(returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .map(|&r| if r.is_finite() { r } else { 0.0 })
        .collect()
}

/// De-annualize a risk-free rate to a per-period rate.
pub fn daily_risk_free_rate(annual_rate: f64) -> f64 {
    if annual_rate > 0.0 {
        (1.0 + annual_rate).powf(1.0 / PERIODS_PER_YEAR) - 1.0
    } else {
        0.0
    }
}

fn excess_returns(returns: &[f64], annual_rate: f64) -> Vec<f64> {
    let rf = daily_risk_free_rate(annual_rate);
    returns.iter().map(|r| r - rf).collect()
}

fn growth_factor(returns: &[f64]) -> f64 {
    returns.iter().fold(1.0, |acc, r| acc * (1.0 + r))
}

/// Compounded return over the whole series.
pub fn total_return(returns: &[f64]) -> MetricValue {
    if returns.is_empty() {
        return MetricValue::unavailable(UnavailableReason::InsufficientHistory);
    }
    MetricValue::available(growth_factor(&sanitize(returns)) - 1.0)
}

/// Compound annual growth rate between the first and last date.
pub fn cagr(first: NaiveDate, last: NaiveDate, returns: &[f64]) -> MetricValue {
    if returns.len() < 2 {
        return MetricValue::unavailable(UnavailableReason::InsufficientHistory);
    }

    let years = (last - first).num_days() as f64 / DAYS_PER_YEAR;
    if years <= 0.0 {
        return MetricValue::unavailable(UnavailableReason::NonPositiveElapsedTime);
    }

    let factor = growth_factor(&sanitize(returns));
    if factor <= 0.0 {
        return MetricValue::unavailable(UnavailableReason::NonPositiveGrowthFactor);
    }

    MetricValue::available(factor.powf(1.0 / years) - 1.0)
}

/// Annualized Sharpe ratio: mean excess return over its sample deviation.
pub fn sharpe_ratio(returns: &[f64], annual_risk_free_rate: f64) -> MetricValue {
    if returns.len() < 2 {
        return MetricValue::unavailable(UnavailableReason::InsufficientHistory);
    }

    let excess = excess_returns(&sanitize(returns), annual_risk_free_rate);
    let mean = excess.as_slice().mean();
    let std_dev = excess.as_slice().std_dev();

    tracing::debug!(n = excess.len(), mean, std_dev, "sharpe inputs");

    // A constant series can leave rounding residue in the running variance.
    let constant = excess.windows(2).all(|w| w[0] == w[1]);
    if constant || degenerate_deviation(std_dev) {
        return MetricValue::unavailable(UnavailableReason::ZeroVariance);
    }

    MetricValue::available(mean / std_dev * PERIODS_PER_YEAR.sqrt())
}

/// Annualized Sortino ratio.
///
/// Downside deviation is `sqrt(sum(d^2 for negative excess d) / N)` where N
/// counts every observation, not only the negative ones.
pub fn sortino_ratio(returns: &[f64], annual_risk_free_rate: f64) -> MetricValue {
    if returns.len() < 2 {
        return MetricValue::unavailable(UnavailableReason::InsufficientHistory);
    }

    let excess = excess_returns(&sanitize(returns), annual_risk_free_rate);
    let downside: Vec<f64> = excess.iter().copied().filter(|&r| r < 0.0).collect();
    if downside.is_empty() {
        return MetricValue::unavailable(UnavailableReason::NoDownsideObservations);
    }

    let mean = excess.as_slice().mean();
    let downside_variance = downside.iter().map(|d| d * d).sum::<f64>() / excess.len() as f64;
    let downside_dev = downside_variance.sqrt();

    tracing::debug!(
        n = excess.len(),
        negatives = downside.len(),
        mean,
        downside_dev,
        "sortino inputs"
    );

    if degenerate_deviation(downside_dev) {
        return MetricValue::unavailable(UnavailableReason::ZeroVariance);
    }

    MetricValue::available(mean / downside_dev * PERIODS_PER_YEAR.sqrt())
}

pub fn symbol_metrics(
    symbol: &str,
    dates: &[NaiveDate],
    returns: &[f64],
    annual_risk_free_rate: f64,
) -> SymbolMetrics {
    let cagr = match (dates.first(), dates.last()) {
        (Some(&first), Some(&last)) => cagr(first, last, returns),
        _ => MetricValue::unavailable(UnavailableReason::InsufficientHistory),
    };

    SymbolMetrics {
        symbol: symbol.to_string(),
        total_return: total_return(returns),
        cagr,
        sharpe_ratio: sharpe_ratio(returns, annual_risk_free_rate),
        sortino_ratio: sortino_ratio(returns, annual_risk_free_rate),
    }
}

/// Metrics for every column of a decimal daily-returns table.
///
/// Symbols are evaluated independently and in parallel; the report keeps
/// column order.
pub fn performance_metrics(daily: &DataTable, annual_risk_free_rate: f64) -> PerformanceReport {
    let symbols: Vec<SymbolMetrics> = daily
        .symbols
        .par_iter()
        .zip(daily.columns.par_iter())
        .map(|(symbol, column)| symbol_metrics(symbol, &daily.dates, column, annual_risk_free_rate))
        .collect();

    let unavailable = symbols
        .iter()
        .flat_map(|m| [m.total_return, m.cagr, m.sharpe_ratio, m.sortino_ratio])
        .filter(|v| !v.is_available())
        .count();
    tracing::info!(
        symbols = symbols.len(),
        observations = daily.len(),
        risk_free_rate = annual_risk_free_rate,
        unavailable,
        "computed performance metrics"
    );

    PerformanceReport {
        risk_free_rate: annual_risk_free_rate,
        symbols,
    }
}
