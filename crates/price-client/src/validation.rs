use analysis_core::AnalysisError;
use chrono::NaiveDate;

pub const MAX_SYMBOLS: usize = 10;
pub const MIN_RANGE_DAYS: i64 = 30;

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '^')
}

/// Parse a comma-separated symbol list: trimmed, upper-cased, 1..=10 entries.
pub fn validate_symbols(raw: &str) -> Result<Vec<String>, AnalysisError> {
    let symbols: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();

    if symbols.is_empty() {
        return Err(AnalysisError::InvalidInputData("No symbols provided".to_string()));
    }
    if symbols.len() > MAX_SYMBOLS {
        return Err(AnalysisError::InvalidInputData(format!(
            "Too many symbols (maximum {} allowed)",
            MAX_SYMBOLS
        )));
    }
    for (i, symbol) in symbols.iter().enumerate() {
        if !symbol.chars().all(is_symbol_char) {
            return Err(AnalysisError::InvalidInputData(format!(
                "Invalid symbol format: {}",
                symbol
            )));
        }
        if symbols[..i].contains(symbol) {
            return Err(AnalysisError::InvalidInputData(format!(
                "Duplicate symbol: {}",
                symbol
            )));
        }
    }

    Ok(symbols)
}

fn parse_date(label: &str, value: &str) -> Result<NaiveDate, AnalysisError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
        AnalysisError::InvalidInputData(format!(
            "Invalid {} '{}'. Use YYYY-MM-DD: {}",
            label, value, e
        ))
    })
}

/// Validate a request date range against `today`.
pub fn validate_date_range(
    start: &str,
    end: &str,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), AnalysisError> {
    let start = parse_date("start date", start)?;
    let end = parse_date("end date", end)?;

    if start >= end {
        return Err(AnalysisError::InvalidInputData(
            "Start date must be before end date".to_string(),
        ));
    }
    let min_start = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN);
    if start < min_start {
        return Err(AnalysisError::InvalidInputData(format!(
            "Start date too early (minimum: {})",
            min_start
        )));
    }
    if end > today {
        return Err(AnalysisError::InvalidInputData(
            "End date cannot be in the future".to_string(),
        ));
    }
    let span = (end - start).num_days();
    if span < MIN_RANGE_DAYS {
        return Err(AnalysisError::InvalidInputData(format!(
            "Date range too short (minimum {} days required)",
            MIN_RANGE_DAYS
        )));
    }

    tracing::debug!(%start, %end, days = span, "date range validated");
    Ok((start, end))
}
