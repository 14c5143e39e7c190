use std::collections::{BTreeMap, BTreeSet};

use analysis_core::{AnalysisError, PriceTable, MIN_OBSERVATIONS};
use chrono::NaiveDate;

/// Longest run of missing rows bridged with the previous close.
pub const MAX_FILL_GAP: usize = 5;

/// Closing prices for one symbol as returned by a provider.
#[derive(Debug, Clone)]
pub struct SymbolCloses {
    pub symbol: String,
    pub closes: Vec<(NaiveDate, Option<f64>)>,
}

fn clean_closes(series: &SymbolCloses) -> BTreeMap<NaiveDate, f64> {
    let mut cleaned = BTreeMap::new();
    let mut duplicates = 0usize;
    let mut dropped = 0usize;

    for &(date, close) in &series.closes {
        match close {
            Some(p) if p.is_finite() && p > 0.0 => {
                if cleaned.contains_key(&date) {
                    duplicates += 1;
                } else {
                    cleaned.insert(date, p);
                }
            }
            _ => dropped += 1,
        }
    }

    if dropped > 0 || duplicates > 0 {
        tracing::debug!(
            symbol = %series.symbol,
            dropped,
            duplicates,
            "cleaned provider closes"
        );
    }
    cleaned
}

/// Forward-fill runs of at most `limit` missing cells after an observation.
fn fill_limited(column: &mut [Option<f64>], limit: usize) {
    let mut last = None;
    let mut run = 0usize;
    for cell in column.iter_mut() {
        match cell {
            Some(p) => {
                last = Some(*p);
                run = 0;
            }
            None => {
                run += 1;
                if run <= limit {
                    *cell = last;
                }
            }
        }
    }
}

/// Turn per-symbol closes into an aligned price table.
///
/// Each series is cleaned (non-positive and non-finite closes dropped,
/// duplicate dates keep the first), the series are outer-joined on date, short
/// gaps are forward-filled and rows still missing a symbol are dropped.
/// Symbols with no usable close are skipped.
pub fn align_closes(series: &[SymbolCloses]) -> Result<PriceTable, AnalysisError> {
    let cleaned: Vec<(String, BTreeMap<NaiveDate, f64>)> = series
        .iter()
        .filter_map(|s| {
            let closes = clean_closes(s);
            if closes.is_empty() {
                tracing::warn!(symbol = %s.symbol, "no usable closes, skipping symbol");
                None
            } else {
                Some((s.symbol.clone(), closes))
            }
        })
        .collect();

    if cleaned.is_empty() {
        return Err(AnalysisError::NoDataAvailable(
            "no valid prices for any requested symbol".to_string(),
        ));
    }

    let all_dates: Vec<NaiveDate> = cleaned
        .iter()
        .flat_map(|(_, closes)| closes.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut columns: Vec<Vec<Option<f64>>> = cleaned
        .iter()
        .map(|(_, closes)| all_dates.iter().map(|d| closes.get(d).copied()).collect())
        .collect();
    for column in &mut columns {
        fill_limited(column, MAX_FILL_GAP);
    }

    let keep: Vec<usize> = (0..all_dates.len())
        .filter(|&row| columns.iter().all(|c| c[row].is_some()))
        .collect();

    tracing::info!(
        symbols = cleaned.len(),
        union_rows = all_dates.len(),
        aligned_rows = keep.len(),
        "aligned closing prices"
    );

    if keep.len() < MIN_OBSERVATIONS {
        return Err(AnalysisError::InsufficientHistory(format!(
            "only {} aligned observations, at least {} required",
            keep.len(),
            MIN_OBSERVATIONS
        )));
    }

    let dates = keep.iter().map(|&row| all_dates[row]).collect();
    let columns = columns
        .iter()
        .map(|c| keep.iter().map(|&row| c[row]).collect())
        .collect();
    let symbols = cleaned.into_iter().map(|(symbol, _)| symbol).collect();

    PriceTable::new(dates, symbols, columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect()
    }

    fn series(symbol: &str, dates: &[NaiveDate], closes: &[Option<f64>]) -> SymbolCloses {
        SymbolCloses {
            symbol: symbol.to_string(),
            closes: dates.iter().copied().zip(closes.iter().copied()).collect(),
        }
    }

    #[test]
    fn test_fill_limited() {
        let mut col = vec![None, Some(1.0), None, None, None, Some(2.0)];
        fill_limited(&mut col, 2);
        assert_eq!(col, vec![None, Some(1.0), Some(1.0), Some(1.0), None, Some(2.0)]);
    }

    #[test]
    fn test_align_outer_join_and_fill() {
        let d = days(30);
        let a: Vec<Option<f64>> = (0..30).map(|i| Some(100.0 + i as f64)).collect();
        // B misses days 10..13 (filled) and starts on day 2 (dropped rows).
        let b_dates: Vec<NaiveDate> = d
            .iter()
            .copied()
            .enumerate()
            .filter(|(i, _)| *i >= 2 && !(10..13).contains(i))
            .map(|(_, date)| date)
            .collect();
        let b: Vec<Option<f64>> = b_dates.iter().map(|_| Some(50.0)).collect();

        let table = align_closes(&[series("A", &d, &a), series("B", &b_dates, &b)]).unwrap();
        assert_eq!(table.len(), 28);
        assert_eq!(table.dates()[0], d[2]);
        assert!(!table.has_missing_values());
        assert_eq!(table.symbols(), &["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_align_drops_bad_closes_and_duplicates() {
        let d = days(25);
        let mut dates = d.clone();
        dates.insert(1, d[0]);
        let mut closes: Vec<Option<f64>> = (0..26).map(|i| Some(10.0 + i as f64)).collect();
        // Rows 5..=7 carry d[4], d[5] and d[6].
        closes[5] = Some(-1.0);
        closes[6] = None;
        closes[7] = Some(f64::NAN);

        let table = align_closes(&[series("X", &dates, &closes)]).unwrap();
        assert_eq!(table.len(), 22);
        assert_eq!(table.dates()[0], d[0]);
        assert_eq!(table.column(0).unwrap()[0], Some(10.0));
        assert!(!table.dates().contains(&d[4]));
        assert_eq!(table.dates()[4], d[7]);
    }

    #[test]
    fn test_align_insufficient_history() {
        let d = days(10);
        let closes = vec![Some(1.0); 10];
        let err = align_closes(&[series("X", &d, &closes)]).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientHistory(_)));
    }

    #[test]
    fn test_align_skips_empty_symbols() {
        let d = days(22);
        let good = vec![Some(3.0); 22];
        let bad = vec![None; 22];
        let table = align_closes(&[series("GOOD", &d, &good), series("BAD", &d, &bad)]).unwrap();
        assert_eq!(table.symbols(), &["GOOD".to_string()]);

        let err = align_closes(&[series("BAD", &d, &bad)]).unwrap_err();
        assert!(matches!(err, AnalysisError::NoDataAvailable(_)));
    }
}
