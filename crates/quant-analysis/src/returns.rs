use analysis_core::{DataTable, PriceTable};

/// Simple period-over-period change of every column, aligned to the raw index.
///
/// Missing prices are padded with the last observed one, so a gap yields 0
/// and the next observation is measured against the last known price. The
/// first row, and any change that is not finite, is 0.
pub fn price_returns(table: &PriceTable) -> Vec<Vec<f64>> {
    table.columns().iter().map(|c| column_returns(c)).collect()
}

fn column_returns(column: &[Option<f64>]) -> Vec<f64> {
    let mut out = Vec::with_capacity(column.len());
    let mut last: Option<f64> = None;

    for cell in column {
        let current = cell.or(last);
        let change = match (last, current) {
            (Some(prev), Some(cur)) => {
                let r = cur / prev - 1.0;
                if r.is_finite() {
                    r
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };
        out.push(change);
        last = current;
    }

    out
}

/// First row of the effective period.
///
/// Each symbol's constraint is its first non-zero return; the latest of those
/// wins. Symbols that never move add no constraint, and with no constraint at
/// all nothing is trimmed.
pub fn effective_start(returns: &[Vec<f64>]) -> usize {
    returns
        .iter()
        .filter_map(|column| column.iter().position(|&r| r != 0.0))
        .max()
        .unwrap_or(0)
}

/// Daily returns over the effective period: every row at or after
/// [`effective_start`].
pub fn daily_returns(table: &PriceTable, as_percentage: bool) -> DataTable {
    let returns = price_returns(table);
    let start = effective_start(&returns);

    let columns = returns
        .into_iter()
        .map(|column| column[start..].to_vec())
        .collect();

    let daily = DataTable {
        dates: table.dates()[start..].to_vec(),
        symbols: table.symbols().to_vec(),
        columns,
    };

    if start > 0 {
        tracing::debug!(
            trimmed_rows = start,
            effective_start = %daily.dates[0],
            "trimmed leading rows without price movement"
        );
    }

    if as_percentage {
        daily.scaled(100.0)
    } else {
        daily
    }
}

/// Compound a decimal daily-returns table: running product of `1 + r`, minus 1.
///
/// The first row carries that day's return, so it is 0 only when the period
/// was not trimmed.
pub fn compound(daily: &DataTable) -> DataTable {
    let columns = daily
        .columns
        .iter()
        .map(|column| {
            let mut growth = 1.0;
            column
                .iter()
                .map(|r| {
                    growth *= 1.0 + r;
                    growth - 1.0
                })
                .collect()
        })
        .collect();

    DataTable {
        dates: daily.dates.clone(),
        symbols: daily.symbols.clone(),
        columns,
    }
}

pub fn cumulative_returns(table: &PriceTable, as_percentage: bool) -> DataTable {
    let cumulative = compound(&daily_returns(table, false));
    if as_percentage {
        cumulative.scaled(100.0)
    } else {
        cumulative
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect()
    }

    #[test]
    fn test_price_returns_pads_gaps() {
        let table = PriceTable::new(
            dates(4),
            vec!["A".into()],
            vec![vec![Some(100.0), None, Some(110.0), Some(99.0)]],
        )
        .unwrap();
        let r = price_returns(&table);
        assert_eq!(r[0][0], 0.0);
        assert_eq!(r[0][1], 0.0);
        assert!((r[0][2] - 0.1).abs() < 1e-12);
        assert!((r[0][3] + 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_leading_missing_values_are_zero() {
        let table = PriceTable::new(
            dates(3),
            vec!["A".into()],
            vec![vec![None, Some(50.0), Some(55.0)]],
        )
        .unwrap();
        let r = price_returns(&table);
        assert_eq!(r[0][..2], [0.0, 0.0]);
        assert!((r[0][2] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_effective_start_ignores_flat_symbols() {
        let returns = vec![vec![0.0, 0.0, 0.0], vec![0.0, 0.0, 0.01]];
        assert_eq!(effective_start(&returns), 2);
        let returns = vec![vec![0.0, 0.03, 0.0, 0.0], vec![0.0, 0.0, 0.0, -0.01]];
        assert_eq!(effective_start(&returns), 3);
        assert_eq!(effective_start(&[vec![0.0; 4]]), 0);
    }

    #[test]
    fn test_constant_prices_give_zero_returns() {
        let table =
            PriceTable::from_prices(dates(5), vec!["FLAT".into()], vec![vec![42.0; 5]]).unwrap();
        let daily = daily_returns(&table, false);
        assert_eq!(daily.len(), 5);
        assert!(daily.columns[0].iter().all(|&r| r == 0.0));
        let cumulative = cumulative_returns(&table, true);
        assert!(cumulative.columns[0].iter().all(|&r| r == 0.0));
    }

    #[test]
    fn test_percentage_scaling() {
        let table = PriceTable::from_prices(
            dates(3),
            vec!["A".into()],
            vec![vec![100.0, 102.0, 102.0]],
        )
        .unwrap();
        let pct = daily_returns(&table, true);
        assert_eq!(pct.len(), 2);
        assert!((pct.columns[0][0] - 2.0).abs() < 1e-9);
        assert_eq!(pct.columns[0][1], 0.0);
        let cum = cumulative_returns(&table, true);
        assert!((cum.columns[0][0] - 2.0).abs() < 1e-9);
        assert!((cum.columns[0][1] - 2.0).abs() < 1e-9);
    }
}
