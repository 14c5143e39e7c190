use analysis_core::{MonthlyReturn, PriceTable, SymbolPeriodReturns, YearlyReturn};
use chrono::{Datelike, NaiveDate};

use crate::drawdown::fill_forward;

/// Last observed price of each period, keyed by `key(date)`, in date order.
fn period_closes<K: PartialEq + Copy>(
    dates: &[NaiveDate],
    prices: &[Option<f64>],
    key: impl Fn(NaiveDate) -> K,
) -> (Option<f64>, Vec<(K, f64)>) {
    let mut first = None;
    let mut closes: Vec<(K, f64)> = Vec::new();

    for (date, price) in dates.iter().zip(fill_forward(prices)) {
        let Some(price) = price else { continue };
        if first.is_none() {
            first = Some(price);
        }
        let k = key(*date);
        if let Some((last_key, close)) = closes.last_mut() {
            if *last_key == k {
                *close = price;
                continue;
            }
        }
        closes.push((k, price));
    }

    (first, closes)
}

/// Period-over-period returns; the first period is measured from the first price.
fn chain<K: Copy>(first: Option<f64>, closes: &[(K, f64)]) -> Vec<(K, f64)> {
    let Some(mut base) = first else {
        return Vec::new();
    };
    closes
        .iter()
        .map(|&(k, close)| {
            let r = close / base - 1.0;
            base = close;
            (k, r)
        })
        .collect()
}

pub fn monthly_returns(dates: &[NaiveDate], prices: &[Option<f64>]) -> Vec<MonthlyReturn> {
    let (first, closes) = period_closes(dates, prices, |d| (d.year(), d.month()));
    chain(first, &closes)
        .into_iter()
        .map(|((year, month), return_value)| MonthlyReturn {
            year,
            month,
            return_value,
        })
        .collect()
}

pub fn yearly_returns(dates: &[NaiveDate], prices: &[Option<f64>]) -> Vec<YearlyReturn> {
    let (first, closes) = period_closes(dates, prices, |d| d.year());
    chain(first, &closes)
        .into_iter()
        .map(|(year, return_value)| YearlyReturn { year, return_value })
        .collect()
}

/// Monthly and yearly returns for every symbol of a raw price table.
pub fn period_returns(table: &PriceTable) -> Vec<SymbolPeriodReturns> {
    table
        .symbols()
        .iter()
        .zip(table.columns())
        .map(|(symbol, column)| SymbolPeriodReturns {
            symbol: symbol.clone(),
            monthly: monthly_returns(table.dates(), column),
            yearly: yearly_returns(table.dates(), column),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_month_end_to_month_end() {
        let dates = vec![
            d(2024, 1, 30),
            d(2024, 1, 31),
            d(2024, 2, 1),
            d(2024, 2, 29),
            d(2024, 3, 1),
        ];
        let prices = vec![Some(100.0), Some(110.0), Some(120.0), Some(121.0), Some(132.0)];

        let monthly = monthly_returns(&dates, &prices);
        assert_eq!(monthly.len(), 3);
        assert_eq!((monthly[0].year, monthly[0].month), (2024, 1));
        assert!((monthly[0].return_value - 0.1).abs() < 1e-12);
        assert!((monthly[1].return_value - 0.1).abs() < 1e-12);
        assert!((monthly[2].return_value - (132.0 / 121.0 - 1.0)).abs() < 1e-12);

        let yearly = yearly_returns(&dates, &prices);
        assert_eq!(yearly.len(), 1);
        assert!((yearly[0].return_value - 0.32).abs() < 1e-12);
    }

    #[test]
    fn test_gaps_and_year_boundary() {
        let dates = vec![d(2023, 12, 28), d(2023, 12, 29), d(2024, 1, 2), d(2024, 1, 3)];
        let prices = vec![None, Some(50.0), None, Some(55.0)];

        let monthly = monthly_returns(&dates, &prices);
        assert_eq!(monthly.len(), 2);
        assert_eq!(monthly[0].return_value, 0.0);
        assert!((monthly[1].return_value - 0.1).abs() < 1e-12);

        let yearly = yearly_returns(&dates, &prices);
        assert_eq!(yearly.iter().map(|y| y.year).collect::<Vec<_>>(), vec![2023, 2024]);
    }

    #[test]
    fn test_no_prices() {
        assert!(monthly_returns(&[d(2024, 1, 1)], &[None]).is_empty());
    }
}
