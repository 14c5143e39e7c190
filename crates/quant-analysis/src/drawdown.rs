use analysis_core::DrawdownEpisode;
use chrono::NaiveDate;

/// Pad missing prices with the last observed one. Leading gaps stay `None`.
pub fn fill_forward(prices: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut last = None;
    prices
        .iter()
        .map(|p| {
            if p.is_some() {
                last = *p;
            }
            last
        })
        .collect()
}

/// `price / running_peak - 1` for every row; 0 before the first observation.
pub fn drawdown_series(prices: &[Option<f64>]) -> Vec<f64> {
    let mut peak: Option<f64> = None;
    fill_forward(prices)
        .into_iter()
        .map(|p| match p {
            Some(price) => {
                let running = peak.map_or(price, |pk| pk.max(price));
                peak = Some(running);
                price / running - 1.0
            }
            None => 0.0,
        })
        .collect()
}

struct OpenEpisode {
    peak_idx: usize,
    trough_idx: usize,
    drawdown: f64,
}

/// Every stretch of [`drawdown_series`] below zero, most severe first.
///
/// An episode starts on the last row at the peak, bottoms at its deepest
/// row and ends on the first row back at zero. A decline still open at the
/// end of the series ends on the last date and is marked unrecovered.
pub fn drawdown_episodes(dates: &[NaiveDate], prices: &[Option<f64>]) -> Vec<DrawdownEpisode> {
    let series = drawdown_series(prices);
    let rows = series.len().min(dates.len());
    let mut episodes = Vec::new();
    let mut peak_idx = 0;
    let mut open: Option<OpenEpisode> = None;

    let close = |ep: OpenEpisode, end_idx: usize, recovered: bool| {
        let start = dates[ep.peak_idx];
        let end = dates[end_idx];
        DrawdownEpisode {
            start,
            trough: dates[ep.trough_idx],
            end,
            duration_days: (end - start).num_days(),
            drawdown: ep.drawdown,
            recovered,
        }
    };

    for (i, &dd) in series.iter().enumerate().take(rows) {
        if dd >= 0.0 {
            if let Some(ep) = open.take() {
                episodes.push(close(ep, i, true));
            }
            peak_idx = i;
            continue;
        }
        match open.as_mut() {
            Some(ep) if dd < ep.drawdown => {
                ep.drawdown = dd;
                ep.trough_idx = i;
            }
            Some(_) => {}
            None => {
                open = Some(OpenEpisode {
                    peak_idx,
                    trough_idx: i,
                    drawdown: dd,
                });
            }
        }
    }

    if let Some(ep) = open {
        episodes.push(close(ep, rows - 1, false));
    }

    episodes.sort_by(|a, b| a.drawdown.total_cmp(&b.drawdown));
    episodes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect()
    }

    fn some(prices: &[f64]) -> Vec<Option<f64>> {
        prices.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_drawdown_series() {
        let dd = drawdown_series(&[None, Some(100.0), Some(80.0), None, Some(120.0)]);
        assert_eq!(dd[0], 0.0);
        assert_eq!(dd[1], 0.0);
        assert!((dd[2] + 0.2).abs() < 1e-12);
        assert!((dd[3] + 0.2).abs() < 1e-12);
        assert_eq!(dd[4], 0.0);
    }

    #[test]
    fn test_deepest_episode_matches_series_minimum() {
        let prices = vec![None, Some(100.0), Some(120.0), Some(90.0), None, Some(130.0), Some(117.0)];
        let d = dates(prices.len());
        let series = drawdown_series(&prices);
        let deepest = series.iter().copied().fold(0.0, f64::min);
        assert!((deepest + 0.25).abs() < 1e-12);

        let episodes = drawdown_episodes(&d, &prices);
        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].drawdown, deepest);
        assert_eq!(episodes[0].start, d[2]);
        assert_eq!(episodes[0].trough, d[3]);
        // The padded gap stays under water; recovery comes with the next close.
        assert_eq!(episodes[0].end, d[5]);
        assert!(episodes[0].recovered);
        assert_eq!(episodes[1].start, d[5]);
        assert!(!episodes[1].recovered);
        assert!(drawdown_episodes(&dates(2), &[None, None]).is_empty());
    }

    #[test]
    fn test_episodes_sorted_by_severity() {
        let prices = some(&[100.0, 110.0, 96.0, 105.0, 110.0, 120.0, 108.0, 115.0]);
        let d = dates(prices.len());
        let episodes = drawdown_episodes(&d, &prices);
        assert_eq!(episodes.len(), 2);

        let first = &episodes[0];
        assert_eq!(first.start, d[1]);
        assert_eq!(first.trough, d[2]);
        assert_eq!(first.end, d[4]);
        assert_eq!(first.duration_days, 3);
        assert!(first.recovered);
        assert!((first.drawdown - (96.0 / 110.0 - 1.0)).abs() < 1e-12);

        let second = &episodes[1];
        assert_eq!(second.start, d[5]);
        assert_eq!(second.end, d[7]);
        assert!(!second.recovered);
        assert!((second.drawdown - (108.0 / 120.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_monotonic_series_has_no_episodes() {
        let prices = some(&[1.0, 2.0, 2.0, 3.0]);
        assert!(drawdown_episodes(&dates(4), &prices).is_empty());
    }
}
