use analysis_core::{AnalysisError, PriceSource, PriceTable};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub mod align;
pub mod validation;

pub use align::{align_closes, SymbolCloses};
pub use validation::{validate_date_range, validate_symbols};

const BASE_URL: &str = "https://query2.finance.yahoo.com";

/// How rate-limited requests are retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based): doubles each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff * 2u32.saturating_pow(attempt)
    }
}

/// Daily closing prices from the Yahoo Finance chart API.
#[derive(Clone)]
pub struct YahooFinanceClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl YahooFinanceClient {
    pub fn new(retry: RetryPolicy) -> Self {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: BASE_URL.to_string(),
            retry,
        }
    }

    /// Point the client at another host (used against local test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Send a request, retrying HTTP 429 with exponential backoff.
    async fn send_request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, AnalysisError> {
        let request = builder
            .build()
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;
        let attempts = self.retry.max_attempts.max(1);

        for attempt in 0..attempts {
            let req_clone = request
                .try_clone()
                .ok_or_else(|| AnalysisError::ApiError("Cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            if attempt + 1 < attempts {
                let wait = self.retry.backoff(attempt);
                tracing::warn!(
                    url = %request.url(),
                    attempt = attempt + 1,
                    attempts,
                    wait_secs = wait.as_secs_f64(),
                    "rate limited, backing off"
                );
                tokio::time::sleep(wait).await;
            }
        }

        tracing::error!(url = %request.url(), attempts, "rate limited on final attempt");
        Err(AnalysisError::ApiError(format!(
            "Rate limited after {} attempts",
            attempts
        )))
    }

    /// Daily closes for one symbol over `[start, end)`.
    pub async fn get_daily_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<SymbolCloses, AnalysisError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = end.and_time(NaiveTime::MIN).and_utc().timestamp();

        let response = self
            .send_request(self.client.get(&url).query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "div,splits".to_string()),
            ]))
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(AnalysisError::NoDataAvailable(format!(
                "No chart data for {}",
                symbol
            )));
        }
        if !status.is_success() {
            return Err(AnalysisError::ApiError(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            )));
        }

        let chart: ChartResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        parse_chart(symbol, chart)
    }
}

impl Default for YahooFinanceClient {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[async_trait]
impl PriceSource for YahooFinanceClient {
    async fn fetch_prices(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceTable, AnalysisError> {
        tracing::info!(?symbols, %start, %end, "fetching daily closes");

        let futures = symbols
            .iter()
            .map(|symbol| self.get_daily_closes(symbol, start, end));
        let results = futures_util::future::join_all(futures).await;

        let mut series = Vec::with_capacity(symbols.len());
        let mut last_error = None;
        for (symbol, result) in symbols.iter().zip(results) {
            match result {
                Ok(closes) => {
                    tracing::info!(symbol = %symbol, rows = closes.closes.len(), "received closes");
                    series.push(closes);
                }
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "skipping symbol");
                    last_error = Some(e);
                }
            }
        }

        if series.is_empty() {
            return Err(match last_error {
                Some(AnalysisError::ApiError(msg)) => AnalysisError::ApiError(msg),
                _ => AnalysisError::NoDataAvailable(format!(
                    "No data available for the provided symbols in the date range {} to {}",
                    start, end
                )),
            });
        }

        align_closes(&series)
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteIndicator>,
    #[serde(default)]
    adjclose: Vec<AdjCloseIndicator>,
}

#[derive(Debug, Deserialize)]
struct QuoteIndicator {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseIndicator {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Extract (exchange-local date, close) pairs, preferring adjusted closes.
fn parse_chart(symbol: &str, chart: ChartResponse) -> Result<SymbolCloses, AnalysisError> {
    if let Some(err) = chart.chart.error {
        return Err(AnalysisError::NoDataAvailable(format!(
            "{}: {} ({})",
            symbol, err.description, err.code
        )));
    }

    let result = chart
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| AnalysisError::NoDataAvailable(format!("No chart data for {}", symbol)))?;

    let closes = match result.indicators.adjclose.into_iter().next() {
        Some(adj) if !adj.adjclose.is_empty() => adj.adjclose,
        _ => result
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|q| q.close)
            .unwrap_or_default(),
    };

    let offset = result.meta.gmtoffset;
    let closes = result
        .timestamp
        .iter()
        .zip(closes)
        .filter_map(|(&ts, close)| {
            DateTime::from_timestamp(ts + offset, 0).map(|dt| (dt.date_naive(), close))
        })
        .collect::<Vec<_>>();

    if closes.is_empty() {
        return Err(AnalysisError::NoDataAvailable(format!(
            "No price rows for {}",
            symbol
        )));
    }

    Ok(SymbolCloses {
        symbol: symbol.to_string(),
        closes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const CHART_JSON: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "AAPL", "gmtoffset": -14400},
                "timestamp": [1704205800, 1704292200, 1704378600],
                "indicators": {
                    "quote": [{"close": [185.64, 184.25, null]}],
                    "adjclose": [{"adjclose": [184.73, 183.35, null]}]
                }
            }],
            "error": null
        }
    }"#;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_chart_prefers_adjclose() {
        let chart: ChartResponse = serde_json::from_str(CHART_JSON).unwrap();
        let parsed = parse_chart("AAPL", chart).unwrap();
        assert_eq!(parsed.closes.len(), 3);
        // 2024-01-02 14:30 UTC is 10:30 in New York
        assert_eq!(parsed.closes[0], (ymd(2024, 1, 2), Some(184.73)));
        assert_eq!(parsed.closes[2].1, None);
    }

    #[test]
    fn test_parse_chart_falls_back_to_close() {
        let json = CHART_JSON.replace(r#""adjclose": [{"adjclose": [184.73, 183.35, null]}]"#, r#""adjclose": []"#);
        let chart: ChartResponse = serde_json::from_str(&json).unwrap();
        let parsed = parse_chart("AAPL", chart).unwrap();
        assert_eq!(parsed.closes[1], (ymd(2024, 1, 3), Some(184.25)));
    }

    #[test]
    fn test_parse_chart_error() {
        let json = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#;
        let chart: ChartResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            parse_chart("ZZZZ", chart),
            Err(AnalysisError::NoDataAvailable(_))
        ));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(5),
        };
        assert_eq!(policy.backoff(0), Duration::from_secs(5));
        assert_eq!(policy.backoff(1), Duration::from_secs(10));
        assert_eq!(policy.backoff(2), Duration::from_secs(20));
    }

    async fn spawn_server(rate_limited_calls: usize) -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/v8/finance/chart/:symbol",
                get(
                    move |State(calls): State<Arc<AtomicUsize>>| async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        if n < rate_limited_calls {
                            return Err(StatusCode::TOO_MANY_REQUESTS);
                        }
                        let body: serde_json::Value = serde_json::from_str(CHART_JSON).unwrap();
                        Ok(Json(body))
                    },
                ),
            )
            .with_state(calls.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), calls)
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_retries_rate_limited_requests() {
        let (base, calls) = spawn_server(2).await;
        let client = YahooFinanceClient::new(fast_retry(3)).with_base_url(base);
        let closes = client
            .get_daily_closes("AAPL", ymd(2024, 1, 1), ymd(2024, 2, 1))
            .await
            .unwrap();
        assert_eq!(closes.closes.len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let (base, calls) = spawn_server(10).await;
        let client = YahooFinanceClient::new(fast_retry(2)).with_base_url(base);
        let err = client
            .get_daily_closes("AAPL", ymd(2024, 1, 1), ymd(2024, 2, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ApiError(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_prices_reports_short_history() {
        let (base, _) = spawn_server(0).await;
        let client = YahooFinanceClient::new(fast_retry(1)).with_base_url(base);
        let err = client
            .fetch_prices(&["AAPL".to_string()], ymd(2024, 1, 1), ymd(2024, 2, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientHistory(_)));
    }
}
