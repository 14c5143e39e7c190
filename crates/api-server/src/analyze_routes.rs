use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;

use analysis_core::{DataSummary, PerformanceReport, PriceTable, RiskFreeRate};
use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use price_client::{validate_date_range, validate_symbols};
use quant_analysis::DataProcessor;
use reporting::{export_all, render_html_report, report_base_name, ReportError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::admission::client_ip;
use crate::config::{ConfigError, ServerConfig};
use crate::{ApiResponse, AppError, AppState};

const FINGERPRINT_LEN: usize = 12;

/// Symbols as either `"AAPL,MSFT"` or `["AAPL", "MSFT"]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SymbolList {
    Csv(String),
    List(Vec<String>),
}

impl SymbolList {
    fn joined(&self) -> String {
        match self {
            SymbolList::Csv(s) => s.clone(),
            SymbolList::List(items) => items.join(","),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub symbols: SymbolList,
    pub start_date: String,
    pub end_date: String,
    /// Annual rate in percent.
    #[serde(default)]
    pub risk_free_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub report_id: String,
    pub html_report_url: String,
    pub csv_urls: BTreeMap<String, String>,
    pub summary: DataSummary,
    pub metrics: PerformanceReport,
}

pub fn analyze_routes() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/api/analyze", post(analyze))
}

/// Short stable id for one normalized request.
pub fn request_fingerprint(
    symbols: &[String],
    start: NaiveDate,
    end: NaiveDate,
    risk_free_rate: RiskFreeRate,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(symbols.join(",").as_bytes());
    hasher.update(b"|");
    hasher.update(start.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(end.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(format!("{:.6}", risk_free_rate.as_percent()).as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(FINGERPRINT_LEN);
    digest
}

fn report_error(err: ReportError) -> AppError {
    match err {
        ReportError::Analysis(e) => AppError::analysis(e),
        other => AppError::with_status(StatusCode::INTERNAL_SERVER_ERROR, other.into()),
    }
}

async fn analyze(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<ApiResponse<AnalyzeResponse>>, AppError> {
    let ip = client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    let _permit = state
        .admission
        .try_acquire(&ip)
        .map_err(AppError::admission)?;

    let timeout = state.config.request_timeout;
    match tokio::time::timeout(timeout, run_analysis(state, req)).await {
        Ok(result) => result.map(|response| Json(ApiResponse::ok(response))),
        Err(_) => {
            tracing::warn!(%ip, timeout_secs = timeout.as_secs(), "analysis timed out");
            Err(AppError::with_status(
                StatusCode::GATEWAY_TIMEOUT,
                anyhow::anyhow!("Analysis timed out after {} seconds", timeout.as_secs()),
            ))
        }
    }
}

async fn run_analysis(state: AppState, req: AnalyzeRequest) -> Result<AnalyzeResponse, AppError> {
    let symbols = validate_symbols(&req.symbols.joined()).map_err(AppError::analysis)?;
    let today = Utc::now().date_naive();
    let (start, end) =
        validate_date_range(&req.start_date, &req.end_date, today).map_err(AppError::analysis)?;
    let risk_free_rate = RiskFreeRate::from_percent(req.risk_free_rate).map_err(AppError::analysis)?;
    let fingerprint = request_fingerprint(&symbols, start, end, risk_free_rate);

    tracing::info!(
        symbols = %symbols.join(","),
        %start,
        %end,
        risk_free_pct = risk_free_rate.as_percent(),
        %fingerprint,
        "analysis requested"
    );

    let prices = state
        .prices
        .fetch_prices(&symbols, start, end)
        .await
        .map_err(AppError::analysis)?;

    let config = state.config.clone();
    tokio::task::spawn_blocking(move || build_reports(&config, prices, risk_free_rate, &fingerprint))
        .await?
}

fn publish_urls(
    config: &ServerConfig,
    entries: &[(&'static str, &str)],
) -> Result<BTreeMap<String, String>, ConfigError> {
    entries
        .iter()
        .map(|&(key, name)| -> Result<(String, String), ConfigError> {
            Ok((key.to_string(), config.report_url(name)?))
        })
        .collect()
}

fn write_html(dir: &Path, name: &str, html: &str) -> std::io::Result<()> {
    std::fs::write(dir.join(name), html)
}

fn build_reports(
    config: &ServerConfig,
    prices: PriceTable,
    risk_free_rate: RiskFreeRate,
    fingerprint: &str,
) -> Result<AnalyzeResponse, AppError> {
    let processor = DataProcessor::new(prices).map_err(AppError::analysis)?;
    let metrics = processor.performance_metrics(risk_free_rate);

    let generated_at = Utc::now();
    let base = report_base_name(processor.symbols(), generated_at, fingerprint);
    let csv_files =
        export_all(&processor, &metrics, &config.reports_dir, &base).map_err(report_error)?;
    let html = render_html_report(&processor, &metrics, risk_free_rate, &csv_files, generated_at)
        .map_err(report_error)?;

    let html_name = format!("{}.html", base);
    write_html(&config.reports_dir, &html_name, &html)?;

    let html_report_url = config.report_url(&html_name)?;
    let csv_urls = publish_urls(config, &csv_files.entries())?;

    tracing::info!(report = %base, symbols = processor.symbols().len(), "report published");
    Ok(AnalyzeResponse {
        report_id: base,
        html_report_url,
        csv_urls,
        summary: processor.summary(),
        metrics,
    })
}
