//! HTTP front end: validates analysis requests, fetches prices, and publishes
//! the HTML and CSV reports under `/static/reports`.

use std::net::SocketAddr;
use std::sync::Arc;

use analysis_core::{AnalysisError, PriceSource};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use price_client::YahooFinanceClient;
use serde::Serialize;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod admission;
pub mod analyze_routes;
pub mod config;
pub mod request_id;

use admission::{AdmissionControl, AdmissionError};
use config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub prices: Arc<dyn PriceSource>,
    pub config: Arc<ServerConfig>,
    pub admission: Arc<AdmissionControl>,
}

impl AppState {
    pub fn new(prices: Arc<dyn PriceSource>, config: ServerConfig) -> Self {
        let admission =
            AdmissionControl::new(config.max_concurrent_per_ip, config.max_concurrent_global);
        Self {
            prices,
            config: Arc::new(config),
            admission,
        }
    }
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Handler error carrying the status it should be reported with.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn analysis(err: AnalysisError) -> Self {
        let status = match &err {
            e if e.is_validation() => StatusCode::BAD_REQUEST,
            AnalysisError::NoDataAvailable(_) => StatusCode::NOT_FOUND,
            AnalysisError::ApiError(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::with_status(status, err.into())
    }

    pub fn admission(err: AdmissionError) -> Self {
        let status = match err {
            AdmissionError::ClientLimit => StatusCode::TOO_MANY_REQUESTS,
            AdmissionError::ServerBusy => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::with_status(status, err.into())
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Internal details stay in the log; the client gets a generic message.
        let message = if self.status.is_server_error() && self.status != StatusCode::BAD_GATEWAY
        {
            tracing::error!(status = %self.status, error = ?self.error, "request failed");
            match self.status {
                StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                    self.error.to_string()
                }
                _ => "Analysis failed. Please try again.".to_string(),
            }
        } else {
            tracing::warn!(status = %self.status, error = %self.error, "request rejected");
            self.error.to_string()
        };

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        };
        (self.status, Json(body)).into_response()
    }
}

async fn health() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::ok("healthy"))
}

pub fn build_router(state: AppState) -> Router {
    let reports = ServeDir::new(&state.config.reports_dir);

    Router::new()
        .route("/health", get(health))
        .merge(analyze_routes::analyze_routes())
        .nest_service("/static/reports", reports)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "api_server=info,quant_analysis=info,price_client=info,reporting=info,tower_http=info"
            .into()
    });
    let json = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;
    tokio::fs::create_dir_all(&config.reports_dir).await?;

    let prices: Arc<dyn PriceSource> = Arc::new(YahooFinanceClient::new(config.retry));
    let addr = config.bind_addr();
    let app = build_router(AppState::new(prices, config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "security performance api listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
