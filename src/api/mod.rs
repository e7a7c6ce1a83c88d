//! HTTP API surface

pub mod routes;

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::arbitrage::{FeeModel, FundingScanner, OpportunityScanner};
use crate::cache::QuoteCache;
use crate::config::Config;
use crate::errors::ArbError;
use crate::execution::ExecutionDispatcher;
use crate::network::{ProviderClient, RateLimiter};
use crate::risk::RiskGate;
use crate::storage::Store;

pub struct AppState {
    pub config: Config,
    pub cache: Arc<QuoteCache>,
    pub provider: Arc<ProviderClient>,
    pub limiter: Arc<RateLimiter>,
    pub scanner: OpportunityScanner,
    pub funding: FundingScanner,
    pub fees: FeeModel,
    pub gate: Arc<RiskGate>,
    pub dispatcher: ExecutionDispatcher,
    pub store: Arc<dyn Store>,
    pub started_at: Instant,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wires every component against one store and one provider client.
    pub fn new(config: Config, store: Arc<dyn Store>) -> anyhow::Result<SharedState> {
        let provider = Arc::new(ProviderClient::new(&config)?);
        let limiter = Arc::new(RateLimiter::new(config.provider_min_interval_ms));
        let cache = Arc::new(QuoteCache::new(
            provider.clone(),
            limiter.clone(),
            store.clone(),
            &config,
        ));
        let gate = Arc::new(RiskGate::new(store.clone(), &config));
        let dispatcher = ExecutionDispatcher::new(store.clone(), gate.clone());

        Ok(Arc::new(Self {
            scanner: OpportunityScanner::from_config(&config),
            funding: FundingScanner::default(),
            fees: FeeModel::default(),
            cache,
            provider,
            limiter,
            gate,
            dispatcher,
            store,
            config,
            started_at: Instant::now(),
        }))
    }
}

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(routes::health))
        .route("/market/ticker", get(routes::market_ticker))
        .route("/market/price", get(routes::market_price))
        .route("/market/orderbook", get(routes::market_orderbook))
        .route("/market/klines", get(routes::market_klines))
        .route("/arbitrage/scan", post(routes::arbitrage_scan))
        .route("/arbitrage/execute", post(routes::arbitrage_execute))
        .route("/funding/scan", post(routes::funding_scan))
        .route("/funding/execute", post(routes::funding_execute))
        .route("/funding/positions", get(routes::funding_positions))
        .route("/funding/history", get(routes::funding_history))
        .route("/funding/close", post(routes::funding_close))
        .route("/risk/state", get(routes::risk_state))
        .route("/risk/kill-switch", post(routes::risk_kill_switch))
        .route("/risk/reduce-only", post(routes::risk_reduce_only))
        .route("/risk/reset-pnl", post(routes::risk_reset_pnl))
        .layer(cors)
        .with_state(state)
}

/// Binds and serves the API until ctrl-c.
pub async fn serve(state: SharedState) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("🚀 API listening on {}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("📛 Shutdown signal received");
    }
}

impl IntoResponse for ArbError {
    fn into_response(self) -> Response {
        let status = match &self {
            ArbError::InvalidRequest { .. } | ArbError::UnmappedSymbol { .. } => {
                StatusCode::BAD_REQUEST
            }
            ArbError::RiskGateDenied { .. } => StatusCode::FORBIDDEN,
            ArbError::PositionNotFound { .. } => StatusCode::NOT_FOUND,
            ArbError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ArbError::UpstreamRateLimited { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ArbError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            ArbError::ExecutionFailure { .. } | ArbError::Storage { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let mut body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        if let Some(reason) = self.deny_reason() {
            body["reason"] = json!(reason.as_str());
        }
        (status, Json(body)).into_response()
    }
}
