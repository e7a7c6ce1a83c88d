//! Route handlers

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::warn;

use crate::api::SharedState;
use crate::config::{MAX_TRADE_SIZE_USD, MIN_TRADE_SIZE_USD};
use crate::errors::{ArbError, ArbResult};
use crate::network::symbols;
use crate::types::{
    ArbitrageOpportunity, BatchSource, BookLevel, Candle, DataQuality, ExecutionPath,
    ExecutionRecord, FundingOpportunity, HealthStatus, IntelligenceSignal, OrderBookSnapshot,
    Quote, RiskSettings, RiskState, SignalDirection,
};

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TickerQuery {
    pub symbols: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SymbolQuery {
    pub symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderBookQuery {
    pub symbol: Option<String>,
    pub depth: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct KlinesQuery {
    pub symbol: Option<String>,
    pub interval: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub symbol: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TickerResponse {
    pub tickers: Vec<Quote>,
    pub source: BatchSource,
    pub data_quality: DataQuality,
    pub trading_allowed: bool,
    pub cached_at: DateTime<Utc>,
    pub latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct PriceResponse {
    pub symbol: String,
    pub price: Decimal,
    pub change_24h: Decimal,
    pub data_quality: DataQuality,
    pub trading_allowed: bool,
    pub source: BatchSource,
    pub cached_at: DateTime<Utc>,
    pub latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct KlinesResponse {
    pub symbol: String,
    pub interval: String,
    pub candles: Vec<Candle>,
    pub source: BatchSource,
    pub data_quality: DataQuality,
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub symbols: Option<Vec<String>>,
    #[serde(default)]
    pub trade_size: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub opportunities: Vec<ArbitrageOpportunity>,
    pub scanned_symbols: Vec<String>,
    pub venue_quotes: usize,
    pub data_quality: DataQuality,
    pub scanned_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub opportunity: ArbitrageOpportunity,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub path: Option<ExecutionPath>,
}

#[derive(Debug, Serialize)]
pub struct FundingScanResponse {
    pub opportunities: Vec<FundingOpportunity>,
    pub metrics_scanned: usize,
    pub scanned_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct FundingExecuteRequest {
    pub opportunity: FundingOpportunity,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub path: Option<ExecutionPath>,
}

#[derive(Debug, Deserialize)]
pub struct CloseRequest {
    pub id: String,
    #[serde(default)]
    pub exit_value: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct KillSwitchRequest {
    pub active: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReduceOnlyRequest {
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// Health and market data
// ---------------------------------------------------------------------------

pub async fn health(State(state): State<SharedState>) -> Json<HealthStatus> {
    let probe = Instant::now();
    let stats = state.cache.stats();
    let latency_ms = probe.elapsed().as_millis() as u64;

    let upstream_ok = match stats.last_upstream_success {
        Some(at) => Utc::now().signed_duration_since(at).num_seconds() < 300,
        None => stats.fetch_failures == 0,
    };

    Json(HealthStatus {
        status: if upstream_ok { "ok" } else { "degraded" }.to_string(),
        cache_size: stats.entries,
        pending_fetches: stats.pending_fetches,
        upstream_ok,
        last_upstream_success: stats.last_upstream_success,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        latency_ms,
    })
}

pub async fn market_ticker(
    State(state): State<SharedState>,
    Query(query): Query<TickerQuery>,
) -> ArbResult<Json<TickerResponse>> {
    let started = Instant::now();
    let symbols_list = parse_symbols(query.symbols.as_deref(), &state.config.default_symbols)?;
    let batch = state.cache.get_quotes(&symbols_list).await;

    Ok(Json(TickerResponse {
        tickers: batch.quotes,
        source: batch.source,
        data_quality: batch.data_quality,
        trading_allowed: batch.trading_allowed,
        cached_at: batch.cached_at,
        latency_ms: started.elapsed().as_millis() as u64,
    }))
}

pub async fn market_price(
    State(state): State<SharedState>,
    Query(query): Query<SymbolQuery>,
) -> ArbResult<Json<PriceResponse>> {
    let started = Instant::now();
    let symbol = required_symbol(&query.symbol)?;
    let batch = state.cache.get_quotes(std::slice::from_ref(&symbol)).await;
    let quote = batch
        .quotes
        .first()
        .ok_or_else(|| ArbError::InvalidRequest {
            message: format!("unusable symbol: {}", symbol),
        })?;

    Ok(Json(PriceResponse {
        symbol: quote.symbol.clone(),
        price: quote.price,
        change_24h: quote.change_24h,
        data_quality: quote.quality,
        trading_allowed: quote.quality.trading_allowed(),
        source: batch.source,
        cached_at: batch.cached_at,
        latency_ms: started.elapsed().as_millis() as u64,
    }))
}

/// The upstream aggregates trades and has no depth feed, so the book is
/// synthesized around the last quote and always labelled derived or worse.
pub async fn market_orderbook(
    State(state): State<SharedState>,
    Query(query): Query<OrderBookQuery>,
) -> ArbResult<Json<OrderBookSnapshot>> {
    let symbol = required_symbol(&query.symbol)?;
    let depth = query.depth.unwrap_or(10).clamp(1, 50);
    let batch = state.cache.get_quotes(std::slice::from_ref(&symbol)).await;
    let quote = batch
        .quotes
        .first()
        .ok_or_else(|| ArbError::InvalidRequest {
            message: format!("unusable symbol: {}", symbol),
        })?;

    let mut bids = Vec::with_capacity(depth);
    let mut asks = Vec::with_capacity(depth);
    if quote.price > Decimal::ZERO {
        let base_size = if quote.volume_24h > Decimal::ZERO {
            (quote.volume_24h / quote.price / dec!(86400)).max(dec!(0.0001))
        } else {
            dec!(1)
        };
        let step = dec!(0.0005);
        for i in 0..depth {
            let level = Decimal::from(i as u64 + 1);
            let size = (base_size * level).round_dp(6);
            bids.push(BookLevel(
                (quote.bid * (Decimal::ONE - step * level)).round_dp(8),
                size,
            ));
            asks.push(BookLevel(
                (quote.ask * (Decimal::ONE + step * level)).round_dp(8),
                size,
            ));
        }
    }

    let quality = quote.quality.worse_of(DataQuality::Derived);
    Ok(Json(OrderBookSnapshot {
        symbol: quote.symbol.clone(),
        bids,
        asks,
        data_quality: quality,
        trading_allowed: quality.trading_allowed(),
        warning: Some("order book synthesized from last trade price".to_string()),
    }))
}

pub async fn market_klines(
    State(state): State<SharedState>,
    Query(query): Query<KlinesQuery>,
) -> ArbResult<Json<KlinesResponse>> {
    let symbol = required_symbol(&query.symbol)?;
    let canonical = symbols::canonical(&symbol);
    let interval = query.interval.unwrap_or_else(|| "1d".to_string());
    let days = match interval.as_str() {
        "1m" | "5m" | "15m" | "30m" | "1h" => 1,
        "4h" | "6h" | "12h" => 7,
        _ => 30,
    };
    let limit = query.limit.unwrap_or(100).min(500);

    let fetched = match symbols::provider_id(&canonical) {
        Some(id) => {
            state.limiter.acquire().await;
            match state.provider.ohlc(id, days).await {
                Ok(candles) => Some(candles),
                Err(e) => {
                    warn!("⚠️ OHLC fetch failed for {}: {}", canonical, e);
                    None
                }
            }
        }
        None => {
            warn!("⚠️ No provider mapping for symbol {}", canonical);
            None
        }
    };

    let response = match fetched {
        Some(mut candles) => {
            if candles.len() > limit {
                candles.drain(..candles.len() - limit);
            }
            KlinesResponse {
                symbol: canonical,
                interval,
                candles,
                source: BatchSource::Upstream,
                data_quality: DataQuality::Realtime,
                warning: None,
            }
        }
        None => KlinesResponse {
            symbol: canonical,
            interval,
            candles: Vec::new(),
            source: BatchSource::Simulated,
            data_quality: DataQuality::Simulated,
            warning: Some("historical data unavailable, serving empty series".to_string()),
        },
    };
    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// Spread arbitrage
// ---------------------------------------------------------------------------

pub async fn arbitrage_scan(
    State(state): State<SharedState>,
    body: Option<Json<ScanRequest>>,
) -> ArbResult<Json<ScanResponse>> {
    let request = body.map(|Json(b)| b);
    let trade_size = request
        .as_ref()
        .and_then(|r| r.trade_size)
        .unwrap_or(state.config.trade_size_usd)
        .clamp(MIN_TRADE_SIZE_USD, MAX_TRADE_SIZE_USD);
    let symbols_list = match request.and_then(|r| r.symbols) {
        Some(list) => {
            let cleaned: Vec<String> = list
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if cleaned.is_empty() {
                return Err(ArbError::InvalidRequest {
                    message: "symbols must not be empty".to_string(),
                });
            }
            cleaned
        }
        None => state.config.default_symbols.clone(),
    };

    let mut venue_quotes = Vec::new();
    let mut scanned_symbols = Vec::new();
    for symbol in &symbols_list {
        let canonical = symbols::canonical(symbol);
        let Some(id) = symbols::provider_id(&canonical) else {
            warn!("⚠️ Skipping unmapped symbol {}", canonical);
            continue;
        };
        state.limiter.acquire().await;
        match state.provider.venue_tickers(id).await {
            Ok(mut quotes) => {
                venue_quotes.append(&mut quotes);
                scanned_symbols.push(canonical);
            }
            Err(e) => warn!("⚠️ Ticker fetch failed for {}: {}", canonical, e),
        }
    }

    let data_quality = venue_quotes
        .iter()
        .map(|q| q.quality)
        .max()
        .unwrap_or(DataQuality::Simulated);
    let opportunities = state.scanner.scan(&venue_quotes, &state.fees, trade_size);

    Ok(Json(ScanResponse {
        opportunities,
        scanned_symbols,
        venue_quotes: venue_quotes.len(),
        data_quality,
        scanned_at: Utc::now(),
    }))
}

pub async fn arbitrage_execute(
    State(state): State<SharedState>,
    Json(request): Json<ExecuteRequest>,
) -> ArbResult<Json<ExecutionRecord>> {
    let quantity = request.quantity.unwrap_or(request.opportunity.quantity);
    let path = request.path.unwrap_or(ExecutionPath::Manual);
    let record = state
        .dispatcher
        .execute(&request.opportunity, quantity, path)
        .await?;
    Ok(Json(record))
}

// ---------------------------------------------------------------------------
// Funding-rate capture
// ---------------------------------------------------------------------------

pub async fn funding_scan(State(state): State<SharedState>) -> ArbResult<Json<FundingScanResponse>> {
    state.limiter.acquire().await;
    match state.provider.derivatives().await {
        Ok(metrics) => {
            for metric in &metrics {
                if let Err(e) = state.store.record_derivatives_metric(metric).await {
                    warn!("Failed to persist derivatives metric: {}", e);
                }
            }
        }
        Err(e) => warn!("⚠️ Derivatives fetch failed, scanning stored metrics: {}", e),
    }

    let latest = state.store.latest_derivatives_metrics().await?;
    let opportunities = state.funding.scan(&latest, &state.fees, Utc::now());

    for op in &opportunities {
        let signal = IntelligenceSignal {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: op.symbol.clone(),
            kind: "funding_rate_capture".to_string(),
            direction: SignalDirection::Short,
            strength: (op.estimated_apy / dec!(50)).clamp(Decimal::ZERO, Decimal::ONE),
            rationale: format!(
                "{} funding on {} annualizes to {}% before costs",
                op.symbol,
                op.venue,
                op.annualized_rate_pct.round_dp(2)
            ),
            created_at: op.discovered_at,
        };
        if let Err(e) = state.store.record_signal(&signal).await {
            warn!("Failed to persist intelligence signal: {}", e);
        }
    }

    Ok(Json(FundingScanResponse {
        opportunities,
        metrics_scanned: latest.len(),
        scanned_at: Utc::now(),
    }))
}

pub async fn funding_execute(
    State(state): State<SharedState>,
    Json(request): Json<FundingExecuteRequest>,
) -> ArbResult<Json<ExecutionRecord>> {
    let quantity = request.quantity.unwrap_or_else(|| {
        if request.opportunity.mark_price > Decimal::ZERO {
            state.config.trade_size_usd / request.opportunity.mark_price
        } else {
            Decimal::ZERO
        }
    });
    let path = request.path.unwrap_or(ExecutionPath::Manual);
    let record = state
        .dispatcher
        .execute_funding(&request.opportunity, quantity, path)
        .await?;
    Ok(Json(record))
}

pub async fn funding_positions(
    State(state): State<SharedState>,
) -> ArbResult<Json<Vec<ExecutionRecord>>> {
    Ok(Json(state.store.open_positions().await?))
}

pub async fn funding_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> ArbResult<Json<Vec<ExecutionRecord>>> {
    let limit = query.limit.unwrap_or(50).min(500);
    let symbol = query
        .symbol
        .as_deref()
        .map(symbols::canonical)
        .filter(|s| !s.is_empty());
    Ok(Json(
        state
            .store
            .execution_history(symbol.as_deref(), limit)
            .await?,
    ))
}

pub async fn funding_close(
    State(state): State<SharedState>,
    Json(request): Json<CloseRequest>,
) -> ArbResult<Json<ExecutionRecord>> {
    let record = state
        .dispatcher
        .close_position(&request.id, request.exit_value)
        .await?;
    Ok(Json(record))
}

// ---------------------------------------------------------------------------
// Risk controls
// ---------------------------------------------------------------------------

pub async fn risk_state(State(state): State<SharedState>) -> ArbResult<Json<RiskSettings>> {
    Ok(Json(state.gate.settings().await?))
}

pub async fn risk_kill_switch(
    State(state): State<SharedState>,
    Json(request): Json<KillSwitchRequest>,
) -> ArbResult<Json<RiskState>> {
    let next = if request.active {
        state
            .gate
            .activate_kill_switch(request.reason.as_deref().unwrap_or("manual activation"))
            .await?
    } else {
        state.gate.deactivate_kill_switch().await?
    };
    Ok(Json(next))
}

pub async fn risk_reduce_only(
    State(state): State<SharedState>,
    Json(request): Json<ReduceOnlyRequest>,
) -> ArbResult<Json<RiskState>> {
    Ok(Json(state.gate.set_reduce_only(request.enabled).await?))
}

pub async fn risk_reset_pnl(State(state): State<SharedState>) -> ArbResult<Json<RiskState>> {
    Ok(Json(state.gate.reset_daily_pnl().await?))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_symbols(raw: Option<&str>, defaults: &[String]) -> ArbResult<Vec<String>> {
    match raw {
        None => Ok(defaults.to_vec()),
        Some(raw) => {
            let list: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if list.is_empty() {
                return Err(ArbError::InvalidRequest {
                    message: "symbols must not be empty".to_string(),
                });
            }
            Ok(list)
        }
    }
}

fn required_symbol(raw: &Option<String>) -> ArbResult<String> {
    match raw.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(ArbError::InvalidRequest {
            message: "symbol query parameter is required".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{build_router, AppState};
    use crate::config::Config;
    use crate::storage::MemoryStore;
    use crate::types::{RiskLevel, TradeCosts};
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use std::str::FromStr;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BTC_ROW: &str = r#"[{"id":"bitcoin","current_price":65000.0,
        "price_change_percentage_24h":1.5,"total_volume":8640000000.0}]"#;

    fn test_app(server: &mockito::ServerGuard) -> (Router, Arc<MemoryStore>, SharedState) {
        let mut config = Config::load();
        config.provider_base_url = server.url();
        config.provider_api_key = None;
        config.provider_min_interval_ms = 1;
        config.provider_timeout_ms = 2_000;
        config.quote_ttl_ms = 30_000;
        config.daily_pnl_limit_usd = dec!(-500);

        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(config, store.clone()).expect("state");
        (build_router(state.clone()), store, state)
    }

    async fn send(
        router: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1_000_000)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn sample_opportunity() -> ArbitrageOpportunity {
        ArbitrageOpportunity {
            id: "opp-1".to_string(),
            symbol: "BTC".to_string(),
            buy_venue: "binance".to_string(),
            sell_venue: "kraken".to_string(),
            buy_price: dec!(100),
            sell_price: dec!(100.5),
            spread_pct: dec!(0.5),
            quantity: dec!(10),
            gross_profit: dec!(5),
            costs: TradeCosts {
                trading_fees: dec!(0.5),
                withdrawal_fee: dec!(0.2),
                slippage: dec!(0.1),
                total_cost: dec!(0.8),
            },
            net_profit: dec!(4.2),
            confidence: dec!(0.9),
            risk_level: RiskLevel::Low,
            quality: DataQuality::Realtime,
            is_actionable: true,
            discovered_at: Utc::now(),
        }
    }

    fn execute_body() -> Value {
        json!({ "opportunity": serde_json::to_value(sample_opportunity()).unwrap() })
    }

    #[tokio::test]
    async fn health_reports_ok_before_any_fetch() {
        let server = mockito::Server::new_async().await;
        let (router, _, _) = test_app(&server);

        let (status, body) = send(&router, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["cache_size"], 0);
        assert_eq!(body["upstream_ok"], true);
    }

    #[tokio::test]
    async fn ticker_serves_default_symbols_with_per_row_degradation() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/coins/markets")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(BTC_ROW)
            .create_async()
            .await;

        let (router, _, _) = test_app(&server);
        let (status, body) = send(&router, Method::GET, "/market/ticker", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "upstream");
        assert_eq!(body["tickers"].as_array().unwrap().len(), 3);
        assert_eq!(body["data_quality"], "realtime");
        assert_eq!(body["trading_allowed"], true);
        assert!(body["latency_ms"].is_u64());
    }

    #[tokio::test]
    async fn blank_symbols_are_rejected() {
        let server = mockito::Server::new_async().await;
        let (router, _, _) = test_app(&server);

        let (status, body) =
            send(&router, Method::GET, "/market/ticker?symbols=%20%2C%20", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_request");
    }

    #[tokio::test]
    async fn price_condenses_a_single_quote() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/coins/markets")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(BTC_ROW)
            .create_async()
            .await;

        let (router, _, _) = test_app(&server);
        let (status, body) = send(&router, Method::GET, "/market/price?symbol=btc", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "BTC");
        let price = Decimal::from_str(body["price"].as_str().unwrap()).unwrap();
        assert_eq!(price, dec!(65000));
        assert_eq!(body["trading_allowed"], true);
    }

    #[tokio::test]
    async fn orderbook_is_synthesized_and_labelled_derived() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/coins/markets")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(BTC_ROW)
            .create_async()
            .await;

        let (router, _, _) = test_app(&server);
        let (status, body) = send(
            &router,
            Method::GET,
            "/market/orderbook?symbol=BTC&depth=3",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bids"].as_array().unwrap().len(), 3);
        assert_eq!(body["asks"].as_array().unwrap().len(), 3);
        assert_eq!(body["data_quality"], "derived");
        assert_eq!(body["trading_allowed"], true);
        assert!(body["warning"].as_str().is_some());

        // levels step away from the touch
        let best_bid = Decimal::from_str(body["bids"][0][0].as_str().unwrap()).unwrap();
        let deep_bid = Decimal::from_str(body["bids"][2][0].as_str().unwrap()).unwrap();
        assert!(deep_bid < best_bid);
    }

    #[tokio::test]
    async fn klines_degrade_to_an_empty_series_when_upstream_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/coins/bitcoin/ohlc")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let (router, _, _) = test_app(&server);
        let (status, body) = send(&router, Method::GET, "/market/klines?symbol=BTC", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "simulated");
        assert_eq!(body["candles"].as_array().unwrap().len(), 0);
        assert!(body["warning"].as_str().is_some());
    }

    #[tokio::test]
    async fn scan_surfaces_cross_venue_opportunities() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/coins/bitcoin/tickers")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"tickers":[
                    {"target":"USDT","market":{"name":"Binance"},
                     "converted_last":{"usd":65000.0},"converted_volume":{"usd":900000.0},
                     "bid_ask_spread_percentage":0.1},
                    {"target":"USD","market":{"name":"Kraken"},
                     "converted_last":{"usd":65500.0},"converted_volume":{"usd":700000.0},
                     "bid_ask_spread_percentage":0.1}
                ]}"#,
            )
            .create_async()
            .await;

        let (router, _, _) = test_app(&server);
        let (status, body) = send(
            &router,
            Method::POST,
            "/arbitrage/scan",
            Some(json!({"symbols": ["BTC"]})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["scanned_symbols"], json!(["BTC"]));
        assert_eq!(body["venue_quotes"], 2);
        let ops = body["opportunities"].as_array().unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0]["buy_venue"], "Binance");
        assert_eq!(ops[0]["sell_venue"], "Kraken");
        assert_eq!(ops[0]["is_actionable"], true);
    }

    #[tokio::test]
    async fn risk_denial_maps_to_forbidden_with_a_machine_code() {
        let server = mockito::Server::new_async().await;
        let (router, _, state) = test_app(&server);
        state.gate.activate_kill_switch("maintenance").await.unwrap();

        let (status, body) = send(
            &router,
            Method::POST,
            "/arbitrage/execute",
            Some(execute_body()),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "risk_gate_denied");
        assert_eq!(body["reason"], "kill_switch_active");
    }

    #[tokio::test]
    async fn execute_then_close_round_trip() {
        let server = mockito::Server::new_async().await;
        let (router, _, _) = test_app(&server);

        let (status, record) = send(
            &router,
            Method::POST,
            "/arbitrage/execute",
            Some(execute_body()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["status"], "simulated");
        assert!(record["completed_at"].is_null());
        let id = record["id"].as_str().unwrap().to_string();

        let (status, positions) = send(&router, Method::GET, "/funding/positions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(positions.as_array().unwrap().len(), 1);

        let (status, closed) = send(
            &router,
            Method::POST,
            "/funding/close",
            Some(json!({"id": id, "exit_value": "1025"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(closed["status"], "closed");
        assert!(closed["completed_at"].as_str().is_some());
        let realized = Decimal::from_str(closed["net_profit"].as_str().unwrap()).unwrap();
        assert_eq!(realized, dec!(25));

        let (_, positions) = send(&router, Method::GET, "/funding/positions", None).await;
        assert!(positions.as_array().unwrap().is_empty());

        let (_, history) = send(&router, Method::GET, "/funding/history", None).await;
        assert_eq!(history.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn closing_an_unknown_position_is_not_found() {
        let server = mockito::Server::new_async().await;
        let (router, _, _) = test_app(&server);

        let (status, body) = send(
            &router,
            Method::POST,
            "/funding/close",
            Some(json!({"id": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "position_not_found");
    }

    #[tokio::test]
    async fn funding_scan_persists_metrics_and_advisory_signals() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/derivatives")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"market":"Binance (Futures)","index_id":"BTC","price":"65000",
                     "funding_rate":0.03,"open_interest":5000000.0},
                    {"market":"Obscure Venue","index_id":"WAGMI42","price":"1.0",
                     "funding_rate":0.5}]"#,
            )
            .create_async()
            .await;

        let (router, store, _) = test_app(&server);
        let (status, body) = send(&router, Method::POST, "/funding/scan", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["metrics_scanned"], 1);
        let ops = body["opportunities"].as_array().unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0]["symbol"], "BTC");

        let signals = store.signals().await;
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, "funding_rate_capture");
        assert_eq!(signals[0].direction, SignalDirection::Short);
    }

    #[tokio::test]
    async fn kill_switch_toggles_through_the_api() {
        let server = mockito::Server::new_async().await;
        let (router, _, _) = test_app(&server);

        let (status, state_body) = send(&router, Method::GET, "/risk/state", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state_body["state"]["kill_switch_active"], false);

        let (status, on) = send(
            &router,
            Method::POST,
            "/risk/kill-switch",
            Some(json!({"active": true, "reason": "maintenance"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(on["kill_switch_active"], true);
        assert_eq!(on["kill_switch_reason"], "maintenance");

        let (_, off) = send(
            &router,
            Method::POST,
            "/risk/kill-switch",
            Some(json!({"active": false})),
        )
        .await;
        assert_eq!(off["kill_switch_active"], false);
        assert!(off["kill_switch_reason"].is_null());
    }

    #[tokio::test]
    async fn reduce_only_blocks_new_opens_but_not_closes() {
        let server = mockito::Server::new_async().await;
        let (router, _, _) = test_app(&server);

        let (status, record) = send(
            &router,
            Method::POST,
            "/arbitrage/execute",
            Some(execute_body()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = record["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &router,
            Method::POST,
            "/risk/reduce-only",
            Some(json!({"enabled": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, denied) = send(
            &router,
            Method::POST,
            "/arbitrage/execute",
            Some(execute_body()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(denied["reason"], "reduce_only_mode");

        let (status, _) = send(
            &router,
            Method::POST,
            "/funding/close",
            Some(json!({"id": id})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn reset_pnl_clears_the_ledger_but_not_the_switch() {
        let server = mockito::Server::new_async().await;
        let (router, _, state) = test_app(&server);
        state.gate.record_realized_pnl(dec!(-510)).await.unwrap();

        let (status, reset) = send(&router, Method::POST, "/risk/reset-pnl", None).await;
        assert_eq!(status, StatusCode::OK);
        let pnl = Decimal::from_str(reset["daily_pnl"].as_str().unwrap()).unwrap();
        assert_eq!(pnl, Decimal::ZERO);
        assert_eq!(reset["kill_switch_active"], true);
    }
}
