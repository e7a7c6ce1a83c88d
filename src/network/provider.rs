//! External quote provider client

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::cache::quality::classify_age;
use crate::config::Config;
use crate::errors::{ArbError, ArbResult};
use crate::network::symbols;
use crate::types::{Candle, DerivativesMetric, Quote, VenueQuote};

/// Synthetic half-spread applied to aggregate prices, which carry no real
/// bid/ask. 5 bps keeps the book plausible without inventing depth.
const NOMINAL_HALF_SPREAD: Decimal = rust_decimal_macros::dec!(0.0005);

/// Fallback venue spread when the upstream omits one, in percent.
const DEFAULT_VENUE_SPREAD_PCT: f64 = 0.1;

pub struct ProviderClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ProviderClient {
    pub fn new(config: &Config) -> ArbResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.provider_timeout_ms))
            .build()
            .map_err(|e| ArbError::UpstreamUnavailable {
                message: "failed to build HTTP client".to_string(),
                source: Some(e.into()),
            })?;

        Ok(Self {
            client,
            base_url: config.provider_base_url.trim_end_matches('/').to_string(),
            api_key: config.provider_api_key.clone(),
        })
    }

    /// Batch spot quotes for the given provider asset ids.
    pub async fn market_quotes(&self, ids: &[&str]) -> ArbResult<Vec<MarketRow>> {
        let url = format!(
            "{}/coins/markets?vs_currency=usd&ids={}&price_change_percentage=24h",
            self.base_url,
            ids.join(",")
        );
        self.get_json(&url).await
    }

    /// Per-venue tickers for one asset, converted to scanner rows.
    pub async fn venue_tickers(&self, id: &str) -> ArbResult<Vec<VenueQuote>> {
        let url = format!("{}/coins/{}/tickers", self.base_url, id);
        let response: TickersResponse = self.get_json(&url).await?;
        let now = Utc::now();

        let symbol = symbols::symbol_for_id(id)
            .map(str::to_string)
            .unwrap_or_else(|| id.to_uppercase());

        let quotes = response
            .tickers
            .into_iter()
            .filter(|t| matches!(t.target.as_str(), "USD" | "USDT" | "USDC"))
            .filter_map(|t| t.into_venue_quote(&symbol, now))
            .collect();
        Ok(quotes)
    }

    /// OHLC candles. The provider fixes granularity per requested window.
    pub async fn ohlc(&self, id: &str, days: u32) -> ArbResult<Vec<Candle>> {
        let url = format!(
            "{}/coins/{}/ohlc?vs_currency=usd&days={}",
            self.base_url, id, days
        );
        let rows: Vec<[f64; 5]> = self.get_json(&url).await?;

        let candles = rows
            .into_iter()
            .filter_map(|[ts, open, high, low, close]| {
                let open_time = Utc.timestamp_millis_opt(ts as i64).single()?;
                Some(Candle {
                    open_time,
                    open: Decimal::from_f64(open)?,
                    high: Decimal::from_f64(high)?,
                    low: Decimal::from_f64(low)?,
                    close: Decimal::from_f64(close)?,
                    volume: None,
                })
            })
            .collect();
        Ok(candles)
    }

    /// Derivatives tickers across venues, filtered to instruments we map.
    pub async fn derivatives(&self) -> ArbResult<Vec<DerivativesMetric>> {
        let url = format!("{}/derivatives", self.base_url);
        let rows: Vec<DerivativesRow> = self.get_json(&url).await?;
        let now = Utc::now();

        let metrics = rows
            .into_iter()
            .filter_map(|row| row.into_metric(now))
            .collect();
        Ok(metrics)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> ArbResult<T> {
        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ArbError::UpstreamUnavailable {
                    message: "provider request timed out".to_string(),
                    source: Some(e.into()),
                }
            } else {
                ArbError::UpstreamUnavailable {
                    message: "provider request failed".to_string(),
                    source: Some(e.into()),
                }
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            warn!("⚠️ Provider rate limited us (retry-after: {:?}s)", retry_after_secs);
            return Err(ArbError::UpstreamRateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("⚠️ Provider returned error status {}: {}", status, body);
            return Err(ArbError::UpstreamUnavailable {
                message: format!("provider status {}", status),
                source: None,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ArbError::UpstreamUnavailable {
                message: "failed to parse provider response".to_string(),
                source: Some(e.into()),
            })
    }
}

/// One row of the batch markets endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketRow {
    pub id: String,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    pub total_volume: Option<f64>,
    #[serde(default)]
    pub high_24h: Option<f64>,
    #[serde(default)]
    pub low_24h: Option<f64>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl MarketRow {
    /// Typed quote for this row, or None when the price fails sanity checks.
    pub fn into_quote(self, symbol: &str, now: DateTime<Utc>) -> Option<Quote> {
        let price = self.current_price.and_then(Decimal::from_f64)?;
        if price <= Decimal::ZERO {
            warn!("⚠️ Discarding non-positive price for {}: {}", symbol, price);
            return None;
        }

        let observed_at = self.last_updated.unwrap_or(now);
        let age = now.signed_duration_since(observed_at);
        let half_spread = price * NOMINAL_HALF_SPREAD;

        Some(Quote {
            symbol: symbol.to_string(),
            price,
            change_24h: self
                .price_change_percentage_24h
                .and_then(Decimal::from_f64)
                .unwrap_or(Decimal::ZERO),
            volume_24h: self
                .total_volume
                .and_then(Decimal::from_f64)
                .unwrap_or(Decimal::ZERO),
            high_24h: self.high_24h.and_then(Decimal::from_f64),
            low_24h: self.low_24h.and_then(Decimal::from_f64),
            bid: price - half_spread,
            ask: price + half_spread,
            observed_at,
            quality: classify_age(age),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TickersResponse {
    #[serde(default)]
    tickers: Vec<TickerEntry>,
}

#[derive(Debug, Deserialize)]
struct TickerEntry {
    #[serde(default)]
    target: String,
    market: MarketRef,
    #[serde(default)]
    converted_last: HashMap<String, f64>,
    #[serde(default)]
    converted_volume: HashMap<String, f64>,
    #[serde(default)]
    bid_ask_spread_percentage: Option<f64>,
    #[serde(default)]
    last_fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct MarketRef {
    name: String,
}

impl TickerEntry {
    fn into_venue_quote(self, symbol: &str, now: DateTime<Utc>) -> Option<VenueQuote> {
        let mid = self
            .converted_last
            .get("usd")
            .copied()
            .and_then(Decimal::from_f64)?;
        if mid <= Decimal::ZERO {
            return None;
        }

        let spread_pct = self
            .bid_ask_spread_percentage
            .unwrap_or(DEFAULT_VENUE_SPREAD_PCT)
            .abs();
        let half = Decimal::from_f64(spread_pct / 200.0).unwrap_or(NOMINAL_HALF_SPREAD);

        let observed_at = self.last_fetched_at.unwrap_or(now);
        let age = now.signed_duration_since(observed_at);

        Some(VenueQuote {
            venue: self.market.name,
            symbol: symbol.to_string(),
            bid: mid * (Decimal::ONE - half),
            ask: mid * (Decimal::ONE + half),
            volume_24h: self
                .converted_volume
                .get("usd")
                .copied()
                .and_then(Decimal::from_f64),
            quality: classify_age(age),
            observed_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DerivativesRow {
    #[serde(default)]
    market: String,
    #[serde(default)]
    index_id: Option<String>,
    /// The provider reports this as a string.
    #[serde(default)]
    price: Option<String>,
    /// Reported in percent per 8h period.
    #[serde(default)]
    funding_rate: Option<f64>,
    #[serde(default)]
    open_interest: Option<f64>,
}

impl DerivativesRow {
    fn into_metric(self, now: DateTime<Utc>) -> Option<DerivativesMetric> {
        let symbol = symbols::canonical(self.index_id.as_deref()?);
        // keep only instruments we can map back to a spot quote
        symbols::provider_id(&symbol)?;

        let mark_price = self
            .price
            .as_deref()
            .and_then(|p| Decimal::from_str(p.trim().trim_start_matches('$')).ok())?;
        if mark_price <= Decimal::ZERO {
            return None;
        }

        let funding_rate = Decimal::from_f64(self.funding_rate? / 100.0)?;

        Some(DerivativesMetric {
            symbol,
            venue: self.market,
            mark_price,
            funding_rate,
            open_interest: self.open_interest.and_then(Decimal::from_f64),
            recorded_at: now,
        })
    }
}
