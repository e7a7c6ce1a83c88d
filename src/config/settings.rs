//! Service configuration and environment variable handling

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use std::env;
use std::str::FromStr;

// Cache and upstream bounds
pub const MIN_QUOTE_TTL_MS: u64 = 1_000;
pub const MAX_QUOTE_TTL_MS: u64 = 600_000;
pub const DEFAULT_QUOTE_TTL_MS: u64 = 30_000;
pub const MIN_PROVIDER_INTERVAL_MS: u64 = 100;
pub const MAX_PROVIDER_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_PROVIDER_INTERVAL_MS: u64 = 1_100;
pub const MIN_PROVIDER_TIMEOUT_MS: u64 = 1_000;
pub const MAX_PROVIDER_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 5_000;
pub const MAX_CACHE_ENTRIES_CAP: usize = 4_096;
pub const DEFAULT_CACHE_ENTRIES: usize = 128;

// Scanner bounds
pub const MIN_SPREAD_PCT_FLOOR: Decimal = dec!(0.01);
pub const DEFAULT_MIN_SPREAD_PCT: Decimal = dec!(0.1);
pub const MIN_TRADE_SIZE_USD: Decimal = dec!(10);
pub const MAX_TRADE_SIZE_USD: Decimal = dec!(1_000_000);

// Auto-execution bounds
pub const MIN_AUTO_COOLDOWN_MS: u64 = 1_000;
pub const DEFAULT_AUTO_COOLDOWN_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    // Upstream provider
    pub provider_base_url: String,
    pub provider_api_key: Option<String>,
    pub provider_timeout_ms: u64,
    pub provider_min_interval_ms: u64,
    // Cache
    pub quote_ttl_ms: u64,
    pub cache_max_entries: usize,
    // Scanner
    pub default_symbols: Vec<String>,
    pub min_spread_pct: Decimal,
    pub trade_size_usd: Decimal,
    pub actionable_profit_usd: Decimal,
    // Risk / auto-execution
    pub auto_execute_enabled: bool,
    pub auto_min_profit_usd: Decimal,
    pub max_position_size_usd: Decimal,
    pub auto_cooldown_ms: u64,
    pub daily_pnl_limit_usd: Decimal,
    // Storage
    pub data_dir: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            provider_base_url: env::var("PROVIDER_BASE_URL")
                .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string()),
            provider_api_key: env::var("PROVIDER_API_KEY").ok(),
            provider_timeout_ms: env::var("PROVIDER_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PROVIDER_TIMEOUT_MS)
                .max(MIN_PROVIDER_TIMEOUT_MS)
                .min(MAX_PROVIDER_TIMEOUT_MS),
            provider_min_interval_ms: env::var("PROVIDER_MIN_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PROVIDER_INTERVAL_MS)
                .max(MIN_PROVIDER_INTERVAL_MS)
                .min(MAX_PROVIDER_INTERVAL_MS),
            quote_ttl_ms: env::var("QUOTE_TTL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_QUOTE_TTL_MS)
                .max(MIN_QUOTE_TTL_MS)
                .min(MAX_QUOTE_TTL_MS),
            cache_max_entries: env::var("CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CACHE_ENTRIES)
                .max(1)
                .min(MAX_CACHE_ENTRIES_CAP),
            default_symbols: env::var("DEFAULT_SYMBOLS")
                .unwrap_or_else(|_| "BTC,ETH,SOL".to_string())
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            min_spread_pct: env::var("MIN_SPREAD_PCT")
                .ok()
                .and_then(|s| Decimal::from_str(&s).ok())
                .unwrap_or(DEFAULT_MIN_SPREAD_PCT)
                .max(MIN_SPREAD_PCT_FLOOR),
            trade_size_usd: env::var("TRADE_SIZE_USD")
                .ok()
                .and_then(|s| Decimal::from_str(&s).ok())
                .unwrap_or(dec!(1000))
                .max(MIN_TRADE_SIZE_USD)
                .min(MAX_TRADE_SIZE_USD),
            actionable_profit_usd: env::var("ACTIONABLE_PROFIT_USD")
                .ok()
                .and_then(|s| Decimal::from_str(&s).ok())
                .unwrap_or(dec!(1.0))
                .max(dec!(0)),
            auto_execute_enabled: env::var("AUTO_EXECUTE_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            auto_min_profit_usd: env::var("AUTO_MIN_PROFIT_USD")
                .ok()
                .and_then(|s| Decimal::from_str(&s).ok())
                .unwrap_or(dec!(5.0))
                .max(dec!(0)),
            max_position_size_usd: env::var("MAX_POSITION_SIZE_USD")
                .ok()
                .and_then(|s| Decimal::from_str(&s).ok())
                .unwrap_or(dec!(10_000))
                .max(MIN_TRADE_SIZE_USD),
            auto_cooldown_ms: env::var("AUTO_COOLDOWN_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_AUTO_COOLDOWN_MS)
                .max(MIN_AUTO_COOLDOWN_MS),
            // Stored as a negative threshold; a positive value would make the
            // breaker trip immediately, so clamp to zero or below.
            daily_pnl_limit_usd: env::var("DAILY_PNL_LIMIT_USD")
                .ok()
                .and_then(|s| Decimal::from_str(&s).ok())
                .unwrap_or(dec!(-500))
                .min(dec!(0)),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "output/data".to_string()),
        }
    }
}
