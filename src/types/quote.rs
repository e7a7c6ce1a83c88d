//! Market quote types and data quality labels

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trust label attached to every served quote. Ordering matters: variants
/// are declared best-first, so `max` picks the worse of two labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    Realtime,
    Delayed,
    Derived,
    Simulated,
}

impl DataQuality {
    pub fn worse_of(self, other: DataQuality) -> DataQuality {
        self.max(other)
    }

    pub fn trading_allowed(self) -> bool {
        self != DataQuality::Simulated
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: Decimal,
    pub change_24h: Decimal,
    pub volume_24h: Decimal,
    pub high_24h: Option<Decimal>,
    pub low_24h: Option<Decimal>,
    pub bid: Decimal,
    pub ask: Decimal,
    pub observed_at: DateTime<Utc>,
    pub quality: DataQuality,
}

impl Quote {
    /// Zero-valued placeholder served when a symbol cannot be resolved or
    /// the upstream is unreachable with nothing cached.
    pub fn simulated(symbol: &str, observed_at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            price: Decimal::ZERO,
            change_24h: Decimal::ZERO,
            volume_24h: Decimal::ZERO,
            high_24h: None,
            low_24h: None,
            bid: Decimal::ZERO,
            ask: Decimal::ZERO,
            observed_at,
            quality: DataQuality::Simulated,
        }
    }
}

/// Per-venue ticker row feeding the opportunity scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueQuote {
    pub venue: String,
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub volume_24h: Option<Decimal>,
    pub quality: DataQuality,
    pub observed_at: DateTime<Utc>,
}

/// Where a served batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchSource {
    Upstream,
    Cache,
    CacheStale,
    Simulated,
}

/// The unit the cache layer serves. `cached_at` is the upstream fetch time,
/// not the serve time, so coalesced and cache-hit callers see identical
/// stamps for the same underlying fetch.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteBatch {
    pub quotes: Vec<Quote>,
    pub source: BatchSource,
    pub data_quality: DataQuality,
    pub trading_allowed: bool,
    pub cached_at: DateTime<Utc>,
}

/// One OHLC candle. Granularity is provider-determined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Option<Decimal>,
}

/// A single synthetic book level, serialized as `[price, size]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookLevel(pub Decimal, pub Decimal);

/// Synthesized order book. The upstream aggregate has no depth data, so
/// levels are derived from the last quote and always labelled accordingly.
#[derive(Debug, Clone, Serialize)]
pub struct OrderBookSnapshot {
    pub symbol: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub data_quality: DataQuality,
    pub trading_allowed: bool,
    pub warning: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_ordering_is_best_first() {
        assert!(DataQuality::Realtime < DataQuality::Delayed);
        assert!(DataQuality::Delayed < DataQuality::Derived);
        assert!(DataQuality::Derived < DataQuality::Simulated);
    }

    #[test]
    fn worse_of_never_improves() {
        assert_eq!(
            DataQuality::Delayed.worse_of(DataQuality::Realtime),
            DataQuality::Delayed
        );
        assert_eq!(
            DataQuality::Realtime.worse_of(DataQuality::Derived),
            DataQuality::Derived
        );
        assert_eq!(
            DataQuality::Simulated.worse_of(DataQuality::Realtime),
            DataQuality::Simulated
        );
    }

    #[test]
    fn only_simulated_blocks_trading() {
        assert!(DataQuality::Realtime.trading_allowed());
        assert!(DataQuality::Delayed.trading_allowed());
        assert!(DataQuality::Derived.trading_allowed());
        assert!(!DataQuality::Simulated.trading_allowed());
    }

    #[test]
    fn simulated_quote_is_zero_valued() {
        let q = Quote::simulated("BTC", Utc::now());
        assert_eq!(q.price, Decimal::ZERO);
        assert_eq!(q.quality, DataQuality::Simulated);
    }
}
