//! Persisted telemetry and analytics record types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latency/outcome sample for one upstream or endpoint call. Emission is
/// best-effort and never fails the request that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub function: String,
    pub endpoint: String,
    pub latency_ms: u64,
    pub success: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Per-venue derivatives snapshot read by the funding scanner.
/// `funding_rate` is the 8-hour rate as a fraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivativesMetric {
    pub symbol: String,
    pub venue: String,
    pub mark_price: Decimal,
    pub funding_rate: Decimal,
    pub open_interest: Option<Decimal>,
    pub recorded_at: DateTime<Utc>,
}

/// Advisory analytics output. Consumers may render or rank by these;
/// the risk gate never reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelligenceSignal {
    pub id: String,
    pub symbol: String,
    pub kind: String,
    pub direction: SignalDirection,
    pub strength: Decimal,
    pub rationale: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDirection {
    Long,
    Short,
    Neutral,
}
