//! Trade execution record types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Persisted record of one paper execution. Written on every attempt,
/// including failed fills, and updated once on close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub opportunity_id: String,
    pub symbol: String,
    pub buy_venue: String,
    pub sell_venue: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub quantity: Decimal,
    pub fees: Decimal,
    pub net_profit: Decimal,
    pub status: ExecutionStatus,
    pub path: ExecutionPath,
    pub execution_time_ms: u64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Simulated,
    Executed,
    Failed,
    Closed,
}

impl ExecutionStatus {
    /// Open positions are the only ones a close transition accepts.
    pub fn is_open(self) -> bool {
        matches!(self, ExecutionStatus::Simulated | ExecutionStatus::Executed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPath {
    Manual,
    Automatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeIntent {
    Open,
    Close,
}
