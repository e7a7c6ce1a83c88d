//! Arbitrage opportunity types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use super::DataQuality;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub id: String,
    pub symbol: String,
    pub buy_venue: String,
    pub sell_venue: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub spread_pct: Decimal,
    pub quantity: Decimal,
    pub gross_profit: Decimal,
    pub costs: TradeCosts,
    pub net_profit: Decimal,
    pub confidence: Decimal,
    pub risk_level: RiskLevel,
    pub quality: DataQuality,
    pub is_actionable: bool,
    pub discovered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeCosts {
    pub trading_fees: Decimal,
    pub withdrawal_fee: Decimal,
    pub slippage: Decimal,
    pub total_cost: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,      // < 0.5%
    Moderate, // 0.5-2%
    High,     // 2-5%
    Extreme,  // > 5%
}

impl RiskLevel {
    /// One band riskier, saturating at Extreme.
    pub fn bumped(self) -> RiskLevel {
        match self {
            RiskLevel::Low => RiskLevel::Moderate,
            RiskLevel::Moderate => RiskLevel::High,
            RiskLevel::High | RiskLevel::Extreme => RiskLevel::Extreme,
        }
    }
}

/// Delta-neutral funding-rate capture candidate. Profitability comes from
/// the funding stream, not a venue spread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingOpportunity {
    pub id: String,
    pub symbol: String,
    pub venue: String,
    pub mark_price: Decimal,
    pub funding_rate: Decimal,
    pub annualized_rate_pct: Decimal,
    pub fee_drag_pct: Decimal,
    pub estimated_apy: Decimal,
    pub confidence: Decimal,
    pub risk_level: RiskLevel,
    pub quality: DataQuality,
    pub discovered_at: DateTime<Utc>,
}
