//! Funding-rate capture scanning

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::arbitrage::fees::FeeModel;
use crate::cache::classify_age;
use crate::types::{DataQuality, DerivativesMetric, FundingOpportunity, RiskLevel};

/// Funding settles every eight hours on the venues we track.
const FUNDING_PERIODS_PER_DAY: Decimal = dec!(3);
/// Assumed carry holding period for amortizing entry and exit costs.
pub const DEFAULT_HOLD_DAYS: Decimal = dec!(30);

/// Scores delta-neutral funding capture: short the perp, hold spot, and
/// collect the funding stream while amortizing entry and exit fees over
/// the assumed holding period.
pub struct FundingScanner {
    min_apy_pct: Decimal,
    hold_days: Decimal,
}

impl Default for FundingScanner {
    fn default() -> Self {
        Self {
            min_apy_pct: Decimal::ZERO,
            hold_days: DEFAULT_HOLD_DAYS,
        }
    }
}

impl FundingScanner {
    pub fn new(min_apy_pct: Decimal, hold_days: Decimal) -> Self {
        Self {
            min_apy_pct,
            hold_days,
        }
    }

    /// Scans the latest per-venue funding metrics. Only positive net
    /// carries are emitted, sorted by estimated APY, best first.
    pub fn scan(
        &self,
        metrics: &[DerivativesMetric],
        fees: &FeeModel,
        now: DateTime<Utc>,
    ) -> Vec<FundingOpportunity> {
        let fee_drag_pct = fees.round_trip_fee_rate() * dec!(100) * dec!(365) / self.hold_days;

        let mut opportunities = Vec::new();
        for metric in metrics {
            if metric.funding_rate <= Decimal::ZERO || metric.mark_price <= Decimal::ZERO {
                continue;
            }

            let annualized_rate_pct =
                metric.funding_rate * FUNDING_PERIODS_PER_DAY * dec!(365) * dec!(100);
            let estimated_apy = annualized_rate_pct - fee_drag_pct;
            if estimated_apy <= self.min_apy_pct {
                continue;
            }

            let quality = classify_age(now.signed_duration_since(metric.recorded_at));
            let risk_level = funding_risk(annualized_rate_pct);

            opportunities.push(FundingOpportunity {
                id: uuid::Uuid::new_v4().to_string(),
                symbol: metric.symbol.clone(),
                venue: metric.venue.clone(),
                mark_price: metric.mark_price,
                funding_rate: metric.funding_rate,
                annualized_rate_pct,
                fee_drag_pct,
                estimated_apy,
                confidence: funding_confidence(quality, risk_level),
                risk_level,
                quality,
                discovered_at: now,
            });
        }

        opportunities.sort_by(|a, b| b.estimated_apy.cmp(&a.estimated_apy));
        debug!(count = opportunities.len(), "Funding scan complete");
        opportunities
    }
}

/// Sustained high funding mean-reverts; the richer the print, the riskier
/// the carry.
fn funding_risk(annualized_rate_pct: Decimal) -> RiskLevel {
    if annualized_rate_pct < dec!(5) {
        RiskLevel::Low
    } else if annualized_rate_pct < dec!(15) {
        RiskLevel::Moderate
    } else if annualized_rate_pct < dec!(40) {
        RiskLevel::High
    } else {
        RiskLevel::Extreme
    }
}

fn funding_confidence(quality: DataQuality, risk: RiskLevel) -> Decimal {
    let base = match quality {
        DataQuality::Realtime => dec!(0.9),
        DataQuality::Delayed => dec!(0.7),
        DataQuality::Derived => dec!(0.5),
        DataQuality::Simulated => dec!(0.2),
    };
    if risk == RiskLevel::Extreme {
        base * dec!(0.8)
    } else {
        base
    }
}
