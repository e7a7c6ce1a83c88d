//! Cross-venue spread scanning

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::arbitrage::fees::FeeModel;
use crate::config::Config;
use crate::types::{ArbitrageOpportunity, DataQuality, RiskLevel, VenueQuote};

/// Finds buy-low/sell-high pairs across venues for each symbol and prices
/// them net of the full round-trip cost.
pub struct OpportunityScanner {
    min_spread_pct: Decimal,
    actionable_profit_usd: Decimal,
}

impl OpportunityScanner {
    pub fn new(min_spread_pct: Decimal, actionable_profit_usd: Decimal) -> Self {
        Self {
            min_spread_pct,
            actionable_profit_usd,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.min_spread_pct, config.actionable_profit_usd)
    }

    /// Scans a flat list of venue quotes. Returns opportunities sorted by
    /// net profit, best first. Quotes without positive two-sided prices
    /// are ignored.
    pub fn scan(
        &self,
        quotes: &[VenueQuote],
        fees: &FeeModel,
        trade_size_usd: Decimal,
    ) -> Vec<ArbitrageOpportunity> {
        let mut by_symbol: HashMap<&str, Vec<&VenueQuote>> = HashMap::new();
        for quote in quotes {
            if quote.bid > Decimal::ZERO && quote.ask > Decimal::ZERO {
                by_symbol.entry(quote.symbol.as_str()).or_default().push(quote);
            }
        }

        let mut opportunities = Vec::new();
        for (symbol, venue_quotes) in by_symbol {
            let venues: HashSet<&str> = venue_quotes.iter().map(|q| q.venue.as_str()).collect();
            if venues.len() < 2 {
                continue;
            }

            let buy = venue_quotes.iter().copied().min_by(|a, b| a.ask.cmp(&b.ask));
            let sell = venue_quotes.iter().copied().max_by(|a, b| a.bid.cmp(&b.bid));
            let (Some(buy), Some(sell)) = (buy, sell) else {
                continue;
            };
            // cheapest ask and richest bid on one venue is not a cross-venue trade
            if buy.venue == sell.venue {
                continue;
            }

            let spread = sell.bid - buy.ask;
            if spread <= Decimal::ZERO {
                continue;
            }
            let spread_pct = spread / buy.ask * dec!(100);
            if spread_pct < self.min_spread_pct {
                continue;
            }

            let quantity = trade_size_usd / buy.ask;
            opportunities.push(self.build_opportunity(
                symbol,
                buy,
                sell,
                quantity,
                fees,
                venues.len(),
            ));
        }

        opportunities.sort_by(|a, b| b.net_profit.cmp(&a.net_profit));
        debug!(count = opportunities.len(), "Spread scan complete");
        opportunities
    }

    /// Prices one opportunity between two specific venue quotes at a fixed
    /// quantity.
    pub fn build_opportunity(
        &self,
        symbol: &str,
        buy: &VenueQuote,
        sell: &VenueQuote,
        quantity: Decimal,
        fees: &FeeModel,
        venue_count: usize,
    ) -> ArbitrageOpportunity {
        let gross_profit = (sell.bid - buy.ask) * quantity;
        let notional = buy.ask * quantity;
        let costs = fees.trade_costs(notional, &buy.venue);
        let net_profit = gross_profit - costs.total_cost;
        let spread_pct = if buy.ask > Decimal::ZERO {
            (sell.bid - buy.ask) / buy.ask * dec!(100)
        } else {
            Decimal::ZERO
        };

        let quality = buy.quality.worse_of(sell.quality);
        let confidence = confidence_score(quality, venue_count);
        let risk_level = risk_for(spread_pct, quality);
        let is_actionable = net_profit > self.actionable_profit_usd && quality.trading_allowed();

        ArbitrageOpportunity {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            buy_venue: buy.venue.clone(),
            sell_venue: sell.venue.clone(),
            buy_price: buy.ask,
            sell_price: sell.bid,
            spread_pct,
            quantity,
            gross_profit,
            costs,
            net_profit,
            confidence,
            risk_level,
            quality,
            is_actionable,
            discovered_at: Utc::now(),
        }
    }
}

fn confidence_score(quality: DataQuality, venue_count: usize) -> Decimal {
    let base = match quality {
        DataQuality::Realtime => dec!(0.9),
        DataQuality::Delayed => dec!(0.7),
        DataQuality::Derived => dec!(0.5),
        DataQuality::Simulated => dec!(0.2),
    };
    let extra = Decimal::from(venue_count.saturating_sub(2) as u64);
    let depth_bonus = (extra * dec!(0.02)).min(dec!(0.1));
    (base + depth_bonus).min(Decimal::ONE)
}

fn risk_for(spread_pct: Decimal, quality: DataQuality) -> RiskLevel {
    let base = if spread_pct < dec!(0.5) {
        RiskLevel::Low
    } else if spread_pct < dec!(2) {
        RiskLevel::Moderate
    } else if spread_pct < dec!(5) {
        RiskLevel::High
    } else {
        RiskLevel::Extreme
    };
    // anything short of realtime data makes the printed spread less trustworthy
    if quality == DataQuality::Realtime {
        base
    } else {
        base.bumped()
    }
}
