//! Fee and slippage model for cross-venue round trips

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

use crate::types::TradeCosts;

/// Cost model for a two-legged round trip: taker fees on both venues, a
/// flat withdrawal charge to move inventory off the buy venue, and
/// size-dependent slippage.
#[derive(Debug, Clone)]
pub struct FeeModel {
    /// Per-leg taker fee as a fraction of notional.
    pub taker_fee_rate: Decimal,
    /// Flat withdrawal charge per venue, keyed by lowercased venue name.
    pub withdrawal_fees_usd: HashMap<String, Decimal>,
    /// Charge for venues missing from the table.
    pub default_withdrawal_fee_usd: Decimal,
    /// Slippage fraction for trades at or under the size threshold.
    pub base_slippage_rate: Decimal,
    pub large_size_threshold: Decimal,
    pub large_size_slippage_rate: Decimal,
}

impl Default for FeeModel {
    fn default() -> Self {
        let withdrawal_fees_usd = HashMap::from([
            ("binance".to_string(), dec!(1.0)),
            ("coinbase exchange".to_string(), dec!(2.0)),
            ("kraken".to_string(), dec!(2.5)),
            ("okx".to_string(), dec!(1.5)),
        ]);
        Self {
            taker_fee_rate: dec!(0.001),
            withdrawal_fees_usd,
            default_withdrawal_fee_usd: dec!(2.0),
            base_slippage_rate: dec!(0.0005),
            large_size_threshold: dec!(10000),
            large_size_slippage_rate: dec!(0.002),
        }
    }
}

impl FeeModel {
    /// Withdrawal charge for moving inventory off a venue. Lookup is
    /// case-insensitive; unlisted venues pay the default.
    pub fn withdrawal_fee(&self, venue: &str) -> Decimal {
        self.withdrawal_fees_usd
            .get(venue.to_lowercase().as_str())
            .copied()
            .unwrap_or(self.default_withdrawal_fee_usd)
    }

    /// Full cost of one round trip at the given notional. The withdrawal
    /// leg is charged by the venue the bought inventory leaves.
    pub fn trade_costs(&self, notional: Decimal, withdraw_venue: &str) -> TradeCosts {
        let trading_fees = notional * self.taker_fee_rate * dec!(2);
        let withdrawal_fee = self.withdrawal_fee(withdraw_venue);
        let slippage_rate = if notional > self.large_size_threshold {
            self.large_size_slippage_rate
        } else {
            self.base_slippage_rate
        };
        let slippage = notional * slippage_rate;

        TradeCosts {
            trading_fees,
            withdrawal_fee,
            slippage,
            total_cost: trading_fees + withdrawal_fee + slippage,
        }
    }

    /// Percentage fee fraction of one round trip, excluding the flat
    /// withdrawal charge. Used by the funding scanner for carry drag.
    pub fn round_trip_fee_rate(&self) -> Decimal {
        self.taker_fee_rate * dec!(2) + self.base_slippage_rate
    }
}
