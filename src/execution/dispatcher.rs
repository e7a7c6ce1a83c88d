//! Paper execution of priced opportunities

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::arbitrage::funding::DEFAULT_HOLD_DAYS;
use crate::errors::{ArbError, ArbResult};
use crate::risk::RiskGate;
use crate::storage::Store;
use crate::types::{
    ArbitrageOpportunity, DataQuality, ExecutionPath, ExecutionRecord, ExecutionRequest,
    ExecutionStatus, FundingOpportunity, RiskLevel, TradeIntent,
};

/// Fills opportunities on paper: no venue connectivity, realistic-ish
/// latency and slippage, and every attempt lands in the store whether it
/// filled or not.
pub struct ExecutionDispatcher {
    store: Arc<dyn Store>,
    gate: Arc<RiskGate>,
}

impl ExecutionDispatcher {
    pub fn new(store: Arc<dyn Store>, gate: Arc<RiskGate>) -> Self {
        Self { store, gate }
    }

    /// Opens a paper position for a spread opportunity. The risk gate runs
    /// first; a denial surfaces as an error and writes nothing. A fill
    /// attempt always persists, including rejected inputs.
    pub async fn execute(
        &self,
        opportunity: &ArbitrageOpportunity,
        quantity: Decimal,
        path: ExecutionPath,
    ) -> ArbResult<ExecutionRecord> {
        // profit and fees scale linearly when the caller overrides quantity
        let scale = if opportunity.quantity > Decimal::ZERO {
            quantity / opportunity.quantity
        } else {
            Decimal::ONE
        };
        let expected_net = opportunity.net_profit * scale;
        let fees = opportunity.costs.total_cost * scale;
        let notional = quantity * opportunity.buy_price;

        self.gate
            .check(&ExecutionRequest {
                net_profit: expected_net,
                quality: opportunity.quality,
                notional,
                path,
                intent: TradeIntent::Open,
            })
            .await?;

        let mut record = ExecutionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            opportunity_id: opportunity.id.clone(),
            symbol: opportunity.symbol.clone(),
            buy_venue: opportunity.buy_venue.clone(),
            sell_venue: opportunity.sell_venue.clone(),
            buy_price: opportunity.buy_price,
            sell_price: opportunity.sell_price,
            quantity,
            fees,
            net_profit: expected_net,
            status: ExecutionStatus::Simulated,
            path,
            execution_time_ms: 0,
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
        };

        if quantity <= Decimal::ZERO
            || opportunity.buy_price <= Decimal::ZERO
            || opportunity.sell_price <= Decimal::ZERO
        {
            record.status = ExecutionStatus::Failed;
            record.net_profit = Decimal::ZERO;
            record.completed_at = Some(Utc::now());
            record.error_message = Some("rejected: quantity and prices must be positive".to_string());
            self.store.record_execution(&record).await?;
            return Ok(record);
        }

        let latency_ms = simulate_fill_latency().await;
        record.execution_time_ms = latency_ms;
        record.net_profit = expected_net - notional * slippage_bps(opportunity.risk_level) / dec!(10000);

        self.store.record_execution(&record).await?;
        if path == ExecutionPath::Automatic {
            self.gate.mark_auto_executed().await?;
        }

        info!(
            execution_id = %record.id,
            symbol = %record.symbol,
            net_profit = %record.net_profit,
            latency_ms,
            "🎭 Paper fill complete"
        );
        Ok(record)
    }

    /// Opens a paper carry position for a funding opportunity. The two
    /// legs live on the same venue's spot and perp books.
    pub async fn execute_funding(
        &self,
        opportunity: &FundingOpportunity,
        quantity: Decimal,
        path: ExecutionPath,
    ) -> ArbResult<ExecutionRecord> {
        let notional = quantity * opportunity.mark_price;
        let hold_fraction = DEFAULT_HOLD_DAYS / dec!(365);
        let expected_net = notional * opportunity.estimated_apy / dec!(100) * hold_fraction;
        let fees = notional * opportunity.fee_drag_pct / dec!(100) * hold_fraction;

        self.gate
            .check(&ExecutionRequest {
                net_profit: expected_net,
                quality: opportunity.quality,
                notional,
                path,
                intent: TradeIntent::Open,
            })
            .await?;

        let mut record = ExecutionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            opportunity_id: opportunity.id.clone(),
            symbol: opportunity.symbol.clone(),
            buy_venue: format!("{}-spot", opportunity.venue),
            sell_venue: format!("{}-perp", opportunity.venue),
            buy_price: opportunity.mark_price,
            sell_price: opportunity.mark_price,
            quantity,
            fees,
            net_profit: expected_net,
            status: ExecutionStatus::Simulated,
            path,
            execution_time_ms: 0,
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
        };

        if quantity <= Decimal::ZERO || opportunity.mark_price <= Decimal::ZERO {
            record.status = ExecutionStatus::Failed;
            record.net_profit = Decimal::ZERO;
            record.completed_at = Some(Utc::now());
            record.error_message = Some("rejected: quantity and mark price must be positive".to_string());
            self.store.record_execution(&record).await?;
            return Ok(record);
        }

        let latency_ms = simulate_fill_latency().await;
        record.execution_time_ms = latency_ms;
        record.net_profit = expected_net - notional * slippage_bps(opportunity.risk_level) / dec!(10000);

        self.store.record_execution(&record).await?;
        if path == ExecutionPath::Automatic {
            self.gate.mark_auto_executed().await?;
        }

        info!(
            execution_id = %record.id,
            symbol = %record.symbol,
            venue = %opportunity.venue,
            estimated_apy = %opportunity.estimated_apy,
            "🎭 Paper carry position opened"
        );
        Ok(record)
    }

    /// Closes an open paper position. With an exit value the realized
    /// profit is exit minus entry notional; without one the expected net
    /// is taken as realized. The realized amount feeds the daily P&L
    /// breaker.
    pub async fn close_position(
        &self,
        id: &str,
        exit_value: Option<Decimal>,
    ) -> ArbResult<ExecutionRecord> {
        let mut record = self
            .store
            .find_execution(id)
            .await?
            .ok_or_else(|| ArbError::PositionNotFound { id: id.to_string() })?;

        if !record.status.is_open() {
            return Err(ArbError::InvalidTransition {
                id: id.to_string(),
                status: record.status,
            });
        }

        let notional = record.quantity * record.buy_price;
        self.gate
            .check(&ExecutionRequest {
                net_profit: record.net_profit,
                quality: DataQuality::Realtime,
                notional,
                path: ExecutionPath::Manual,
                intent: TradeIntent::Close,
            })
            .await?;

        let realized = match exit_value {
            Some(exit) => exit - notional,
            None => record.net_profit,
        };

        record.status = ExecutionStatus::Closed;
        record.completed_at = Some(Utc::now());
        record.net_profit = realized;
        self.store.update_execution(&record).await?;
        self.gate.record_realized_pnl(realized).await?;

        info!(
            execution_id = %record.id,
            realized = %realized,
            "✅ Position closed"
        );
        Ok(record)
    }
}

async fn simulate_fill_latency() -> u64 {
    let latency_ms = 20 + (rand::random::<f64>() * 60.0) as u64;
    tokio::time::sleep(Duration::from_millis(latency_ms)).await;
    latency_ms
}

/// Paper slippage charge in basis points of notional, on top of the
/// modelled costs already in the opportunity.
fn slippage_bps(risk: RiskLevel) -> Decimal {
    let extra = match risk {
        RiskLevel::Low => dec!(0),
        RiskLevel::Moderate => dec!(15),
        RiskLevel::High => dec!(40),
        RiskLevel::Extreme => dec!(100),
    };
    dec!(10) + extra
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::MemoryStore;
    use crate::types::{RiskMode, TradeCosts};

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

    fn harness(configure: impl FnOnce(&mut Config)) -> (ExecutionDispatcher, Arc<MemoryStore>, Arc<RiskGate>) {
        let store = Arc::new(MemoryStore::new());
        let mut config = Config::load();
        config.daily_pnl_limit_usd = dec!(-500);
        configure(&mut config);
        let gate = Arc::new(RiskGate::new(store.clone(), &config));
        (ExecutionDispatcher::new(store.clone(), gate.clone()), store, gate)
    }

    #[tokio::test]
    async fn paper_fill_persists_an_open_record() {
        let (dispatcher, store, _) = harness(|_| {});
        let record = dispatcher
            .execute(&sample_opportunity(), dec!(10), ExecutionPath::Manual)
            .await
            .unwrap();

        assert_eq!(record.status, ExecutionStatus::Simulated);
        assert!(record.status.is_open());
        assert!(record.completed_at.is_none());
        assert!(record.execution_time_ms >= 20);
        // expected net minus 10bps of paper slippage on 1000 notional
        assert_eq!(record.net_profit, dec!(3.2));

        let stored = store.find_execution(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Simulated);
    }

    #[tokio::test]
    async fn gate_denial_persists_nothing() {
        let (dispatcher, store, gate) = harness(|_| {});
        gate.activate_kill_switch("drill").await.unwrap();

        let err = dispatcher
            .execute(&sample_opportunity(), dec!(10), ExecutionPath::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, ArbError::RiskGateDenied { .. }));
        assert!(store.execution_history(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_inputs_still_write_a_failed_record() {
        let (dispatcher, store, _) = harness(|_| {});
        let record = dispatcher
            .execute(&sample_opportunity(), dec!(0), ExecutionPath::Manual)
            .await
            .unwrap();

        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.completed_at.is_some());
        assert!(record.error_message.is_some());

        let stored = store.find_execution(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn auto_path_stamps_the_cooldown_clock() {
        let (dispatcher, _, gate) = harness(|config| {
            config.auto_execute_enabled = true;
            config.auto_min_profit_usd = dec!(1);
        });

        dispatcher
            .execute(&sample_opportunity(), dec!(10), ExecutionPath::Automatic)
            .await
            .unwrap();
        let settings = gate.settings().await.unwrap();
        assert!(settings.state.last_auto_execute_at.is_some());

        let err = dispatcher
            .execute(&sample_opportunity(), dec!(10), ExecutionPath::Automatic)
            .await
            .unwrap_err();
        assert_eq!(err.deny_reason(), Some(crate::types::DenyReason::CooldownActive));
    }

    #[tokio::test]
    async fn close_realizes_profit_and_stamps_completion() {
        let (dispatcher, _, gate) = harness(|_| {});
        let open = dispatcher
            .execute(&sample_opportunity(), dec!(10), ExecutionPath::Manual)
            .await
            .unwrap();

        let closed = dispatcher
            .close_position(&open.id, Some(dec!(1025)))
            .await
            .unwrap();

        assert_eq!(closed.status, ExecutionStatus::Closed);
        assert!(closed.completed_at.is_some());
        assert_eq!(closed.net_profit, dec!(25));
        assert_eq!(gate.settings().await.unwrap().state.daily_pnl, dec!(25));
    }

    #[tokio::test]
    async fn closing_twice_is_an_invalid_transition() {
        let (dispatcher, _, _) = harness(|_| {});
        let open = dispatcher
            .execute(&sample_opportunity(), dec!(10), ExecutionPath::Manual)
            .await
            .unwrap();

        dispatcher.close_position(&open.id, None).await.unwrap();
        let err = dispatcher.close_position(&open.id, None).await.unwrap_err();
        assert!(matches!(err, ArbError::InvalidTransition { .. }));

        let missing = dispatcher.close_position("nope", None).await.unwrap_err();
        assert!(matches!(missing, ArbError::PositionNotFound { .. }));
    }

    #[tokio::test]
    async fn a_losing_close_can_trip_the_breaker() {
        let (dispatcher, _, gate) = harness(|_| {});
        let open = dispatcher
            .execute(&sample_opportunity(), dec!(10), ExecutionPath::Manual)
            .await
            .unwrap();

        // exit 510 under the 1000 entry notional, limit is -500
        dispatcher
            .close_position(&open.id, Some(dec!(490)))
            .await
            .unwrap();

        let settings = gate.settings().await.unwrap();
        assert_eq!(settings.state.mode(), RiskMode::Halted);

        let err = dispatcher
            .execute(&sample_opportunity(), dec!(10), ExecutionPath::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, ArbError::RiskGateDenied { .. }));
    }

    #[tokio::test]
    async fn funding_fill_builds_synthetic_spot_and_perp_venues() {
        let (dispatcher, _, _) = harness(|_| {});
        let opportunity = FundingOpportunity {
            id: "fund-1".to_string(),
            symbol: "BTC".to_string(),
            venue: "binance_futures".to_string(),
            mark_price: dec!(65000),
            funding_rate: dec!(0.0003),
            annualized_rate_pct: dec!(32.85),
            fee_drag_pct: dec!(3),
            estimated_apy: dec!(29.85),
            confidence: dec!(0.9),
            risk_level: RiskLevel::High,
            quality: DataQuality::Realtime,
            discovered_at: Utc::now(),
        };

        let record = dispatcher
            .execute_funding(&opportunity, dec!(0.1), ExecutionPath::Manual)
            .await
            .unwrap();

        assert_eq!(record.buy_venue, "binance_futures-spot");
        assert_eq!(record.sell_venue, "binance_futures-perp");
        assert_eq!(record.buy_price, dec!(65000));
        assert!(record.status.is_open());
    }
}
