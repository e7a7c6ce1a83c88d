//! Kill switch, daily loss breaker, and execution gating

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::{ArbError, ArbResult};
use crate::storage::Store;
use crate::types::{
    AutoExecuteSettings, DataQuality, DenyReason, ExecutionPath, ExecutionRequest, RiskDecision,
    RiskSettings, RiskState, TradeIntent,
};

/// Emitted when a realized loss pushes daily P&L through the limit.
#[derive(Debug, Clone)]
pub struct KillSwitchTrip {
    pub reason: String,
    pub daily_pnl: Decimal,
    pub limit: Decimal,
}

// State transitions are pure: old state in, new state out. The gate
// wrapper below owns loading and persisting.

pub fn activate_kill_switch(state: &RiskState, reason: &str, now: DateTime<Utc>) -> RiskState {
    let mut next = state.clone();
    next.kill_switch_active = true;
    next.kill_switch_reason = Some(reason.to_string());
    next.updated_at = now;
    next
}

/// The only way the kill switch comes back off. Daily P&L is left as-is;
/// recovery from a breached limit also needs an explicit P&L reset.
pub fn deactivate_kill_switch(state: &RiskState, now: DateTime<Utc>) -> RiskState {
    let mut next = state.clone();
    next.kill_switch_active = false;
    next.kill_switch_reason = None;
    next.updated_at = now;
    next
}

pub fn set_reduce_only(state: &RiskState, enabled: bool, now: DateTime<Utc>) -> RiskState {
    let mut next = state.clone();
    next.reduce_only_mode = enabled;
    next.updated_at = now;
    next
}

/// Applies a realized P&L delta. Trips the kill switch when the running
/// total falls to the daily limit; an already-active switch is left
/// untouched so the original reason survives.
pub fn record_realized_pnl(
    state: &RiskState,
    delta: Decimal,
    now: DateTime<Utc>,
) -> (RiskState, Option<KillSwitchTrip>) {
    let mut next = state.clone();
    next.daily_pnl += delta;
    next.updated_at = now;

    if next.daily_pnl <= next.daily_pnl_limit && !next.kill_switch_active {
        let reason = format!(
            "daily loss limit breached: {} <= {}",
            next.daily_pnl, next.daily_pnl_limit
        );
        let trip = KillSwitchTrip {
            reason: reason.clone(),
            daily_pnl: next.daily_pnl,
            limit: next.daily_pnl_limit,
        };
        next.kill_switch_active = true;
        next.kill_switch_reason = Some(reason);
        return (next, Some(trip));
    }
    (next, None)
}

pub fn reset_daily_pnl(state: &RiskState, now: DateTime<Utc>) -> RiskState {
    let mut next = state.clone();
    next.daily_pnl = Decimal::ZERO;
    next.updated_at = now;
    next
}

pub fn mark_auto_execution(state: &RiskState, now: DateTime<Utc>) -> RiskState {
    let mut next = state.clone();
    next.last_auto_execute_at = Some(now);
    next.updated_at = now;
    next
}

/// Evaluates a request against the current state. Checks run in a fixed
/// order so a halted system always reports the halt, not a secondary
/// reason.
pub fn decide(
    request: &ExecutionRequest,
    auto: &AutoExecuteSettings,
    state: &RiskState,
    now: DateTime<Utc>,
) -> RiskDecision {
    if state.kill_switch_active {
        return RiskDecision::Deny(DenyReason::KillSwitchActive);
    }
    if state.daily_pnl <= state.daily_pnl_limit {
        return RiskDecision::Deny(DenyReason::DailyLossLimit);
    }

    let opening = request.intent == TradeIntent::Open;
    if opening && state.reduce_only_mode {
        return RiskDecision::Deny(DenyReason::ReduceOnlyMode);
    }
    if opening && request.quality == DataQuality::Simulated {
        return RiskDecision::Deny(DenyReason::SimulatedData);
    }

    if request.path == ExecutionPath::Automatic {
        if !auto.enabled {
            return RiskDecision::Deny(DenyReason::AutoExecuteDisabled);
        }
        if let Some(last) = state.last_auto_execute_at {
            let cooldown = Duration::milliseconds(auto.cooldown_ms as i64);
            // a request exactly at the cooldown boundary is allowed
            if now.signed_duration_since(last) < cooldown {
                return RiskDecision::Deny(DenyReason::CooldownActive);
            }
        }
        if request.net_profit < auto.min_profit_threshold {
            return RiskDecision::Deny(DenyReason::BelowMinProfit);
        }
    }

    if opening && request.notional > auto.max_position_size {
        return RiskDecision::Deny(DenyReason::PositionTooLarge);
    }

    RiskDecision::Allow
}

/// Store-backed gate. Every check reads the persisted settings fresh so
/// an operator flipping the kill switch takes effect on the next request.
pub struct RiskGate {
    store: Arc<dyn Store>,
    defaults: RiskSettings,
    write_lock: Mutex<()>,
}

impl RiskGate {
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Self {
        let defaults = RiskSettings {
            state: RiskState::new(config.daily_pnl_limit_usd, Utc::now()),
            auto_execute: AutoExecuteSettings {
                enabled: config.auto_execute_enabled,
                min_profit_threshold: config.auto_min_profit_usd,
                max_position_size: config.max_position_size_usd,
                cooldown_ms: config.auto_cooldown_ms,
            },
        };
        Self {
            store,
            defaults,
            write_lock: Mutex::new(()),
        }
    }

    /// Loads persisted settings, writing the configured defaults on first
    /// run.
    pub async fn settings(&self) -> ArbResult<RiskSettings> {
        match self.store.load_risk_settings().await? {
            Some(settings) => Ok(settings),
            None => {
                self.store.save_risk_settings(&self.defaults).await?;
                info!("Seeded risk settings with configured defaults");
                Ok(self.defaults.clone())
            }
        }
    }

    /// Approves or rejects an execution request against current state.
    pub async fn check(&self, request: &ExecutionRequest) -> ArbResult<RiskSettings> {
        let settings = self.settings().await?;
        match decide(request, &settings.auto_execute, &settings.state, Utc::now()) {
            RiskDecision::Allow => Ok(settings),
            RiskDecision::Deny(reason) => {
                info!(
                    reason = %reason,
                    path = ?request.path,
                    intent = ?request.intent,
                    "📛 Risk gate denied execution"
                );
                Err(ArbError::RiskGateDenied { reason })
            }
        }
    }

    pub async fn activate_kill_switch(&self, reason: &str) -> ArbResult<RiskState> {
        let state = self
            .transition(|state, now| activate_kill_switch(state, reason, now))
            .await?;
        warn!("🛑 Kill switch activated: {}", reason);
        Ok(state)
    }

    pub async fn deactivate_kill_switch(&self) -> ArbResult<RiskState> {
        let state = self.transition(deactivate_kill_switch).await?;
        info!("Kill switch deactivated");
        Ok(state)
    }

    pub async fn set_reduce_only(&self, enabled: bool) -> ArbResult<RiskState> {
        self.transition(|state, now| set_reduce_only(state, enabled, now))
            .await
    }

    pub async fn reset_daily_pnl(&self) -> ArbResult<RiskState> {
        let state = self.transition(reset_daily_pnl).await?;
        info!("Daily P&L reset to zero");
        Ok(state)
    }

    pub async fn mark_auto_executed(&self) -> ArbResult<()> {
        self.transition(mark_auto_execution).await?;
        Ok(())
    }

    /// Folds a realized P&L delta into state, persisting any trip.
    pub async fn record_realized_pnl(&self, delta: Decimal) -> ArbResult<RiskState> {
        let _guard = self.write_lock.lock().await;
        let mut settings = self.settings().await?;
        let (state, trip) = record_realized_pnl(&settings.state, delta, Utc::now());
        settings.state = state;
        self.store.save_risk_settings(&settings).await?;

        if let Some(trip) = trip {
            warn!(
                daily_pnl = %trip.daily_pnl,
                limit = %trip.limit,
                "🛑 Kill switch tripped by daily loss limit"
            );
        }
        Ok(settings.state)
    }

    async fn transition<F>(&self, apply: F) -> ArbResult<RiskState>
    where
        F: FnOnce(&RiskState, DateTime<Utc>) -> RiskState,
    {
        let _guard = self.write_lock.lock().await;
        let mut settings = self.settings().await?;
        settings.state = apply(&settings.state, Utc::now());
        self.store.save_risk_settings(&settings).await?;
        Ok(settings.state)
    }
}
