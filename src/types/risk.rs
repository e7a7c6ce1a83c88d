//! Risk gate state and decision types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use super::{DataQuality, ExecutionPath, TradeIntent};

/// Long-lived safety state, persisted by the store and mutated only through
/// the explicit transitions in `risk::gate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub kill_switch_active: bool,
    pub kill_switch_reason: Option<String>,
    pub reduce_only_mode: bool,
    pub daily_pnl: Decimal,
    /// Negative threshold; the breaker trips when daily_pnl falls to it.
    pub daily_pnl_limit: Decimal,
    pub last_auto_execute_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl RiskState {
    pub fn new(daily_pnl_limit: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            kill_switch_active: false,
            kill_switch_reason: None,
            reduce_only_mode: false,
            daily_pnl: Decimal::ZERO,
            daily_pnl_limit,
            last_auto_execute_at: None,
            updated_at: now,
        }
    }

    pub fn mode(&self) -> RiskMode {
        if self.kill_switch_active {
            RiskMode::Halted
        } else if self.reduce_only_mode {
            RiskMode::ReduceOnly
        } else {
            RiskMode::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskMode {
    Normal,
    ReduceOnly,
    Halted,
}

/// Operator settings for the automatic execution path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoExecuteSettings {
    pub enabled: bool,
    pub min_profit_threshold: Decimal,
    pub max_position_size: Decimal,
    pub cooldown_ms: u64,
}

impl Default for AutoExecuteSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            min_profit_threshold: dec!(5),
            max_position_size: dec!(10000),
            cooldown_ms: 60_000,
        }
    }
}

/// The persisted risk settings document: breaker state plus auto-execute
/// knobs, stored and re-read as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSettings {
    pub state: RiskState,
    pub auto_execute: AutoExecuteSettings,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            state: RiskState::new(dec!(-500), Utc::now()),
            auto_execute: AutoExecuteSettings::default(),
        }
    }
}

/// What the gate is asked to approve.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub net_profit: Decimal,
    pub quality: DataQuality,
    pub notional: Decimal,
    pub path: ExecutionPath,
    pub intent: TradeIntent,
}

/// Machine-readable denial codes, serialized into the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    KillSwitchActive,
    DailyLossLimit,
    ReduceOnlyMode,
    SimulatedData,
    AutoExecuteDisabled,
    CooldownActive,
    BelowMinProfit,
    PositionTooLarge,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::KillSwitchActive => "kill_switch_active",
            DenyReason::DailyLossLimit => "daily_loss_limit",
            DenyReason::ReduceOnlyMode => "reduce_only_mode",
            DenyReason::SimulatedData => "simulated_data",
            DenyReason::AutoExecuteDisabled => "auto_execute_disabled",
            DenyReason::CooldownActive => "cooldown_active",
            DenyReason::BelowMinProfit => "below_min_profit",
            DenyReason::PositionTooLarge => "position_too_large",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskDecision {
    Allow,
    Deny(DenyReason),
}

impl RiskDecision {
    pub fn is_allowed(self) -> bool {
        self == RiskDecision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn mode_prefers_halted_over_reduce_only() {
        let mut state = RiskState::new(dec!(-500), Utc::now());
        assert_eq!(state.mode(), RiskMode::Normal);
        state.reduce_only_mode = true;
        assert_eq!(state.mode(), RiskMode::ReduceOnly);
        state.kill_switch_active = true;
        assert_eq!(state.mode(), RiskMode::Halted);
    }

    #[test]
    fn deny_reason_codes_are_snake_case() {
        assert_eq!(DenyReason::KillSwitchActive.as_str(), "kill_switch_active");
        assert_eq!(
            serde_json::to_string(&DenyReason::CooldownActive).ok(),
            Some("\"cooldown_active\"".to_string())
        );
    }
}
