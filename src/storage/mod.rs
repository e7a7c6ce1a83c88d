//! Persistence for executions, risk settings, metrics, and signals

pub mod jsonl;
pub mod memory;

use async_trait::async_trait;

use crate::errors::ArbResult;
use crate::types::{
    DerivativesMetric, ExecutionRecord, IntelligenceSignal, PerformanceMetric, RiskSettings,
};

/// Persistence surface for everything the scanner and executor produce.
/// Execution records are append-oriented; updates write a superseding
/// version of the same id.
#[async_trait]
pub trait Store: Send + Sync {
    async fn record_execution(&self, record: &ExecutionRecord) -> ArbResult<()>;
    async fn update_execution(&self, record: &ExecutionRecord) -> ArbResult<()>;
    async fn find_execution(&self, id: &str) -> ArbResult<Option<ExecutionRecord>>;
    async fn execution_history(
        &self,
        symbol: Option<&str>,
        limit: usize,
    ) -> ArbResult<Vec<ExecutionRecord>>;
    async fn open_positions(&self) -> ArbResult<Vec<ExecutionRecord>>;

    async fn load_risk_settings(&self) -> ArbResult<Option<RiskSettings>>;
    async fn save_risk_settings(&self, settings: &RiskSettings) -> ArbResult<()>;

    async fn record_metric(&self, metric: &PerformanceMetric) -> ArbResult<()>;
    async fn record_derivatives_metric(&self, metric: &DerivativesMetric) -> ArbResult<()>;
    async fn latest_derivatives_metrics(&self) -> ArbResult<Vec<DerivativesMetric>>;
    async fn record_signal(&self, signal: &IntelligenceSignal) -> ArbResult<()>;
}

pub use jsonl::*;
pub use memory::*;
