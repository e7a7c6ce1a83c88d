//! In-memory store for tests and ephemeral runs

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::errors::ArbResult;
use crate::storage::Store;
use crate::types::{
    DerivativesMetric, ExecutionRecord, IntelligenceSignal, PerformanceMetric, RiskSettings,
};

/// Keeps everything in process memory. Same contract as `JsonlStore`
/// minus durability.
#[derive(Default)]
pub struct MemoryStore {
    executions: Mutex<HashMap<String, ExecutionRecord>>,
    derivatives: Mutex<HashMap<(String, String), DerivativesMetric>>,
    risk: Mutex<Option<RiskSettings>>,
    metrics: Mutex<Vec<PerformanceMetric>>,
    signals: Mutex<Vec<IntelligenceSignal>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn metrics(&self) -> Vec<PerformanceMetric> {
        self.metrics.lock().await.clone()
    }

    pub async fn signals(&self) -> Vec<IntelligenceSignal> {
        self.signals.lock().await.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn record_execution(&self, record: &ExecutionRecord) -> ArbResult<()> {
        self.executions
            .lock()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_execution(&self, record: &ExecutionRecord) -> ArbResult<()> {
        self.executions
            .lock()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn find_execution(&self, id: &str) -> ArbResult<Option<ExecutionRecord>> {
        Ok(self.executions.lock().await.get(id).cloned())
    }

    async fn execution_history(
        &self,
        symbol: Option<&str>,
        limit: usize,
    ) -> ArbResult<Vec<ExecutionRecord>> {
        let executions = self.executions.lock().await;
        let mut records: Vec<ExecutionRecord> = executions
            .values()
            .filter(|r| symbol.is_none_or(|s| r.symbol == s))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn open_positions(&self) -> ArbResult<Vec<ExecutionRecord>> {
        let executions = self.executions.lock().await;
        let mut records: Vec<ExecutionRecord> = executions
            .values()
            .filter(|r| r.status.is_open())
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn load_risk_settings(&self) -> ArbResult<Option<RiskSettings>> {
        Ok(self.risk.lock().await.clone())
    }

    async fn save_risk_settings(&self, settings: &RiskSettings) -> ArbResult<()> {
        *self.risk.lock().await = Some(settings.clone());
        Ok(())
    }

    async fn record_metric(&self, metric: &PerformanceMetric) -> ArbResult<()> {
        self.metrics.lock().await.push(metric.clone());
        Ok(())
    }

    async fn record_derivatives_metric(&self, metric: &DerivativesMetric) -> ArbResult<()> {
        self.derivatives.lock().await.insert(
            (metric.symbol.clone(), metric.venue.clone()),
            metric.clone(),
        );
        Ok(())
    }

    async fn latest_derivatives_metrics(&self) -> ArbResult<Vec<DerivativesMetric>> {
        let derivatives = self.derivatives.lock().await;
        let mut metrics: Vec<DerivativesMetric> = derivatives.values().cloned().collect();
        metrics.sort_by(|a, b| (&a.symbol, &a.venue).cmp(&(&b.symbol, &b.venue)));
        Ok(metrics)
    }

    async fn record_signal(&self, signal: &IntelligenceSignal) -> ArbResult<()> {
        self.signals.lock().await.push(signal.clone());
        Ok(())
    }
}
