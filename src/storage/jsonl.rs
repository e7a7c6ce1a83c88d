//! File-backed store: append-only JSONL logs plus a JSON settings file

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::errors::{ArbError, ArbResult};
use crate::storage::Store;
use crate::types::{
    DerivativesMetric, ExecutionRecord, IntelligenceSignal, PerformanceMetric, RiskSettings,
};

const RISK_SETTINGS_FILE: &str = "risk_settings.json";

/// Store backed by daily JSONL files under the data directory. Execution
/// records and derivatives metrics are also indexed in memory; the index
/// is rebuilt from the log files on startup with the last line per id
/// winning.
pub struct JsonlStore {
    data_dir: PathBuf,
    executions: Mutex<HashMap<String, ExecutionRecord>>,
    derivatives: Mutex<HashMap<(String, String), DerivativesMetric>>,
    risk: Mutex<Option<RiskSettings>>,
}

impl JsonlStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> ArbResult<Self> {
        let data_dir = data_dir.into();
        for sub in ["executions", "metrics", "derivatives", "signals"] {
            fs::create_dir_all(data_dir.join(sub)).map_err(|e| ArbError::Storage {
                context: format!("create {} directory", sub),
                source: e.into(),
            })?;
        }

        let executions = replay_executions(&data_dir.join("executions"))?;
        let risk = load_risk_file(&data_dir)?;
        info!(
            executions = executions.len(),
            "Storage initialized at {}",
            data_dir.display()
        );

        Ok(Self {
            data_dir,
            executions: Mutex::new(executions),
            derivatives: Mutex::new(HashMap::new()),
            risk: Mutex::new(risk),
        })
    }

    fn append_line<T: Serialize>(&self, sub: &str, name: &str, value: &T) -> ArbResult<()> {
        let filename = self
            .data_dir
            .join(sub)
            .join(format!("{}_{}.jsonl", name, Utc::now().format("%Y-%m-%d")));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&filename)
            .map_err(|e| ArbError::Storage {
                context: format!("open {}", filename.display()),
                source: e.into(),
            })?;

        let line = serde_json::to_string(value).map_err(|e| ArbError::Storage {
            context: "serialize record".to_string(),
            source: e.into(),
        })?;
        writeln!(file, "{}", line).map_err(|e| ArbError::Storage {
            context: format!("append {}", filename.display()),
            source: e.into(),
        })?;
        Ok(())
    }

    fn write_risk_file(&self, settings: &RiskSettings) -> ArbResult<()> {
        let path = self.data_dir.join(RISK_SETTINGS_FILE);
        let body = serde_json::to_string_pretty(settings).map_err(|e| ArbError::Storage {
            context: "serialize risk settings".to_string(),
            source: e.into(),
        })?;
        fs::write(&path, body).map_err(|e| ArbError::Storage {
            context: format!("write {}", path.display()),
            source: e.into(),
        })
    }
}

#[async_trait]
impl Store for JsonlStore {
    async fn record_execution(&self, record: &ExecutionRecord) -> ArbResult<()> {
        self.append_line("executions", "executions", record)?;
        self.executions
            .lock()
            .await
            .insert(record.id.clone(), record.clone());
        info!(
            execution_id = %record.id,
            status = ?record.status,
            net_profit = %record.net_profit,
            "Saved execution record"
        );
        Ok(())
    }

    async fn update_execution(&self, record: &ExecutionRecord) -> ArbResult<()> {
        self.append_line("executions", "executions", record)?;
        self.executions
            .lock()
            .await
            .insert(record.id.clone(), record.clone());
        info!(
            execution_id = %record.id,
            status = ?record.status,
            "Updated execution record"
        );
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
        self.write_risk_file(settings)?;
        *self.risk.lock().await = Some(settings.clone());
        Ok(())
    }

    async fn record_metric(&self, metric: &PerformanceMetric) -> ArbResult<()> {
        self.append_line("metrics", "performance", metric)
    }

    async fn record_derivatives_metric(&self, metric: &DerivativesMetric) -> ArbResult<()> {
        self.append_line("derivatives", "derivatives", metric)?;
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
        self.append_line("signals", "signals", signal)?;
        info!(
            signal_id = %signal.id,
            kind = %signal.kind,
            direction = ?signal.direction,
            "Saved intelligence signal"
        );
        Ok(())
    }
}

fn replay_executions(dir: &Path) -> ArbResult<HashMap<String, ExecutionRecord>> {
    let mut records = HashMap::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(records),
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();

    for path in files {
        let content = fs::read_to_string(&path).map_err(|e| ArbError::Storage {
            context: format!("read {}", path.display()),
            source: e.into(),
        })?;
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<ExecutionRecord>(line) {
                Ok(record) => {
                    records.insert(record.id.clone(), record);
                }
                Err(e) => warn!("Skipping malformed line in {}: {}", path.display(), e),
            }
        }
    }
    Ok(records)
}

fn load_risk_file(data_dir: &Path) -> ArbResult<Option<RiskSettings>> {
    let path = data_dir.join(RISK_SETTINGS_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path).map_err(|e| ArbError::Storage {
        context: format!("read {}", path.display()),
        source: e.into(),
    })?;
    match serde_json::from_str(&content) {
        Ok(settings) => Ok(Some(settings)),
        Err(e) => {
            warn!("Ignoring malformed risk settings file: {}", e);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExecutionPath, ExecutionStatus, RiskState};
    use rust_decimal_macros::dec;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "arb-store-{}-{}",
            tag,
            uuid::Uuid::new_v4()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sample_record(id: &str, symbol: &str) -> ExecutionRecord {
        ExecutionRecord {
            id: id.to_string(),
            opportunity_id: "opp-1".to_string(),
            symbol: symbol.to_string(),
            buy_venue: "binance".to_string(),
            sell_venue: "kraken".to_string(),
            buy_price: dec!(100),
            sell_price: dec!(101),
            quantity: dec!(10),
            fees: dec!(0.5),
            net_profit: dec!(9.5),
            status: ExecutionStatus::Simulated,
            path: ExecutionPath::Manual,
            execution_time_ms: 42,
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn executions_survive_a_store_restart() {
        let dir = temp_dir("restart");
        {
            let store = JsonlStore::new(&dir).unwrap();
            store.record_execution(&sample_record("ex-1", "BTC")).await.unwrap();
            store.record_execution(&sample_record("ex-2", "ETH")).await.unwrap();

            let mut closed = sample_record("ex-1", "BTC");
            closed.status = ExecutionStatus::Closed;
            closed.completed_at = Some(Utc::now());
            store.update_execution(&closed).await.unwrap();
        }

        let reopened = JsonlStore::new(&dir).unwrap();
        let found = reopened.find_execution("ex-1").await.unwrap().unwrap();
        assert_eq!(found.status, ExecutionStatus::Closed);
        assert!(found.completed_at.is_some());

        let open = reopened.open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "ex-2");

        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn history_filters_by_symbol_and_respects_limit() {
        let dir = temp_dir("history");
        let store = JsonlStore::new(&dir).unwrap();
        for i in 0..5 {
            store
                .record_execution(&sample_record(&format!("btc-{}", i), "BTC"))
                .await
                .unwrap();
        }
        store.record_execution(&sample_record("eth-0", "ETH")).await.unwrap();

        let btc = store.execution_history(Some("BTC"), 3).await.unwrap();
        assert_eq!(btc.len(), 3);
        assert!(btc.iter().all(|r| r.symbol == "BTC"));

        let all = store.execution_history(None, 100).await.unwrap();
        assert_eq!(all.len(), 6);

        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn risk_settings_round_trip_through_the_settings_file() {
        let dir = temp_dir("risk");
        {
            let store = JsonlStore::new(&dir).unwrap();
            assert!(store.load_risk_settings().await.unwrap().is_none());

            let mut settings = RiskSettings::default();
            settings.state = RiskState::new(dec!(-250), Utc::now());
            settings.state.kill_switch_active = true;
            settings.state.kill_switch_reason = Some("drill".to_string());
            store.save_risk_settings(&settings).await.unwrap();
        }

        let reopened = JsonlStore::new(&dir).unwrap();
        let loaded = reopened.load_risk_settings().await.unwrap().unwrap();
        assert!(loaded.state.kill_switch_active);
        assert_eq!(loaded.state.daily_pnl_limit, dec!(-250));

        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn derivatives_index_keeps_latest_per_symbol_venue() {
        let dir = temp_dir("deriv");
        let store = JsonlStore::new(&dir).unwrap();

        let mut first = DerivativesMetric {
            symbol: "BTC".to_string(),
            venue: "binance_futures".to_string(),
            mark_price: dec!(65000),
            funding_rate: dec!(0.0001),
            open_interest: None,
            recorded_at: Utc::now(),
        };
        store.record_derivatives_metric(&first).await.unwrap();
        first.funding_rate = dec!(0.0003);
        store.record_derivatives_metric(&first).await.unwrap();

        let latest = store.latest_derivatives_metrics().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].funding_rate, dec!(0.0003));

        fs::remove_dir_all(&dir).ok();
    }
}
