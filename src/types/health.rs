//! Health monitoring types

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub cache_size: usize,
    pub pending_fetches: usize,
    pub upstream_ok: bool,
    pub last_upstream_success: Option<DateTime<Utc>>,
    pub uptime_seconds: u64,
    pub latency_ms: u64,
}
