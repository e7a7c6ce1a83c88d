//! Quote cache with request coalescing, stale fallback, and an LRU cap

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cache::quality::classify_age;
use crate::config::Config;
use crate::errors::{ArbError, ArbResult};
use crate::network::{symbols, ProviderClient, RateLimiter};
use crate::storage::Store;
use crate::types::{BatchSource, DataQuality, PerformanceMetric, Quote, QuoteBatch};

struct CacheEntry {
    quotes: Vec<Quote>,
    quality: DataQuality,
    cached_at: DateTime<Utc>,
    last_hit: DateTime<Utc>,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    pending: HashMap<String, broadcast::Sender<QuoteBatch>>,
    last_upstream_success: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub pending_fetches: usize,
    pub fetch_successes: u64,
    pub fetch_failures: u64,
    pub last_upstream_success: Option<DateTime<Utc>>,
}

enum Plan {
    Serve(QuoteBatch),
    Wait(broadcast::Receiver<QuoteBatch>),
    Lead,
}

/// TTL cache over the upstream provider. Concurrent requests for the same
/// symbol set collapse into one upstream call; failures degrade to stale
/// or simulated data instead of erroring. Never returns an error.
pub struct QuoteCache {
    provider: Arc<ProviderClient>,
    limiter: Arc<RateLimiter>,
    store: Arc<dyn Store>,
    ttl: ChronoDuration,
    fetch_timeout: Duration,
    max_entries: usize,
    inner: Mutex<CacheInner>,
    fetch_successes: AtomicU64,
    fetch_failures: AtomicU64,
}

/// Deterministic key for a requested symbol set: canonical symbols,
/// de-duplicated, sorted, comma-joined.
pub fn cache_key(requested: &[String]) -> String {
    let mut syms = normalize_symbols(requested);
    syms.sort();
    syms.join(",")
}

fn normalize_symbols(raw: &[String]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for s in raw {
        let canon = symbols::canonical(s);
        if !canon.is_empty() && !seen.contains(&canon) {
            seen.push(canon);
        }
    }
    seen
}

impl QuoteCache {
    pub fn new(
        provider: Arc<ProviderClient>,
        limiter: Arc<RateLimiter>,
        store: Arc<dyn Store>,
        config: &Config,
    ) -> Self {
        Self {
            provider,
            limiter,
            store,
            ttl: ChronoDuration::milliseconds(config.quote_ttl_ms as i64),
            fetch_timeout: Duration::from_millis(config.provider_timeout_ms),
            max_entries: config.cache_max_entries,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                pending: HashMap::new(),
                last_upstream_success: None,
            }),
            fetch_successes: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
        }
    }

    /// Serves quotes for the requested symbols from cache, a coalesced
    /// in-flight fetch, or a fresh upstream call, in that order.
    pub async fn get_quotes(&self, requested: &[String]) -> QuoteBatch {
        let symbols_list = normalize_symbols(requested);
        if symbols_list.is_empty() {
            return self.simulated_batch(&symbols_list);
        }
        let key = cache_key(requested);

        // one bounded re-attempt covers a coalesced leader vanishing mid-flight
        for _ in 0..2 {
            if let Some(batch) = self.serve(&key, &symbols_list).await {
                return batch;
            }
        }
        self.simulated_batch(&symbols_list)
    }

    async fn serve(&self, key: &str, symbols_list: &[String]) -> Option<QuoteBatch> {
        let now = Utc::now();
        let plan = {
            let mut inner = self.lock_inner();
            let fresh = match inner.entries.get_mut(key) {
                Some(entry) if now.signed_duration_since(entry.cached_at) < self.ttl => {
                    entry.last_hit = now;
                    let age = now.signed_duration_since(entry.cached_at);
                    let quality = entry.quality.worse_of(classify_age(age));
                    Some(QuoteBatch {
                        quotes: entry.quotes.clone(),
                        source: BatchSource::Cache,
                        data_quality: quality,
                        trading_allowed: quality.trading_allowed(),
                        cached_at: entry.cached_at,
                    })
                }
                _ => None,
            };

            match fresh {
                Some(batch) => Plan::Serve(batch),
                None => match inner.pending.get(key) {
                    Some(tx) => Plan::Wait(tx.subscribe()),
                    None => {
                        let (tx, _rx) = broadcast::channel(1);
                        inner.pending.insert(key.to_string(), tx);
                        Plan::Lead
                    }
                },
            }
        };

        match plan {
            Plan::Serve(batch) => {
                debug!(key, "Cache hit");
                Some(batch)
            }
            Plan::Wait(mut rx) => match rx.recv().await {
                Ok(batch) => Some(batch),
                Err(_) => {
                    debug!(key, "Coalesced fetch abandoned, retrying");
                    None
                }
            },
            Plan::Lead => Some(self.lead_fetch(key, symbols_list).await),
        }
    }

    /// Runs the single upstream fetch for a key and wakes every coalesced
    /// follower with the same batch, whatever the outcome.
    async fn lead_fetch(&self, key: &str, symbols_list: &[String]) -> QuoteBatch {
        let _pending = PendingGuard {
            cache: self,
            key: key.to_string(),
        };
        let started = std::time::Instant::now();

        self.limiter.acquire().await;
        let outcome =
            tokio::time::timeout(self.fetch_timeout, self.fetch_upstream(symbols_list)).await;
        let now = Utc::now();

        let fetched: ArbResult<Vec<Quote>> = match outcome {
            Ok(result) => result,
            Err(_) => Err(ArbError::UpstreamUnavailable {
                message: format!("fetch exceeded {:?}", self.fetch_timeout),
                source: None,
            }),
        };

        self.emit_metric(started.elapsed().as_millis() as u64, fetched.is_ok(), now)
            .await;

        let batch = match fetched {
            Ok(quotes) => {
                self.fetch_successes.fetch_add(1, Ordering::Relaxed);
                info!(key, quotes = quotes.len(), "Refreshed quotes from upstream");
                self.store_fresh(key, quotes, now)
            }
            Err(e) => {
                self.fetch_failures.fetch_add(1, Ordering::Relaxed);
                warn!("⚠️ Upstream fetch failed for {}: {}", key, e);
                self.fallback_batch(key, symbols_list, now)
            }
        };

        // entry is already stored; wake followers before the guard clears
        // the pending slot so nobody misses both
        {
            let inner = self.lock_inner();
            if let Some(tx) = inner.pending.get(key) {
                let _ = tx.send(batch.clone());
            }
        }

        batch
    }

    async fn fetch_upstream(&self, symbols_list: &[String]) -> ArbResult<Vec<Quote>> {
        let now = Utc::now();
        let mut ids: Vec<&'static str> = Vec::new();
        let mut mapping: Vec<(String, Option<&'static str>)> = Vec::new();
        for sym in symbols_list {
            let id = symbols::provider_id(sym);
            match id {
                Some(id) => ids.push(id),
                None => warn!("⚠️ No provider mapping for symbol {}", sym),
            }
            mapping.push((sym.clone(), id));
        }

        let rows = if ids.is_empty() {
            Vec::new()
        } else {
            self.provider.market_quotes(&ids).await?
        };

        let quotes = mapping
            .into_iter()
            .map(|(sym, id)| {
                id.and_then(|id| rows.iter().find(|r| r.id == id).cloned())
                    .and_then(|row| row.into_quote(&sym, now))
                    .unwrap_or_else(|| Quote::simulated(&sym, now))
            })
            .collect();
        Ok(quotes)
    }

    fn store_fresh(&self, key: &str, quotes: Vec<Quote>, now: DateTime<Utc>) -> QuoteBatch {
        let quality = batch_quality(&quotes);
        let batch = QuoteBatch {
            quotes: quotes.clone(),
            source: BatchSource::Upstream,
            data_quality: quality,
            trading_allowed: quality.trading_allowed(),
            cached_at: now,
        };

        let mut inner = self.lock_inner();
        inner.last_upstream_success = Some(now);
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                quotes,
                quality,
                cached_at: now,
                last_hit: now,
            },
        );
        while inner.entries.len() > self.max_entries {
            evict_least_recent(&mut inner.entries);
        }
        batch
    }

    fn fallback_batch(
        &self,
        key: &str,
        symbols_list: &[String],
        now: DateTime<Utc>,
    ) -> QuoteBatch {
        let mut inner = self.lock_inner();
        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.last_hit = now;
                let age = now.signed_duration_since(entry.cached_at);
                // staleness degrades the label but never invents data
                let quality = entry.quality.worse_of(classify_age(age));
                info!(
                    key,
                    age_secs = age.num_seconds(),
                    quality = ?quality,
                    "Serving stale quotes after upstream failure"
                );
                QuoteBatch {
                    quotes: entry.quotes.clone(),
                    source: BatchSource::CacheStale,
                    data_quality: quality,
                    trading_allowed: quality.trading_allowed(),
                    cached_at: entry.cached_at,
                }
            }
            None => {
                drop(inner);
                self.simulated_batch(symbols_list)
            }
        }
    }

    fn simulated_batch(&self, symbols_list: &[String]) -> QuoteBatch {
        let now = Utc::now();
        if !symbols_list.is_empty() {
            warn!(
                "Serving simulated zero quotes for [{}]",
                symbols_list.join(",")
            );
        }
        QuoteBatch {
            quotes: symbols_list
                .iter()
                .map(|s| Quote::simulated(s, now))
                .collect(),
            source: BatchSource::Simulated,
            data_quality: DataQuality::Simulated,
            trading_allowed: false,
            cached_at: now,
        }
    }

    async fn emit_metric(&self, latency_ms: u64, success: bool, now: DateTime<Utc>) {
        let metric = PerformanceMetric {
            function: "quote_cache.fetch".to_string(),
            endpoint: "/coins/markets".to_string(),
            latency_ms,
            success,
            recorded_at: now,
        };
        if let Err(e) = self.store.record_metric(&metric).await {
            warn!("Failed to record performance metric: {}", e);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock_inner();
        CacheStats {
            entries: inner.entries.len(),
            pending_fetches: inner.pending.len(),
            fetch_successes: self.fetch_successes.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            last_upstream_success: inner.last_upstream_success,
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, CacheInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    fn backdate_entry(&self, key: &str, secs: i64) {
        let mut inner = self.lock_inner();
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.cached_at -= ChronoDuration::seconds(secs);
        }
    }
}

/// Removes the pending-fetch slot for a key on every exit path, including
/// task cancellation, so an abandoned leader cannot wedge the key.
struct PendingGuard<'a> {
    cache: &'a QuoteCache,
    key: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.cache.lock_inner();
        inner.pending.remove(&self.key);
    }
}

/// Worst label across fetched rows; per-symbol simulated placeholders do
/// not poison the batch unless nothing real was fetched at all.
fn batch_quality(quotes: &[Quote]) -> DataQuality {
    quotes
        .iter()
        .map(|q| q.quality)
        .filter(|q| *q != DataQuality::Simulated)
        .max()
        .unwrap_or(DataQuality::Simulated)
}

fn evict_least_recent(entries: &mut HashMap<String, CacheEntry>) {
    let oldest = entries
        .iter()
        .min_by_key(|(_, e)| e.last_hit)
        .map(|(k, _)| k.clone());
    if let Some(key) = oldest {
        debug!(key, "Evicting least-recently-hit cache entry");
        entries.remove(&key);
    }
}
