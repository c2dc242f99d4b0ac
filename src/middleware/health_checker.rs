// Key health probing
//
// Probes are spaced by a fixed delay so a sweep over many keys does not trip
// the provider's own rate limiting. Probes never count against quota.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::core::config::HealthConfig;
use crate::core::errors::ProviderError;
use crate::core::types::{HealthKind, ProviderId};
use crate::middleware::key_pool::{KeyPool, KeyRecord};
use crate::services::translation::ProviderRegistry;
use crate::utils::Metrics;

/// Outcome of probing one key
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub key_id: usize,
    pub name: String,
    pub provider: ProviderId,
    pub health: HealthKind,
    pub latency_ms: u64,
}

pub struct HealthChecker {
    pool: Arc<KeyPool>,
    providers: ProviderRegistry,
    probe_timeout: Duration,
    probe_delay: Duration,
    metrics: Option<Metrics>,
}

impl HealthChecker {
    pub fn new(pool: Arc<KeyPool>, providers: ProviderRegistry, config: &HealthConfig) -> Self {
        Self {
            pool,
            providers,
            probe_timeout: config.probe_timeout,
            probe_delay: config.probe_delay,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Classify one key with a minimal request. Does not touch the pool.
    #[instrument(skip_all, fields(key = %record.name, provider = %record.provider))]
    pub async fn probe(&self, record: &KeyRecord) -> HealthKind {
        let Some(provider) = self.providers.get(record.provider) else {
            warn!("No adapter registered for {}", record.provider);
            return HealthKind::Unreachable;
        };

        let outcome = match tokio::time::timeout(self.probe_timeout, provider.probe(&record.credential)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout(record.provider, self.probe_timeout)),
        };

        let health = match outcome {
            Ok(()) => HealthKind::Healthy,
            Err(e) => {
                debug!("Probe failed: {}", e);
                HealthKind::from_failure(e.kind())
            }
        };

        if let Some(m) = &self.metrics {
            m.record_probe(health == HealthKind::Healthy);
        }
        health
    }

    async fn probe_timed(&self, record: &KeyRecord) -> ProbeReport {
        let start = Instant::now();
        let health = self.probe(record).await;
        ProbeReport {
            key_id: record.id,
            name: record.name.clone(),
            provider: record.provider,
            health,
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Probe every key and feed the outcomes into the pool
    pub async fn probe_all(&self) -> Vec<ProbeReport> {
        let records: Vec<KeyRecord> = self
            .pool
            .records()
            .into_iter()
            .filter(|r| !r.is_placeholder() && !r.disabled)
            .collect();
        info!("Probing {} keys", records.len());

        let mut reports = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.probe_delay).await;
            }

            let report = self.probe_timed(record).await;
            match report.health.as_failure() {
                None => self.pool.record_success(record.id),
                Some(kind) => {
                    self.pool.record_failure(record.id, kind);
                }
            }
            info!(
                "Key '{}' ({}): {:?} in {}ms",
                report.name, report.provider, report.health, report.latency_ms
            );
            reports.push(report);
        }
        reports
    }

    /// Re-probe keys a failure took out and reactivate the healthy ones;
    /// returns how many came back. Admin-disabled keys are not touched.
    pub async fn recover_failed(&self) -> usize {
        let inactive: Vec<KeyRecord> = self
            .pool
            .records()
            .into_iter()
            .filter(|r| !r.is_active && !r.disabled && !r.is_placeholder())
            .collect();
        if inactive.is_empty() {
            return 0;
        }
        info!("Attempting recovery of {} inactive keys", inactive.len());

        let mut recovered = 0;
        for (i, record) in inactive.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.probe_delay).await;
            }
            let health = self.probe(record).await;
            if health == HealthKind::Healthy {
                self.pool.reactivate(record.id);
                recovered += 1;
            } else {
                debug!("Key '{}' still failing: {:?}", record.name, health);
            }
        }

        info!("Recovered {}/{} keys", recovered, inactive.len());
        recovered
    }

    /// Run the daily reset check and a recovery sweep every `interval`.
    /// Returns `None` when the interval is zero.
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            return None;
        }

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.pool.reset_daily_if_needed();
                self.recover_failed().await;
            }
        }))
    }
}
