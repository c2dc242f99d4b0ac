// Per-provider circuit breakers
//
// Only transient failures (throttling, outages, timeouts) feed a breaker.
// Credential problems are a key's fault and are handled by the key pool.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::core::config::BreakerConfig;
use crate::core::types::ProviderId;
use crate::utils::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls go through
    Closed,
    /// Provider is skipped until the timeout elapses
    Open,
    /// Trial calls decide whether to close again
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive transient failures before opening
    pub failure_threshold: usize,
    /// Time spent open before trial calls are allowed
    pub timeout: Duration,
    /// Consecutive half-open successes needed to close
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

impl From<&BreakerConfig> for CircuitBreakerConfig {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            timeout: config.timeout,
            success_threshold: config.success_threshold.max(1),
        }
    }
}

/// Breaker guarding one provider
#[derive(Clone)]
pub struct CircuitBreaker {
    provider: ProviderId,
    inner: Arc<RwLock<BreakerInner>>,
    config: CircuitBreakerConfig,
    metrics: Option<Metrics>,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: usize,
    consecutive_successes: usize,
    opened_at: Option<Instant>,
    trips: usize,
}

impl CircuitBreaker {
    pub fn new(provider: ProviderId, config: CircuitBreakerConfig) -> Self {
        Self {
            provider,
            inner: Arc::new(RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                trips: 0,
            })),
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// False while open; moves to half-open once the timeout has elapsed
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.write();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    info!("Circuit for {} half-open, allowing trial calls", self.provider);
                }
                elapsed
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        inner.consecutive_failures = 0;
        match inner.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen | CircuitState::Open => {
                inner.state = CircuitState::HalfOpen;
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_successes = 0;
                    inner.opened_at = None;
                    info!("Circuit for {} closed, provider recovered", self.provider);
                }
            }
        }
    }

    /// Transient failure; returns true when this call tripped the breaker
    pub fn record_failure(&self) -> bool {
        let mut inner = self.inner.write();
        inner.consecutive_successes = 0;
        inner.consecutive_failures += 1;

        let trip = match inner.state {
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
                false
            }
        };

        if trip {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.trips += 1;
            warn!(
                "Circuit for {} opened after {} consecutive failures",
                self.provider, inner.consecutive_failures
            );
        }
        drop(inner);

        if trip {
            if let Some(metrics) = &self.metrics {
                metrics.record_circuit_breaker_trip();
            }
        }
        trip
    }

    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.read();
        CircuitBreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            trips: inner.trips,
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.opened_at = None;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: usize,
    pub trips: usize,
}

/// One breaker per provider
#[derive(Clone)]
pub struct ProviderBreakers {
    breakers: [CircuitBreaker; 3],
}

impl ProviderBreakers {
    pub fn new(config: CircuitBreakerConfig, metrics: Option<Metrics>) -> Self {
        let make = |provider| {
            let breaker = CircuitBreaker::new(provider, config.clone());
            match &metrics {
                Some(m) => breaker.with_metrics(m.clone()),
                None => breaker,
            }
        };
        Self {
            breakers: ProviderId::ALL.map(make),
        }
    }

    pub fn get(&self, provider: ProviderId) -> &CircuitBreaker {
        match provider {
            ProviderId::Primary => &self.breakers[0],
            ProviderId::Secondary => &self.breakers[1],
            ProviderId::Neural => &self.breakers[2],
        }
    }

    pub fn stats(&self) -> BTreeMap<String, CircuitBreakerStats> {
        ProviderId::ALL
            .iter()
            .map(|p| (p.as_str().to_string(), self.get(*p).stats()))
            .collect()
    }

    pub fn reset_all(&self) {
        for breaker in &self.breakers {
            breaker.reset();
        }
    }
}

impl Default for ProviderBreakers {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(failures: usize, timeout_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: failures,
            timeout: Duration::from_millis(timeout_ms),
            success_threshold: 2,
        }
    }

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new(ProviderId::Primary, config(3, 1000));

        assert!(!breaker.record_failure());
        assert!(!breaker.record_failure());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.record_failure());
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
        assert_eq!(breaker.stats().trips, 1);
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let breaker = CircuitBreaker::new(ProviderId::Primary, config(2, 1000));
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_recovery() {
        let breaker = CircuitBreaker::new(ProviderId::Secondary, config(2, 50));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(80));
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(ProviderId::Neural, config(2, 50));
        breaker.record_failure();
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(80));
        assert!(breaker.allow_request());

        assert!(breaker.record_failure());
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.stats().trips, 2);
    }

    #[test]
    fn test_breakers_are_independent() {
        let metrics = Metrics::new();
        let breakers = ProviderBreakers::new(config(1, 60_000), Some(metrics.clone()));

        breakers.get(ProviderId::Primary).record_failure();
        assert!(!breakers.get(ProviderId::Primary).allow_request());
        assert!(breakers.get(ProviderId::Secondary).allow_request());
        assert_eq!(metrics.snapshot().circuit_breaker_trips, 1);

        breakers.reset_all();
        assert!(breakers.get(ProviderId::Primary).allow_request());
    }
}
