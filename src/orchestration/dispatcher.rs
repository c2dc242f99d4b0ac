// Fallback-chain dispatcher
//
// Per item: Pending -> Resolved(cache), or Pending -> Attempting(p1) ->
// Attempting(p2) -> ... -> Resolved(provider | Original). Every input leaves
// with a result; running out of providers yields the original text.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::core::config::Config;
use crate::core::errors::{FailureKind, ProviderError};
use crate::core::types::{
    FallbackChain, ProviderId, TranslationContext, TranslationRequest, TranslationResult,
};
use crate::middleware::circuit_breaker::{CircuitBreakerConfig, ProviderBreakers};
use crate::orchestration::batch_optimizer::{BatchOptimizer, LoadHint};
use crate::orchestration::state::DispatchState;
use crate::services::translation::{CacheKey, ProviderRegistry, TranslationCache, TranslationProvider};
use crate::utils::{normalize_source, polish_translation, Metrics};

/// Calls per provider per sub-batch: the first try and one retry on another key
const MAX_ATTEMPTS_PER_PROVIDER: usize = 2;

/// A cache miss. Identical fingerprints in one request share a slot.
struct PendingItem {
    key: CacheKey,
    source: String,
    indices: Vec<usize>,
}

/// Outcome of walking one provider
enum ProviderOutcome {
    Answered(Vec<Option<String>>),
    Skipped,
}

pub struct Dispatcher {
    state: Arc<DispatchState>,
    providers: ProviderRegistry,
    breakers: ProviderBreakers,
    optimizer: BatchOptimizer,
    call_slots: Arc<Semaphore>,
    max_concurrent_calls: usize,
    target_language: String,
    call_timeout: Duration,
    rate_limit_backoff: Duration,
    metrics: Option<Metrics>,
}

impl Dispatcher {
    pub fn new(
        config: &Config,
        state: Arc<DispatchState>,
        providers: ProviderRegistry,
        metrics: Option<Metrics>,
    ) -> Self {
        let max_concurrent_calls = config.dispatch.max_concurrent_calls.max(1);
        Self {
            state,
            providers,
            breakers: ProviderBreakers::new(CircuitBreakerConfig::from(&config.breaker), metrics.clone()),
            optimizer: BatchOptimizer::new(&config.batch),
            call_slots: Arc::new(Semaphore::new(max_concurrent_calls)),
            max_concurrent_calls,
            target_language: config.target_language().to_string(),
            call_timeout: config.dispatch.call_timeout,
            rate_limit_backoff: config.dispatch.rate_limit_backoff,
            metrics,
        }
    }

    pub fn state(&self) -> &Arc<DispatchState> {
        &self.state
    }

    pub fn breakers(&self) -> &ProviderBreakers {
        &self.breakers
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// One result per input, in input order
    #[instrument(skip_all, fields(items = request.texts.len(), source_lang = %request.source_lang))]
    pub async fn translate_batch(&self, request: &TranslationRequest) -> Vec<TranslationResult> {
        let start = Instant::now();
        let texts = &request.texts;
        let effective_context = request.effective_context();
        let context = effective_context.as_ref();
        let mut results: Vec<Option<TranslationResult>> = vec![None; texts.len()];

        // Blank items and cache hits resolve without a provider call
        let mut pending: Vec<PendingItem> = Vec::new();
        let mut slot_of: HashMap<CacheKey, usize> = HashMap::new();
        for (i, text) in texts.iter().enumerate() {
            let source = normalize_source(text);
            if source.is_empty() {
                results[i] = Some(TranslationResult::original(text));
                continue;
            }

            let key = TranslationCache::fingerprint(text, &request.source_lang, context);
            if let Some(&slot) = slot_of.get(&key) {
                pending[slot].indices.push(i);
                continue;
            }
            if let Some(hit) = self.state.cache.lookup(&key) {
                results[i] = Some(TranslationResult::cached(hit));
                continue;
            }
            slot_of.insert(key.clone(), pending.len());
            pending.push(PendingItem {
                key,
                source,
                indices: vec![i],
            });
        }

        let cache_hits = results.iter().flatten().filter(|r| r.cache_hit).count();
        debug!("{} cache hits, {} distinct misses", cache_hits, pending.len());

        if !pending.is_empty() {
            let chain: Vec<ProviderId> = FallbackChain::with_preference(request.preferred_method)
                .providers()
                .iter()
                .copied()
                .filter(|id| self.providers.get(*id).is_some())
                .collect();

            let outcomes = if chain.is_empty() {
                warn!("No providers registered, returning originals");
                vec![None; pending.len()]
            } else {
                self.run_sub_batches(&pending, &chain, &request.source_lang, context).await
            };

            for (item, outcome) in pending.iter().zip(outcomes) {
                match outcome {
                    Some((translated, provider)) => {
                        self.state.cache.insert(item.key.clone(), translated.clone());
                        for &i in &item.indices {
                            results[i] = Some(TranslationResult::translated(translated.clone(), provider));
                        }
                    }
                    None => {
                        for &i in &item.indices {
                            results[i] = Some(TranslationResult::original(&texts[i]));
                        }
                    }
                }
            }
        }

        let results: Vec<TranslationResult> = results
            .into_iter()
            .enumerate()
            .map(|(i, r)| r.unwrap_or_else(|| TranslationResult::original(&texts[i])))
            .collect();

        if let Some(m) = &self.metrics {
            m.record_batch_processed(results.len());
            for r in &results {
                m.record_result(r.method_used);
            }
        }

        let originals = results
            .iter()
            .filter(|r| r.method_used == crate::core::types::TranslationMethod::Original)
            .count();
        info!(
            "Translated {} items in {:.2}s ({} cached, {} left as original)",
            results.len(),
            start.elapsed().as_secs_f64(),
            cache_hits,
            originals
        );
        results
    }

    async fn run_sub_batches(
        &self,
        pending: &[PendingItem],
        chain: &[ProviderId],
        source_lang: &str,
        context: Option<&TranslationContext>,
    ) -> Vec<Option<(String, ProviderId)>> {
        let ceiling = self.providers.smallest_ceiling(chain).unwrap_or(1);
        let load = LoadHint::from_permits(self.call_slots.available_permits(), self.max_concurrent_calls);
        let size = self.optimizer.compute_batch_size(pending.len(), ceiling, load);
        let ranges = BatchOptimizer::chunk(pending.len(), size);
        debug!(
            "Split {} items into {} sub-batches of up to {} ({:?})",
            pending.len(),
            ranges.len(),
            size,
            load
        );

        let tasks = ranges
            .into_iter()
            .map(|range| self.run_sub_batch(&pending[range], chain, source_lang, context));

        join_all(tasks).await.into_iter().flatten().collect()
    }

    /// Walk the chain until every item in the sub-batch is answered
    async fn run_sub_batch(
        &self,
        items: &[PendingItem],
        chain: &[ProviderId],
        source_lang: &str,
        context: Option<&TranslationContext>,
    ) -> Vec<Option<(String, ProviderId)>> {
        let mut outcome: Vec<Option<(String, ProviderId)>> = vec![None; items.len()];
        let mut remaining: Vec<usize> = (0..items.len()).collect();

        for (position, &provider_id) in chain.iter().enumerate() {
            if remaining.is_empty() {
                break;
            }
            if position > 0 {
                if let Some(m) = &self.metrics {
                    m.record_fallback();
                }
            }

            let Some(provider) = self.providers.get(provider_id) else {
                continue;
            };
            if !self.breakers.get(provider_id).allow_request() {
                debug!("Circuit open for {}, skipping", provider_id);
                continue;
            }

            let texts: Vec<String> = remaining.iter().map(|&i| items[i].source.clone()).collect();
            let ProviderOutcome::Answered(slots) = self
                .attempt_provider(provider.as_ref(), &texts, source_lang, context)
                .await
            else {
                continue;
            };

            let mut unanswered = Vec::new();
            for (slot, idx) in slots.into_iter().zip(remaining) {
                match slot.map(|t| polish_translation(&t)).filter(|t| !t.is_empty()) {
                    Some(text) => outcome[idx] = Some((text, provider_id)),
                    None => unanswered.push(idx),
                }
            }
            if !unanswered.is_empty() {
                debug!("{} left {} items unanswered", provider_id, unanswered.len());
            }
            remaining = unanswered;
        }

        outcome
    }

    /// At most two calls on distinct keys. Unreachable falls through at once;
    /// a rate limit waits before the retry.
    async fn attempt_provider(
        &self,
        provider: &dyn TranslationProvider,
        texts: &[String],
        source_lang: &str,
        context: Option<&TranslationContext>,
    ) -> ProviderOutcome {
        let id = provider.id();
        let breaker = self.breakers.get(id);
        let mut tried: Vec<usize> = Vec::with_capacity(MAX_ATTEMPTS_PER_PROVIDER);

        for attempt in 0..MAX_ATTEMPTS_PER_PROVIDER {
            let Ok(permit) = self.call_slots.acquire().await else {
                return ProviderOutcome::Skipped;
            };

            let key = match self.state.keys.acquire_excluding(id, &tried) {
                Ok(key) => key,
                Err(e) => {
                    debug!("{}", e);
                    return ProviderOutcome::Skipped;
                }
            };
            tried.push(key.id);
            self.state.keys.record_usage(key.id);

            let start = Instant::now();
            let call = provider.translate(&key.credential, texts, source_lang, &self.target_language, context);
            let result = match tokio::time::timeout(self.call_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::timeout(id, self.call_timeout)),
            };
            drop(permit);

            let result = result.and_then(|slots| {
                if slots.len() == texts.len() {
                    Ok(slots)
                } else {
                    Err(ProviderError::invalid(
                        id,
                        format!("expected {} results, got {}", texts.len(), slots.len()),
                    ))
                }
            });
            if let Some(m) = &self.metrics {
                m.record_provider_call(id, result.is_ok(), start.elapsed());
            }

            let err = match result {
                Ok(slots) => {
                    self.state.keys.record_success(key.id);
                    breaker.record_success();
                    return ProviderOutcome::Answered(slots);
                }
                Err(e) => e,
            };

            let kind = err.kind();
            warn!(
                "{} call with key '{}' failed (attempt {}/{}): {}",
                id,
                key.name,
                attempt + 1,
                MAX_ATTEMPTS_PER_PROVIDER,
                err
            );
            self.state.keys.record_failure(key.id, kind);
            if kind.is_transient() {
                breaker.record_failure();
            }

            match kind {
                FailureKind::Unreachable => return ProviderOutcome::Skipped,
                FailureKind::RateLimited if attempt + 1 < MAX_ATTEMPTS_PER_PROVIDER => {
                    let retry_after = match &err {
                        ProviderError::RateLimited { retry_after, .. } => *retry_after,
                        _ => None,
                    };
                    tokio::time::sleep(self.backoff(retry_after)).await;
                }
                _ => {}
            }
        }

        ProviderOutcome::Skipped
    }

    /// Backoff before a retry after throttling, with jitter, never past the call timeout
    fn backoff(&self, retry_after: Option<Duration>) -> Duration {
        let base = retry_after.unwrap_or(self.rate_limit_backoff);
        let base_ms = base.as_millis() as u64;
        let jitter = rand::random::<u64>() % (base_ms / 2 + 1);
        Duration::from_millis(base_ms + jitter).min(self.call_timeout)
    }
}
