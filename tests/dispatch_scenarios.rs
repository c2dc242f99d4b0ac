// End-to-end dispatch scenarios against scripted providers

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use manga_translator::core::errors::ProviderResult;
use manga_translator::{
    Config, DispatchState, Dispatcher, FailureKind, Metrics, ProviderError, ProviderId, ProviderRegistry,
    TranslationCache, TranslationContext, TranslationMethod, TranslationProvider, TranslationRequest,
};

/// Translates from a fixed dictionary; credentials listed in `rejected`
/// get a 401, and `down` makes every call fail as unreachable.
struct Scripted {
    id: ProviderId,
    dictionary: HashMap<String, String>,
    rejected: Vec<String>,
    down: bool,
    calls: Mutex<usize>,
}

impl Scripted {
    fn new(id: ProviderId, pairs: &[(&str, &str)]) -> Self {
        Self {
            id,
            dictionary: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            rejected: Vec::new(),
            down: false,
            calls: Mutex::new(0),
        }
    }

    fn rejecting(mut self, credential: &str) -> Self {
        self.rejected.push(credential.to_string());
        self
    }

    fn offline(mut self) -> Self {
        self.down = true;
        self
    }

    fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl TranslationProvider for Scripted {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn max_batch_size(&self) -> usize {
        10
    }

    async fn translate(
        &self,
        credential: &str,
        texts: &[String],
        _source_lang: &str,
        _target_lang: &str,
        _context: Option<&TranslationContext>,
    ) -> ProviderResult<Vec<Option<String>>> {
        *self.calls.lock() += 1;
        tokio::task::yield_now().await;
        if self.down {
            return Err(ProviderError::Unreachable {
                provider: self.id,
                message: "connection refused".to_string(),
            });
        }
        if self.rejected.iter().any(|c| c == credential) {
            return Err(ProviderError::Unauthorized {
                provider: self.id,
                status: 401,
                message: "API key not valid".to_string(),
            });
        }
        Ok(texts.iter().map(|t| self.dictionary.get(t).cloned()).collect())
    }

    async fn probe(&self, _credential: &str) -> ProviderResult<()> {
        Ok(())
    }
}

fn write_keys(dir: &std::path::Path, keys: &[(&str, &str, &str)]) -> Config {
    write_keys_with_limit(dir, keys, 100)
}

fn write_keys_with_limit(dir: &std::path::Path, keys: &[(&str, &str, &str)], daily_limit: u32) -> Config {
    let records: Vec<serde_json::Value> = keys
        .iter()
        .map(|(provider, name, credential)| {
            serde_json::json!({
                "provider": provider,
                "name": name,
                "credential": credential,
                "daily_limit": daily_limit,
            })
        })
        .collect();
    let path = dir.join("api_keys.json");
    std::fs::write(&path, serde_json::json!({ "keys": records }).to_string()).unwrap();

    let mut config = Config::default();
    config.keys.key_file = path.display().to_string();
    config.cache.cache_dir = dir.join("cache").display().to_string();
    config.cache.persist = false;
    config.dispatch.rate_limit_backoff = Duration::from_millis(1);
    config
}

async fn dispatcher(config: &Config, providers: Vec<Arc<Scripted>>) -> Dispatcher {
    let state = Arc::new(DispatchState::init(config, None).await.unwrap());
    let mut registry = ProviderRegistry::new();
    for p in providers {
        registry.register(p);
    }
    Dispatcher::new(config, state, registry, Some(Metrics::new()))
}

fn request(texts: &[&str]) -> TranslationRequest {
    TranslationRequest::new(texts.iter().map(|s| s.to_string()).collect(), "ja")
}

#[tokio::test]
async fn primary_answer_is_cached_for_the_next_request() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_keys(dir.path(), &[("primary", "main", "k-main")]);
    let primary = Arc::new(Scripted::new(ProviderId::Primary, &[("いい天気だ", "Trời đẹp quá")]));
    let d = dispatcher(&config, vec![primary.clone()]).await;

    let first = d.translate_batch(&request(&["いい天気だ"])).await;
    assert_eq!(first[0].text, "Trời đẹp quá");
    assert_eq!(first[0].method_used, TranslationMethod::PrimaryProvider);
    assert!(!first[0].cache_hit);

    let second = d.translate_batch(&request(&["いい天気だ"])).await;
    assert_eq!(second[0].text, "Trời đẹp quá");
    assert_eq!(second[0].method_used, TranslationMethod::Cache);
    assert!(second[0].cache_hit);
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn rejected_primary_key_falls_back_to_secondary() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_keys(
        dir.path(),
        &[("primary", "revoked", "k-bad"), ("secondary", "backup", "k-backup")],
    );
    let primary = Arc::new(Scripted::new(ProviderId::Primary, &[("行くぞ", "Đi nào")]).rejecting("k-bad"));
    let secondary = Arc::new(Scripted::new(ProviderId::Secondary, &[("行くぞ", "Đi thôi nào")]));
    let d = dispatcher(&config, vec![primary.clone(), secondary]).await;

    let results = d.translate_batch(&request(&["行くぞ"])).await;
    assert_eq!(results[0].text, "Đi thôi nào");
    assert_eq!(results[0].method_used, TranslationMethod::SecondaryProvider);

    let revoked = d.state().keys.records().into_iter().find(|r| r.name == "revoked").unwrap();
    assert!(!revoked.is_active);
    assert!(revoked.revoked);

    // The revoked key is never offered again
    d.translate_batch(&request(&["帰るぞ"])).await;
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn every_provider_down_returns_originals_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_keys(dir.path(), &[("primary", "main", "k-main")]);
    let providers = vec![
        Arc::new(Scripted::new(ProviderId::Primary, &[]).offline()),
        Arc::new(Scripted::new(ProviderId::Secondary, &[]).offline()),
        Arc::new(Scripted::new(ProviderId::Neural, &[]).offline()),
    ];
    let d = dispatcher(&config, providers.clone()).await;

    let texts = ["一", "二", "三"];
    let results = d.translate_batch(&request(&texts)).await;
    assert_eq!(results.len(), 3);
    for (text, result) in texts.iter().zip(&results) {
        assert_eq!(result.text, *text);
        assert_eq!(result.method_used, TranslationMethod::Original);
        assert!(!result.cache_hit);
    }

    // Unreachable is not retried within a provider
    assert!(providers.iter().all(|p| p.calls() == 1));
    assert!(d.state().keys.records().iter().all(|r| r.is_active));

    // Originals are not cached
    for text in texts {
        let key = TranslationCache::fingerprint(text, "ja", None);
        assert!(d.state().cache.lookup(&key).is_none());
    }
}

#[tokio::test]
async fn partial_answers_continue_down_the_chain() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_keys(dir.path(), &[("primary", "main", "k-main")]);
    let primary = Arc::new(Scripted::new(ProviderId::Primary, &[("猫", "Mèo")]));
    let neural = Arc::new(Scripted::new(ProviderId::Neural, &[("犬", "Chó")]));
    let d = dispatcher(&config, vec![primary, neural]).await;

    let results = d.translate_batch(&request(&["猫", "犬", "鳥"])).await;
    assert_eq!(results[0].text, "Mèo");
    assert_eq!(results[0].method_used, TranslationMethod::PrimaryProvider);
    assert_eq!(results[1].text, "Chó");
    assert_eq!(results[1].method_used, TranslationMethod::NeuralFallback);
    assert_eq!(results[2].text, "鳥");
    assert_eq!(results[2].method_used, TranslationMethod::Original);
}

#[tokio::test]
async fn cache_hits_and_misses_mix_in_one_request() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_keys(dir.path(), &[("primary", "main", "k-main")]);
    let primary = Arc::new(Scripted::new(ProviderId::Primary, &[("猫", "Mèo"), ("犬", "Chó")]));
    let d = dispatcher(&config, vec![primary]).await;

    d.translate_batch(&request(&["猫"])).await;
    let results = d.translate_batch(&request(&["犬", "猫", ""])).await;

    assert_eq!(results[0].text, "Chó");
    assert_eq!(results[0].method_used, TranslationMethod::PrimaryProvider);
    assert_eq!(results[1].method_used, TranslationMethod::Cache);
    assert_eq!(results[2].method_used, TranslationMethod::Original);
    assert_eq!(results[2].text, "");
}

#[tokio::test]
async fn exhausted_budget_skips_provider() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_keys(dir.path(), &[("primary", "main", "k-main")]);
    let primary = Arc::new(Scripted::new(ProviderId::Primary, &[("猫", "Mèo")]));
    let neural = Arc::new(Scripted::new(ProviderId::Neural, &[("猫", "Con mèo")]));
    let d = dispatcher(&config, vec![primary.clone(), neural]).await;

    d.state().keys.record_failure(0, FailureKind::QuotaExceeded);

    let results = d.translate_batch(&request(&["猫"])).await;
    assert_eq!(results[0].method_used, TranslationMethod::NeuralFallback);
    assert_eq!(primary.calls(), 0);
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = write_keys(dir.path(), &[("primary", "main", "k-main")]);
    config.cache.persist = true;
    config.cache.save_interval = Duration::ZERO;

    let primary = Arc::new(Scripted::new(ProviderId::Primary, &[("猫", "Mèo")]));
    let d = dispatcher(&config, vec![primary]).await;
    d.translate_batch(&request(&["猫"])).await;
    d.state().flush().await.unwrap();

    let restarted = DispatchState::init(&config, None).await.unwrap();
    let main = restarted.keys.records().into_iter().find(|r| r.name == "main").unwrap();
    assert_eq!(main.usage_count, 1);
    let cat = TranslationCache::fingerprint("猫", "ja", None);
    assert_eq!(restarted.cache.lookup(&cat).as_deref(), Some("Mèo"));
}

#[tokio::test]
async fn common_phrases_answer_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_keys(dir.path(), &[("primary", "main", "k-main")]);
    let primary = Arc::new(Scripted::new(ProviderId::Primary, &[]));
    let d = dispatcher(&config, vec![primary.clone()]).await;

    let auto = TranslationRequest::new(vec!["こんにちは".to_string()], "auto");
    let results = d.translate_batch(&auto).await;
    assert_eq!(results[0].text, "Xin chào");
    assert_eq!(results[0].method_used, TranslationMethod::Cache);
    assert!(results[0].cache_hit);

    let results = d.translate_batch(&request(&["ありがとう", "ドキドキ"])).await;
    assert_eq!(results[0].text, "Cảm ơn");
    assert_eq!(results[1].text, "thình thịch");
    assert!(results.iter().all(|r| r.method_used == TranslationMethod::Cache));

    // Clearing keeps the built-in phrases
    d.state().cache.clear();
    let results = d.translate_batch(&auto).await;
    assert_eq!(results[0].method_used, TranslationMethod::Cache);
    assert_eq!(primary.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_batches_keep_order_and_budget() {
    const BATCHES: usize = 10;
    const ITEMS: usize = 12;
    const DAILY_LIMIT: u32 = 5;

    let dir = tempfile::tempdir().unwrap();
    let config = write_keys_with_limit(dir.path(), &[("primary", "main", "k-main")], DAILY_LIMIT);

    let mut pairs = Vec::new();
    for b in 0..BATCHES {
        for i in 0..ITEMS {
            pairs.push((format!("台詞{}-{}", b, i), format!("Thoại {}-{}", b, i)));
        }
    }
    let dictionary: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    let primary = Arc::new(Scripted::new(ProviderId::Primary, &dictionary));
    let neural = Arc::new(Scripted::new(ProviderId::Neural, &dictionary));
    let d = Arc::new(dispatcher(&config, vec![primary, neural]).await);

    let handles: Vec<_> = (0..BATCHES)
        .map(|b| {
            let d = Arc::clone(&d);
            tokio::spawn(async move {
                let texts = (0..ITEMS).map(|i| format!("台詞{}-{}", b, i)).collect();
                (b, d.translate_batch(&TranslationRequest::new(texts, "ja")).await)
            })
        })
        .collect();

    for handle in handles {
        let (b, results) = handle.await.unwrap();
        assert_eq!(results.len(), ITEMS);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.text, format!("Thoại {}-{}", b, i));
            assert!(matches!(
                result.method_used,
                TranslationMethod::PrimaryProvider | TranslationMethod::NeuralFallback
            ));
        }
    }

    // Overshoot is bounded by the calls in flight at once
    let main = d.state().keys.records().into_iter().find(|r| r.name == "main").unwrap();
    let in_flight = config.dispatch.max_concurrent_calls as u32;
    assert!(main.usage_count <= DAILY_LIMIT + in_flight, "usage {}", main.usage_count);
}
