// API key pool with quota accounting and automatic failover
//
// Selection favours the key with the most headroom left today. Failures are
// classified: credential rejections take a key out until it is recovered,
// quota exhaustion takes it out until the daily reset, transient provider
// trouble leaves it in rotation.
//
// Quota checks are optimistic. Two tasks can both acquire the last unit of
// headroom on a key before either records usage, so a key may overshoot its
// daily limit by the number of concurrent callers. That approximation is
// accepted; the provider's own 429 stops it for real.

use chrono::{Local, NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use crate::core::errors::{FailureKind, KeyPoolError, KeyPoolResult};
use crate::core::types::ProviderId;
use crate::middleware::key_store::{KeyFile, KeyStore};
use crate::utils::{mask_credential, Metrics};

const PLACEHOLDER_PREFIX: &str = "YOUR_";

fn default_provider() -> ProviderId {
    ProviderId::Primary
}

fn default_daily_limit() -> u32 {
    1000
}

fn default_active() -> bool {
    true
}

/// One credential and its bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Stable handle assigned at load time, not persisted
    #[serde(skip)]
    pub id: usize,
    #[serde(alias = "key")]
    pub credential: String,
    #[serde(default = "default_provider")]
    pub provider: ProviderId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub revoked: bool,
    /// Switched off by an admin; only an admin switches it back on
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub transient_failures: u32,
    #[serde(default)]
    pub last_failure: Option<NaiveDateTime>,
    #[serde(default)]
    pub last_used: Option<NaiveDateTime>,
}

impl KeyRecord {
    pub fn new(
        provider: ProviderId,
        name: impl Into<String>,
        credential: impl Into<String>,
        daily_limit: u32,
    ) -> Self {
        Self {
            id: 0,
            credential: credential.into(),
            provider,
            name: name.into(),
            daily_limit,
            usage_count: 0,
            is_active: true,
            revoked: false,
            disabled: false,
            consecutive_failures: 0,
            transient_failures: 0,
            last_failure: None,
            last_used: None,
        }
    }

    pub fn headroom(&self) -> u32 {
        self.daily_limit.saturating_sub(self.usage_count)
    }

    pub fn is_placeholder(&self) -> bool {
        self.credential.starts_with(PLACEHOLDER_PREFIX)
    }

    /// In rotation: neither disabled by an admin nor taken out by a failure
    pub fn is_enabled(&self) -> bool {
        self.is_active && !self.disabled
    }

    fn is_selectable(&self) -> bool {
        self.is_enabled() && !self.is_placeholder() && self.usage_count < self.daily_limit
    }
}

/// Admin view of a key; the credential is masked
#[derive(Debug, Clone, Serialize)]
pub struct KeyStatus {
    pub id: usize,
    pub name: String,
    pub provider: ProviderId,
    pub key_preview: String,
    pub usage_count: u32,
    pub daily_limit: u32,
    pub usage_percentage: f64,
    pub is_active: bool,
    pub revoked: bool,
    pub disabled: bool,
    pub consecutive_failures: u32,
    pub transient_failures: u32,
    pub last_used: Option<NaiveDateTime>,
    pub last_failure: Option<NaiveDateTime>,
}

impl From<&KeyRecord> for KeyStatus {
    fn from(record: &KeyRecord) -> Self {
        let usage_percentage = if record.daily_limit == 0 {
            100.0
        } else {
            record.usage_count as f64 / record.daily_limit as f64 * 100.0
        };
        Self {
            id: record.id,
            name: record.name.clone(),
            provider: record.provider,
            key_preview: if record.credential.is_empty() {
                "(none)".to_string()
            } else {
                mask_credential(&record.credential)
            },
            usage_count: record.usage_count,
            daily_limit: record.daily_limit,
            usage_percentage,
            is_active: record.is_active,
            revoked: record.revoked,
            disabled: record.disabled,
            consecutive_failures: record.consecutive_failures,
            transient_failures: record.transient_failures,
            last_used: record.last_used,
            last_failure: record.last_failure,
        }
    }
}

struct PoolState {
    records: Vec<KeyRecord>,
    next_id: usize,
    last_reset_date: NaiveDate,
    /// Bumped on every mutation, lets the store drop stale snapshots
    generation: u64,
}

impl PoolState {
    fn get_mut(&mut self, id: usize) -> Option<&mut KeyRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    fn touch(&mut self) {
        self.generation += 1;
    }

    fn snapshot(&self) -> (KeyFile, u64) {
        (
            KeyFile {
                keys: self.records.clone(),
                last_reset_date: Some(self.last_reset_date),
            },
            self.generation,
        )
    }
}

pub struct KeyPool {
    state: Mutex<PoolState>,
    cursors: [AtomicUsize; 3],
    store: Option<KeyStore>,
    metrics: Option<Metrics>,
}

fn cursor_slot(provider: ProviderId) -> usize {
    match provider {
        ProviderId::Primary => 0,
        ProviderId::Secondary => 1,
        ProviderId::Neural => 2,
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl KeyPool {
    /// In-memory pool, nothing is persisted
    pub fn new(records: Vec<KeyRecord>) -> Self {
        Self::build(
            KeyFile {
                keys: records,
                last_reset_date: None,
            },
            None,
            None,
        )
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Load the key file and start the background writer
    pub async fn load(path: impl AsRef<Path>, metrics: Option<Metrics>) -> KeyPoolResult<Arc<Self>> {
        let store = KeyStore::new(path.as_ref());
        let file = store.read().await?;

        let pool = Arc::new(Self::build(file, Some(store), metrics));
        pool.spawn_writer();

        let state = pool.state.lock();
        info!(
            "Loaded {} keys from {} ({} usable)",
            state.records.len(),
            path.as_ref().display(),
            state.records.iter().filter(|r| r.is_selectable()).count()
        );
        drop(state);

        Ok(pool)
    }

    fn build(file: KeyFile, store: Option<KeyStore>, metrics: Option<Metrics>) -> Self {
        let mut records = file.keys;
        for (i, record) in records.iter_mut().enumerate() {
            record.id = i;
            if record.name.trim().is_empty() {
                record.name = format!("{}-key-{}", record.provider, i + 1);
            }
            if record.is_placeholder() {
                debug!("Key '{}' holds a placeholder credential, never selected", record.name);
            }
        }
        let next_id = records.len();

        Self {
            state: Mutex::new(PoolState {
                records,
                next_id,
                last_reset_date: file.last_reset_date.unwrap_or_else(today),
                generation: 1,
            }),
            cursors: [AtomicUsize::new(0), AtomicUsize::new(0), AtomicUsize::new(0)],
            store,
            metrics,
        }
    }

    fn spawn_writer(self: &Arc<Self>) {
        let Some(store) = &self.store else {
            return;
        };
        let notify = store.notifier();
        let weak: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                notify.notified().await;
                let Some(pool) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = pool.flush().await {
                    warn!("Failed to persist key file: {}", e);
                }
            }
        });
    }

    fn schedule_write(&self) {
        if let Some(store) = &self.store {
            store.schedule_write();
        }
    }

    /// Write the current state to disk now
    pub async fn flush(&self) -> KeyPoolResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let (file, generation) = self.state.lock().snapshot();
        store.write(&file, generation).await?;
        debug!("Key file written ({} keys)", file.keys.len());
        Ok(())
    }

    /// Best key for `provider`
    pub fn acquire(&self, provider: ProviderId) -> KeyPoolResult<KeyRecord> {
        self.acquire_excluding(provider, &[])
    }

    /// Best key for `provider` that is not in `tried`
    pub fn acquire_excluding(&self, provider: ProviderId, tried: &[usize]) -> KeyPoolResult<KeyRecord> {
        self.reset_daily_if_needed();

        let state = self.state.lock();
        let candidates: Vec<&KeyRecord> = state
            .records
            .iter()
            .filter(|r| r.provider == provider && r.is_selectable() && !tried.contains(&r.id))
            .collect();

        let Some(best) = candidates.iter().map(|r| r.headroom()).max() else {
            debug!("No available key for {}", provider);
            return Err(KeyPoolError::NoAvailableKey { provider });
        };

        let top: Vec<&KeyRecord> = candidates
            .into_iter()
            .filter(|r| r.headroom() == best)
            .collect();
        let turn = self.cursors[cursor_slot(provider)].fetch_add(1, Ordering::Relaxed);
        let chosen = top[turn % top.len()];

        debug!(
            "Using key '{}' for {} (headroom {}, {} tied)",
            chosen.name,
            provider,
            best,
            top.len()
        );
        Ok(chosen.clone())
    }

    pub fn has_available(&self, provider: ProviderId) -> bool {
        self.state
            .lock()
            .records
            .iter()
            .any(|r| r.provider == provider && r.is_selectable())
    }

    pub fn record_usage(&self, id: usize) {
        let mut state = self.state.lock();
        let Some(record) = state.get_mut(id) else {
            return;
        };
        record.usage_count += 1;
        record.last_used = Some(now());
        state.touch();
        drop(state);
        self.schedule_write();
    }

    pub fn record_success(&self, id: usize) {
        let mut state = self.state.lock();
        let Some(record) = state.get_mut(id) else {
            return;
        };
        if record.consecutive_failures == 0 {
            return;
        }
        record.consecutive_failures = 0;
        state.touch();
        drop(state);
        self.schedule_write();
    }

    /// Returns true when the failure took the key out of rotation
    pub fn record_failure(&self, id: usize, kind: FailureKind) -> bool {
        let mut state = self.state.lock();
        let Some(record) = state.get_mut(id) else {
            return false;
        };

        record.last_failure = Some(now());
        let deactivated = if kind.deactivates_key() {
            let was_active = record.is_active;
            record.is_active = false;
            record.consecutive_failures += 1;
            if kind.revokes_key() {
                record.revoked = true;
            }
            warn!(
                "Key '{}' ({}) deactivated: {}",
                record.name,
                record.provider,
                kind.as_str()
            );
            was_active
        } else {
            record.transient_failures += 1;
            debug!(
                "Key '{}' ({}) transient failure: {} (total {})",
                record.name,
                record.provider,
                kind.as_str(),
                record.transient_failures
            );
            false
        };
        state.touch();
        drop(state);

        if deactivated {
            if let Some(metrics) = &self.metrics {
                metrics.record_key_deactivation();
            }
        }
        self.schedule_write();
        deactivated
    }

    /// Put a key back into rotation after a healthy probe. Admin-disabled
    /// keys are left alone.
    pub fn reactivate(&self, id: usize) -> bool {
        let mut state = self.state.lock();
        let Some(record) = state.get_mut(id) else {
            return false;
        };
        if record.disabled {
            return false;
        }
        let changed = !record.is_active || record.revoked;
        record.is_active = true;
        record.revoked = false;
        record.consecutive_failures = 0;
        info!("Key '{}' ({}) reactivated", record.name, record.provider);
        state.touch();
        drop(state);

        if changed {
            if let Some(metrics) = &self.metrics {
                metrics.record_key_recovered();
            }
        }
        self.schedule_write();
        changed
    }

    /// Zero usage and re-activate everything that was neither revoked nor disabled
    pub fn reset_daily(&self) {
        self.reset_daily_at(today());
    }

    /// Run the daily reset once per local calendar day
    pub fn reset_daily_if_needed(&self) -> bool {
        self.reset_daily_if_needed_at(today())
    }

    pub(crate) fn reset_daily_if_needed_at(&self, day: NaiveDate) -> bool {
        if self.state.lock().last_reset_date >= day {
            return false;
        }
        self.reset_daily_at(day);
        true
    }

    fn reset_daily_at(&self, day: NaiveDate) {
        let mut state = self.state.lock();
        let mut reactivated = 0;
        for record in state.records.iter_mut() {
            record.usage_count = 0;
            if !record.is_active && !record.revoked && !record.disabled {
                record.is_active = true;
                record.consecutive_failures = 0;
                reactivated += 1;
            }
        }
        state.last_reset_date = day;
        state.touch();
        info!(
            "Daily key reset for {}: usage cleared, {} keys re-activated",
            day, reactivated
        );
        drop(state);
        self.schedule_write();
    }

    pub fn records(&self) -> Vec<KeyRecord> {
        self.state.lock().records.clone()
    }

    pub fn get(&self, id: usize) -> Option<KeyRecord> {
        self.state.lock().records.iter().find(|r| r.id == id).cloned()
    }

    pub fn status(&self) -> Vec<KeyStatus> {
        self.state.lock().records.iter().map(KeyStatus::from).collect()
    }

    pub fn add_key(&self, mut record: KeyRecord) -> KeyPoolResult<usize> {
        let mut state = self.state.lock();
        if state.records.iter().any(|r| r.name == record.name) {
            return Err(KeyPoolError::DuplicateKey(record.name));
        }
        record.id = state.next_id;
        state.next_id += 1;
        let id = record.id;
        info!("Added key '{}' for {}", record.name, record.provider);
        state.records.push(record);
        state.touch();
        drop(state);
        self.schedule_write();
        Ok(id)
    }

    pub fn remove_key(&self, name: &str) -> KeyPoolResult<KeyRecord> {
        let mut state = self.state.lock();
        let pos = state
            .records
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| KeyPoolError::UnknownKey(name.to_string()))?;
        let removed = state.records.remove(pos);
        state.touch();
        drop(state);
        info!("Removed key '{}'", name);
        self.schedule_write();
        Ok(removed)
    }

    /// Disable an enabled key, or put a disabled or failed key back into
    /// rotation. Returns whether the key is enabled afterwards.
    pub fn toggle_key(&self, name: &str) -> KeyPoolResult<bool> {
        let mut state = self.state.lock();
        let record = state
            .records
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| KeyPoolError::UnknownKey(name.to_string()))?;
        if record.is_enabled() {
            record.disabled = true;
        } else {
            record.disabled = false;
            record.is_active = true;
            record.revoked = false;
            record.consecutive_failures = 0;
        }
        let enabled = record.is_enabled();
        state.touch();
        drop(state);
        info!("Key '{}' is now {}", name, if enabled { "enabled" } else { "disabled" });
        self.schedule_write();
        Ok(enabled)
    }

    /// Re-activate every key a failure took out and clear failure counters.
    /// Admin-disabled keys stay disabled.
    pub fn reset_failed(&self) -> usize {
        let mut state = self.state.lock();
        let mut count = 0;
        for record in state.records.iter_mut() {
            if !record.is_active && !record.disabled {
                record.is_active = true;
                record.revoked = false;
                count += 1;
            }
            record.consecutive_failures = 0;
            record.transient_failures = 0;
        }
        state.touch();
        drop(state);
        info!("Reset {} failed keys", count);
        self.schedule_write();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(provider: ProviderId, name: &str, limit: u32) -> KeyRecord {
        KeyRecord::new(provider, name, format!("secret-{}", name), limit)
    }

    #[test]
    fn test_acquire_prefers_headroom() {
        let mut busy = key(ProviderId::Primary, "busy", 100);
        busy.usage_count = 90;
        let pool = KeyPool::new(vec![busy, key(ProviderId::Primary, "fresh", 50)]);

        let chosen = pool.acquire(ProviderId::Primary).unwrap();
        assert_eq!(chosen.name, "fresh");
    }

    #[test]
    fn test_ties_rotate() {
        let pool = KeyPool::new(vec![
            key(ProviderId::Primary, "a", 10),
            key(ProviderId::Primary, "b", 10),
        ]);

        let first = pool.acquire(ProviderId::Primary).unwrap();
        let second = pool.acquire(ProviderId::Primary).unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_usage_spreads_load() {
        let pool = KeyPool::new(vec![
            key(ProviderId::Primary, "a", 10),
            key(ProviderId::Primary, "b", 10),
        ]);

        for _ in 0..6 {
            let k = pool.acquire(ProviderId::Primary).unwrap();
            pool.record_usage(k.id);
        }
        let usage: Vec<u32> = pool.records().iter().map(|r| r.usage_count).collect();
        assert_eq!(usage, vec![3, 3]);
    }

    #[test]
    fn test_exhausted_key_is_skipped() {
        let mut full = key(ProviderId::Primary, "full", 5);
        full.usage_count = 5;
        let pool = KeyPool::new(vec![full]);

        assert!(matches!(
            pool.acquire(ProviderId::Primary),
            Err(KeyPoolError::NoAvailableKey { provider: ProviderId::Primary })
        ));
    }

    #[test]
    fn test_providers_are_separate() {
        let pool = KeyPool::new(vec![key(ProviderId::Secondary, "s", 10)]);
        assert!(pool.acquire(ProviderId::Primary).is_err());
        assert!(pool.acquire(ProviderId::Secondary).is_ok());
        assert!(pool.has_available(ProviderId::Secondary));
        assert!(!pool.has_available(ProviderId::Neural));
    }

    #[test]
    fn test_placeholder_never_selected() {
        let pool = KeyPool::new(vec![KeyRecord::new(
            ProviderId::Primary,
            "Key 1",
            "YOUR_GEMINI_API_KEY_1",
            1000,
        )]);
        assert!(pool.acquire(ProviderId::Primary).is_err());
    }

    #[test]
    fn test_acquire_excluding() {
        let pool = KeyPool::new(vec![
            key(ProviderId::Primary, "a", 10),
            key(ProviderId::Primary, "b", 10),
        ]);
        let first = pool.acquire(ProviderId::Primary).unwrap();
        let other = pool.acquire_excluding(ProviderId::Primary, &[first.id]).unwrap();
        assert_ne!(first.id, other.id);
        assert!(pool
            .acquire_excluding(ProviderId::Primary, &[first.id, other.id])
            .is_err());
    }

    #[test]
    fn test_failure_classification() {
        let pool = KeyPool::new(vec![
            key(ProviderId::Primary, "auth", 10),
            key(ProviderId::Primary, "quota", 10),
            key(ProviderId::Primary, "flaky", 10),
        ]);

        assert!(pool.record_failure(0, FailureKind::Unauthorized));
        assert!(pool.record_failure(1, FailureKind::QuotaExceeded));
        assert!(!pool.record_failure(2, FailureKind::RateLimited));
        assert!(!pool.record_failure(2, FailureKind::Unreachable));

        let records = pool.records();
        assert!(!records[0].is_active && records[0].revoked);
        assert!(!records[1].is_active && !records[1].revoked);
        assert!(records[2].is_active);
        assert_eq!(records[2].transient_failures, 2);
        assert_eq!(records[2].consecutive_failures, 0);

        assert_eq!(pool.acquire(ProviderId::Primary).unwrap().name, "flaky");
    }

    #[test]
    fn test_success_clears_consecutive_failures() {
        let pool = KeyPool::new(vec![key(ProviderId::Primary, "a", 10)]);
        pool.record_failure(0, FailureKind::QuotaExceeded);
        pool.reactivate(0);
        pool.record_failure(0, FailureKind::QuotaExceeded);
        assert_eq!(pool.get(0).unwrap().consecutive_failures, 1);
        pool.record_success(0);
        assert_eq!(pool.get(0).unwrap().consecutive_failures, 0);
    }

    #[test]
    fn test_daily_reset_keeps_revoked_out() {
        let pool = KeyPool::new(vec![
            key(ProviderId::Primary, "revoked", 10),
            key(ProviderId::Primary, "quota", 10),
        ]);
        pool.record_usage(1);
        pool.record_failure(0, FailureKind::Forbidden);
        pool.record_failure(1, FailureKind::QuotaExceeded);
        assert!(pool.acquire(ProviderId::Primary).is_err());

        let tomorrow = today().succ_opt().unwrap();
        assert!(pool.reset_daily_if_needed_at(tomorrow));
        assert!(!pool.reset_daily_if_needed_at(tomorrow));

        let records = pool.records();
        assert!(!records[0].is_active);
        assert!(records[1].is_active);
        assert_eq!(records[1].usage_count, 0);
        assert_eq!(pool.acquire(ProviderId::Primary).unwrap().name, "quota");
    }

    #[test]
    fn test_reactivate_clears_revocation() {
        let pool = KeyPool::new(vec![key(ProviderId::Primary, "a", 10)]);
        pool.record_failure(0, FailureKind::Unauthorized);
        assert!(pool.reactivate(0));
        let record = pool.get(0).unwrap();
        assert!(record.is_active && !record.revoked);
    }

    #[test]
    fn test_admin_operations() {
        let pool = KeyPool::new(vec![key(ProviderId::Primary, "a", 10)]);

        let id = pool.add_key(key(ProviderId::Secondary, "b", 20)).unwrap();
        assert_eq!(id, 1);
        assert!(matches!(
            pool.add_key(key(ProviderId::Secondary, "b", 20)),
            Err(KeyPoolError::DuplicateKey(_))
        ));

        assert!(!pool.toggle_key("a").unwrap());
        assert!(pool.acquire(ProviderId::Primary).is_err());
        assert!(pool.toggle_key("a").unwrap());

        pool.record_failure(id, FailureKind::Unauthorized);
        assert_eq!(pool.reset_failed(), 1);
        assert!(pool.get(id).unwrap().is_active);

        pool.remove_key("b").unwrap();
        assert!(matches!(pool.remove_key("b"), Err(KeyPoolError::UnknownKey(_))));
        assert_eq!(pool.records().len(), 1);
    }

    #[test]
    fn test_disabled_key_survives_daily_reset() {
        let pool = KeyPool::new(vec![
            key(ProviderId::Primary, "manual", 10),
            key(ProviderId::Primary, "quota", 10),
        ]);
        assert!(!pool.toggle_key("manual").unwrap());
        pool.record_failure(1, FailureKind::QuotaExceeded);

        pool.reset_daily_if_needed_at(today().succ_opt().unwrap());

        let records = pool.records();
        assert!(records[0].disabled);
        assert!(!records[0].is_enabled());
        assert!(records[1].is_enabled());
        assert_eq!(pool.acquire(ProviderId::Primary).unwrap().name, "quota");
    }

    #[test]
    fn test_disabled_key_ignores_reactivate_and_reset_failed() {
        let pool = KeyPool::new(vec![key(ProviderId::Primary, "manual", 10)]);
        pool.toggle_key("manual").unwrap();

        assert!(!pool.reactivate(0));
        assert_eq!(pool.reset_failed(), 0);
        assert!(pool.acquire(ProviderId::Primary).is_err());

        // Toggling again is the only way back
        assert!(pool.toggle_key("manual").unwrap());
        assert!(pool.acquire(ProviderId::Primary).is_ok());
    }

    #[test]
    fn test_toggle_restores_failed_key() {
        let pool = KeyPool::new(vec![key(ProviderId::Primary, "auth", 10)]);
        pool.record_failure(0, FailureKind::Unauthorized);
        assert!(pool.toggle_key("auth").unwrap());
        let record = pool.get(0).unwrap();
        assert!(record.is_enabled() && !record.revoked && !record.disabled);
    }

    #[test]
    fn test_status_masks_credentials() {
        let mut record = KeyRecord::new(ProviderId::Primary, "a", "AIzaSyVerySecret", 200);
        record.usage_count = 50;
        let pool = KeyPool::new(vec![record]);

        let status = pool.status();
        assert_eq!(status[0].key_preview, "AIzaSy...");
        assert!((status[0].usage_percentage - 25.0).abs() < f64::EPSILON);
        let json = serde_json::to_string(&status).unwrap();
        assert!(!json.contains("VerySecret"));
    }

    #[tokio::test]
    async fn test_state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");

        let pool = KeyPool::load(&path, None).await.unwrap();
        pool.add_key(key(ProviderId::Primary, "a", 10)).unwrap();
        pool.record_usage(0);
        pool.record_failure(0, FailureKind::Forbidden);
        pool.flush().await.unwrap();

        let reloaded = KeyPool::load(&path, None).await.unwrap();
        let records = reloaded.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].usage_count, 1);
        assert!(!records[0].is_active);
        assert!(records[0].revoked);
    }

    #[tokio::test]
    async fn test_usage_reaches_disk_without_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");

        let pool = KeyPool::load(&path, None).await.unwrap();
        pool.add_key(key(ProviderId::Primary, "a", 10)).unwrap();
        pool.record_usage(0);

        let mut on_disk = None;
        for _ in 0..40 {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            let data = tokio::fs::read_to_string(&path).await.unwrap();
            let file: serde_json::Value = serde_json::from_str(&data).unwrap();
            on_disk = file["keys"][0]["usage_count"].as_u64();
            if on_disk == Some(1) {
                break;
            }
        }
        assert_eq!(on_disk, Some(1));
    }
}
