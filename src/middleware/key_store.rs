// On-disk key file
//
// Writes go to a sibling temp file and are renamed into place. A generation
// check keeps a slow older snapshot from overwriting a newer one.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

use crate::core::errors::{KeyPoolError, KeyPoolResult};
use crate::middleware::key_pool::KeyRecord;

/// Serialized form of the key pool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyFile {
    #[serde(default, alias = "gemini_api_keys")]
    pub keys: Vec<KeyRecord>,
    #[serde(default)]
    pub last_reset_date: Option<NaiveDate>,
}

pub struct KeyStore {
    path: PathBuf,
    written_generation: Mutex<u64>,
    notify: Arc<Notify>,
}

impl KeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written_generation: Mutex::new(0),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }

    /// Ask the background writer to persist the latest state
    pub fn schedule_write(&self) {
        self.notify.notify_one();
    }

    /// Read the key file, creating an empty one when it does not exist yet
    pub async fn read(&self) -> KeyPoolResult<KeyFile> {
        let path_str = self.path.display().to_string();

        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            info!("Key file {} not found, creating an empty one", path_str);
            let file = KeyFile::default();
            self.write(&file, 0).await?;
            return Ok(file);
        }

        let data = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| KeyPoolError::LoadFailed {
                path: path_str,
                source,
            })?;

        Ok(serde_json::from_str(&data)?)
    }

    /// Write `file` unless a newer generation is already on disk
    pub async fn write(&self, file: &KeyFile, generation: u64) -> KeyPoolResult<()> {
        let mut written = self.written_generation.lock().await;
        if generation < *written {
            debug!(
                "Skipping stale key file snapshot (generation {} < {})",
                generation, *written
            );
            return Ok(());
        }

        let path_str = self.path.display().to_string();
        let json = serde_json::to_string_pretty(file)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| KeyPoolError::SaveFailed {
                        path: path_str.clone(),
                        source,
                    })?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| KeyPoolError::SaveFailed {
                path: tmp.display().to_string(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| KeyPoolError::SaveFailed {
                path: path_str,
                source,
            })?;

        *written = generation;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ProviderId;

    #[tokio::test]
    async fn test_missing_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        let store = KeyStore::new(&path);

        let file = store.read().await.unwrap();
        assert!(file.keys.is_empty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_reads_legacy_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_keys.json");
        std::fs::write(
            &path,
            r#"{
                "gemini_api_keys": [
                    {"key": "AIza-one", "name": "Key 1", "usage_count": 12,
                     "last_used": "2025-01-02T10:11:12.123456", "daily_limit": 1000, "is_active": true}
                ],
                "rotation_strategy": "round_robin",
                "auto_switch_on_error": true
            }"#,
        )
        .unwrap();

        let file = KeyStore::new(&path).read().await.unwrap();
        assert_eq!(file.keys.len(), 1);
        let key = &file.keys[0];
        assert_eq!(key.credential, "AIza-one");
        assert_eq!(key.provider, ProviderId::Primary);
        assert_eq!(key.usage_count, 12);
        assert!(key.last_used.is_some());
        assert!(!key.revoked);
    }

    #[tokio::test]
    async fn test_stale_generation_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        let store = KeyStore::new(&path);

        let newer = KeyFile {
            keys: Vec::new(),
            last_reset_date: NaiveDate::from_ymd_opt(2025, 5, 2),
        };
        let older = KeyFile {
            keys: Vec::new(),
            last_reset_date: NaiveDate::from_ymd_opt(2025, 5, 1),
        };
        store.write(&newer, 7).await.unwrap();
        store.write(&older, 3).await.unwrap();

        let on_disk = store.read().await.unwrap();
        assert_eq!(on_disk.last_reset_date, NaiveDate::from_ymd_opt(2025, 5, 2));
    }
}
