use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use fs2::FileExt;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::ports::state_store::{SharedStateStore, StoreChange, StoreError};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Store persisted as one JSON object on disk.
///
/// Every read goes to the file, so separate processes sharing the path see
/// each other's writes. A write is a read-modify-write of the whole
/// document under an exclusive lock on the `<path>.lock` sidecar, and the
/// new document replaces the file through a uniquely named temp file.
/// Writes to different keys from different processes never undo each other.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    changes: broadcast::Sender<StoreChange>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            path: path.into(),
            changes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn read_document(&self) -> Result<Map<String, Value>, StoreError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| StoreError::ReadError(e.to_string()))?;

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StoreError::CorruptedStore(
                "top-level value is not an object".to_string(),
            )),
            Err(e) => Err(StoreError::CorruptedStore(e.to_string())),
        }
    }

    fn write_document(&self, document: &Map<String, Value>) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(document)
            .map_err(|e| StoreError::WriteError(e.to_string()))?;

        let mut tmp = NamedTempFile::new_in(self.parent_dir())
            .map_err(|e| StoreError::WriteError(e.to_string()))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| StoreError::WriteError(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::WriteError(e.error.to_string()))?;
        Ok(())
    }

    /// Blocking read-modify-write of one key under the sidecar lock
    fn write_key(&self, key: &str, value: Value) -> Result<(), StoreError> {
        fs::create_dir_all(self.parent_dir()).map_err(|e| StoreError::WriteError(e.to_string()))?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())
            .map_err(|e| StoreError::WriteError(format!("lock file: {}", e)))?;
        lock.lock_exclusive()
            .map_err(|e| StoreError::WriteError(format!("lock: {}", e)))?;

        // held until `lock` drops at the end of this call
        let mut document = self.read_document()?;
        document.insert(key.to_string(), value);
        self.write_document(&document)
    }

    /// Poll the file and emit a change for every key another process wrote
    pub fn spawn_poller(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        let mut last = self.read_document().unwrap_or_default();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                ticker.tick().await;

                let current = match store.read_document() {
                    Ok(document) => document,
                    Err(e) => {
                        tracing::warn!("Store poll failed for {}: {}", store.path.display(), e);
                        continue;
                    }
                };

                for (key, value) in &current {
                    if last.get(key) != Some(value) {
                        let _ = store.changes.send(StoreChange { key: key.clone() });
                    }
                }
                last = current;
            }
        })
    }
}

#[async_trait]
impl SharedStateStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_document()?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let store = self.clone();
        let owned_key = key.to_string();
        tokio::task::spawn_blocking(move || store.write_key(&owned_key, value))
            .await
            .map_err(|e| StoreError::WriteError(format!("Task join error: {}", e)))??;

        tracing::trace!("Store key written: {}", key);
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_set_and_get() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("store.json"));

        assert!(store.get("FILTER_BSC").await.unwrap().is_none());

        store.set("FILTER_BSC", serde_json::json!({ "run": "YES" })).await.unwrap();
        store.set("TOKEN_BSC", serde_json::json!([])).await.unwrap();

        assert_eq!(store.get("FILTER_BSC").await.unwrap().unwrap()["run"], "YES");
        assert_eq!(store.get("TOKEN_BSC").await.unwrap().unwrap(), serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_separate_instances_see_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        let writer = JsonFileStore::new(&path);
        let reader = JsonFileStore::new(&path);

        writer.set("FILTER_BSC", serde_json::json!({ "run": "YES" })).await.unwrap();
        assert_eq!(reader.get("FILTER_BSC").await.unwrap().unwrap()["run"], "YES");

        reader.set("FILTER_BSC", serde_json::json!({ "run": "NO" })).await.unwrap();
        assert_eq!(writer.get("FILTER_BSC").await.unwrap().unwrap()["run"], "NO");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_handles_keep_each_others_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let scanner = JsonFileStore::new(&path);
        let operator = JsonFileStore::new(&path);
        let rounds = 100;

        let catalogs = tokio::spawn(async move {
            for i in 0..rounds {
                scanner
                    .set(&format!("TOKEN_CHAIN{}", i), serde_json::json!([i]))
                    .await
                    .unwrap();
            }
        });
        let stops = tokio::spawn(async move {
            for i in 0..rounds {
                operator
                    .set(&format!("FILTER_CHAIN{}", i), serde_json::json!({ "run": "NO" }))
                    .await
                    .unwrap();
            }
        });
        catalogs.await.unwrap();
        stops.await.unwrap();

        let reader = JsonFileStore::new(&path);
        for i in 0..rounds {
            assert_eq!(
                reader.get(&format!("TOKEN_CHAIN{}", i)).await.unwrap(),
                Some(serde_json::json!([i]))
            );
            assert_eq!(
                reader.get(&format!("FILTER_CHAIN{}", i)).await.unwrap().unwrap()["run"],
                "NO"
            );
        }

        // only the document and its lock sidecar remain
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["store.json", "store.json.lock"]);
    }

    #[tokio::test]
    async fn test_corrupted_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{ invalid json }").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(
            store.get("FILTER_BSC").await,
            Err(StoreError::CorruptedStore(_))
        ));
        assert!(store.set("FILTER_BSC", Value::Null).await.is_err());
    }

    #[tokio::test]
    async fn test_poller_reports_foreign_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let watched = JsonFileStore::new(&path);
        let other_process = JsonFileStore::new(&path);

        let mut changes = watched.subscribe();
        let poller = watched.spawn_poller(Duration::from_millis(10));

        other_process
            .set("FILTER_POLYGON", serde_json::json!({ "run": "YES" }))
            .await
            .unwrap();

        let change = tokio::time::timeout(Duration::from_secs(2), changes.recv())
            .await
            .expect("poller should report the change")
            .unwrap();
        assert_eq!(change.key, "FILTER_POLYGON");
        poller.abort();
    }
}
