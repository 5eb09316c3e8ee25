use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

use crate::ports::state_store::{SharedStateStore, StoreChange, StoreError};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// In-memory store; every clone is another handle onto the same data
#[derive(Debug, Clone)]
pub struct InMemoryStateStore {
    entries: Arc<RwLock<HashMap<String, Value>>>,
    changes: broadcast::Sender<StoreChange>,
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl SharedStateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        // No subscribers is fine
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

    #[tokio::test]
    async fn test_clones_share_data() {
        let store = InMemoryStateStore::new();
        let other = store.clone();

        store.set("FILTER_BSC", serde_json::json!({ "run": "YES" })).await.unwrap();

        let value = other.get("FILTER_BSC").await.unwrap().unwrap();
        assert_eq!(value["run"], "YES");
        assert!(other.get("FILTER_ETH").await.unwrap().is_none());
        assert_eq!(other.keys().await, vec!["FILTER_BSC"]);
    }

    #[tokio::test]
    async fn test_change_notification() {
        let store = InMemoryStateStore::new();
        let mut changes = store.clone().subscribe();

        store.set("TOKEN_BSC", serde_json::json!([])).await.unwrap();

        let change = changes.recv().await.unwrap();
        assert_eq!(change.key, "TOKEN_BSC");
    }
}
