//! Shared State Store Port
//!
//! Key-value store shared by every execution context of a session. Writes
//! are the only inter-context signal; `subscribe` delivers a notification
//! for every key written through any handle of the same store.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Failed to read store: {0}")]
    ReadError(String),

    #[error("Failed to write store: {0}")]
    WriteError(String),

    #[error("Store document is corrupted: {0}")]
    CorruptedStore(String),

    #[error("Failed to decode value for key {key}: {message}")]
    DecodeError { key: String, message: String },

    #[error("Failed to encode value for key {key}: {message}")]
    EncodeError { key: String, message: String },
}

/// Change notification emitted after a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SharedStateStore: Send + Sync {
    /// Read a raw value; `None` when the key was never written
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Write a raw value and notify subscribers
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Observe writes made through any handle of this store
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// Typed read, falling back to `default` for a missing key
pub async fn get_or<T>(
    store: &dyn SharedStateStore,
    key: &str,
    default: T,
) -> Result<T, StoreError>
where
    T: DeserializeOwned,
{
    match store.get(key).await? {
        Some(Value::Null) | None => Ok(default),
        Some(value) => serde_json::from_value(value).map_err(|e| StoreError::DecodeError {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Typed write
pub async fn put<T>(store: &dyn SharedStateStore, key: &str, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(value).map_err(|e| StoreError::EncodeError {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.set(key, value).await
}
