//! Catalog Repository
//!
//! Typed access to the logical persistence keys of the shared store:
//! token catalogs per scope, the scanner settings entry and the wallet
//! capability store. Run-state keys belong to the run-state controller.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{Scope, TokenRecord, WalletCapabilityStore};
use crate::ports::state_store::{get_or, put, SharedStateStore, StoreError};

/// Scanner settings entry
pub const SETTINGS_KEY: &str = "SETTING_SCANNER";

/// Wallet capability store entry
pub const WALLET_STATUS_KEY: &str = "CEX_WALLET_STATUS";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse {what}: {message}")]
    ParseError { what: String, message: String },
}

/// Persisted scanner settings.
///
/// Only the fields the engine reads are typed; everything else the host
/// stores is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerSettings {
    /// Chains selected for scanning
    #[serde(default)]
    pub chains: Vec<String>,
    /// Exchanges selected for scanning, in dispatch order
    #[serde(default)]
    pub exchanges: Vec<String>,
    #[serde(flatten, default)]
    pub extra: Map<String, Value>,
}

#[derive(Clone)]
pub struct CatalogRepository {
    store: Arc<dyn SharedStateStore>,
}

impl CatalogRepository {
    pub fn new(store: Arc<dyn SharedStateStore>) -> Self {
        Self { store }
    }

    /// Token catalog of a scope; empty when never saved
    pub async fn load(&self, scope: &Scope) -> Result<Vec<TokenRecord>, CatalogError> {
        Ok(get_or(self.store.as_ref(), &scope.catalog_key(), Vec::new()).await?)
    }

    pub async fn save(&self, scope: &Scope, tokens: &[TokenRecord]) -> Result<(), CatalogError> {
        put(self.store.as_ref(), &scope.catalog_key(), tokens).await?;
        tracing::debug!("Saved {} tokens to {}", tokens.len(), scope.catalog_key());
        Ok(())
    }

    /// Write scanned prices back without clobbering concurrent edits.
    ///
    /// The stored catalog is re-read and only newer price fields are copied
    /// in, matched by token id. Capability flags merged meanwhile and tokens
    /// added or removed by an import are kept as stored.
    pub async fn save_prices(&self, scope: &Scope, scanned: &[TokenRecord]) -> Result<usize, CatalogError> {
        let by_id: HashMap<&str, &TokenRecord> =
            scanned.iter().map(|t| (t.id.as_str(), t)).collect();
        let mut stored = self.load(scope).await?;
        let mut updated = 0;

        for token in stored.iter_mut() {
            let Some(fresh) = by_id.get(token.id.as_str()) else {
                continue;
            };
            for (exchange, data) in &fresh.data_cexs {
                token.cex_entry(exchange).merge_prices(data);
            }
            if fresh.updated_at > token.updated_at {
                token.updated_at = fresh.updated_at;
                updated += 1;
            }
        }

        self.save(scope, &stored).await?;
        Ok(updated)
    }

    /// Replace a scope's catalog wholesale from a JSON file
    pub async fn import_file(&self, scope: &Scope, path: &Path) -> Result<usize, CatalogError> {
        let content = fs::read_to_string(path)?;
        let tokens = parse_catalog(scope, &content)?;
        self.save(scope, &tokens).await?;
        tracing::info!(
            "Imported {} tokens into {} from {}",
            tokens.len(),
            scope,
            path.display()
        );
        Ok(tokens.len())
    }

    pub async fn load_settings(&self) -> Result<ScannerSettings, CatalogError> {
        Ok(get_or(self.store.as_ref(), SETTINGS_KEY, ScannerSettings::default()).await?)
    }

    pub async fn save_settings(&self, settings: &ScannerSettings) -> Result<(), CatalogError> {
        put(self.store.as_ref(), SETTINGS_KEY, settings).await?;
        Ok(())
    }

    pub async fn load_wallet_store(&self) -> Result<WalletCapabilityStore, CatalogError> {
        Ok(get_or(self.store.as_ref(), WALLET_STATUS_KEY, WalletCapabilityStore::new()).await?)
    }

    pub async fn save_wallet_store(&self, wallets: &WalletCapabilityStore) -> Result<(), CatalogError> {
        put(self.store.as_ref(), WALLET_STATUS_KEY, wallets).await?;
        Ok(())
    }

    /// Replace the wallet capability store from a JSON file
    pub async fn import_wallet_file(&self, path: &Path) -> Result<WalletCapabilityStore, CatalogError> {
        let content = fs::read_to_string(path)?;
        let wallets: WalletCapabilityStore =
            serde_json::from_str(&content).map_err(|e| CatalogError::ParseError {
                what: path.display().to_string(),
                message: e.to_string(),
            })?;
        self.save_wallet_store(&wallets).await?;
        tracing::info!(
            "Imported wallet status for {} exchanges from {}",
            wallets.exchange_count(),
            path.display()
        );
        Ok(wallets)
    }
}

/// Parse a catalog document (a JSON array of token records).
///
/// Records without a chain inherit the scope's chain; the multichain scope
/// requires every record to name its chain.
pub fn parse_catalog(scope: &Scope, content: &str) -> Result<Vec<TokenRecord>, CatalogError> {
    let mut tokens: Vec<TokenRecord> =
        serde_json::from_str(content).map_err(|e| CatalogError::ParseError {
            what: format!("catalog for {}", scope),
            message: e.to_string(),
        })?;

    for (index, token) in tokens.iter_mut().enumerate() {
        if !token.chain.trim().is_empty() {
            continue;
        }
        match scope {
            Scope::Chain(id) => token.chain = id.clone(),
            Scope::Multichain => {
                return Err(CatalogError::ParseError {
                    what: format!("catalog for {}", scope),
                    message: format!("record {} ({}) has no chain", index, token.id),
                });
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::InMemoryStateStore;
    use crate::domain::WalletCapability;
    use tempfile::tempdir;

    fn repository() -> (InMemoryStateStore, CatalogRepository) {
        let store = InMemoryStateStore::new();
        let repository = CatalogRepository::new(Arc::new(store.clone()));
        (store, repository)
    }

    #[tokio::test]
    async fn test_catalog_keys() {
        let (store, repository) = repository();
        let token = TokenRecord::new("t1", "USDT", "ETH", "bsc").with_cexs(["BINANCE"]);

        repository.save(&Scope::chain("BSC"), &[token.clone()]).await.unwrap();
        repository.save(&Scope::Multichain, &[token]).await.unwrap();

        assert_eq!(store.keys().await, vec!["TOKEN_BSC", "TOKEN_MULTICHAIN"]);
        assert_eq!(repository.load(&Scope::chain("bsc")).await.unwrap().len(), 1);
        assert!(repository.load(&Scope::chain("polygon")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_derived_fields_survive_round_trip() {
        let (store, repository) = repository();
        store
            .set(
                "TOKEN_BSC",
                serde_json::json!([{
                    "id": "t1",
                    "symbol_in": "USDT",
                    "symbol_out": "ETH",
                    "chain": "bsc",
                    "selectedCexs": ["BINANCE"],
                    "profitPercent": 1.25
                }]),
            )
            .await
            .unwrap();

        let bsc = Scope::chain("bsc");
        let tokens = repository.load(&bsc).await.unwrap();
        repository.save(&bsc, &tokens).await.unwrap();

        let raw = store.get("TOKEN_BSC").await.unwrap().unwrap();
        assert_eq!(raw[0]["profitPercent"], 1.25);
    }

    #[tokio::test]
    async fn test_save_prices_keeps_concurrent_edits() {
        let (_store, repository) = repository();
        let bsc = Scope::chain("bsc");
        let base = vec![
            TokenRecord::new("t1", "USDT", "ETH", "bsc").with_cexs(["BINANCE"]),
            TokenRecord::new("t2", "USDT", "BNB", "bsc").with_cexs(["BINANCE"]),
        ];
        repository.save(&bsc, &base).await.unwrap();

        // Scanner works on its own copy
        let mut scanned = base.clone();
        let now = chrono::Utc::now();
        scanned[0]
            .cex_entry("BINANCE")
            .apply_quote(&crate::domain::PriceQuote::new(1.0, 1.01, 2.0, 2.02), now);
        scanned[0].updated_at = Some(now);

        // Meanwhile another context merged wallet flags and dropped t2
        let mut edited = vec![base[0].clone()];
        edited[0]
            .cex_entry("BINANCE")
            .apply_capability(&WalletCapability::new(true, false));
        repository.save(&bsc, &edited).await.unwrap();

        let updated = repository.save_prices(&bsc, &scanned).await.unwrap();

        assert_eq!(updated, 1);
        let stored = repository.load(&bsc).await.unwrap();
        assert_eq!(stored.len(), 1);
        let data = stored[0].cex("BINANCE").unwrap();
        assert_eq!(data.price_buy_token, Some(1.0));
        assert_eq!(data.deposit_token, Some(true));
    }

    #[tokio::test]
    async fn test_import_file_fills_chain() {
        let (_store, repository) = repository();
        let dir = tempdir().unwrap();
        let path = dir.path().join("bsc.json");
        fs::write(
            &path,
            r#"[{"id": "t1", "symbol_in": "USDT", "symbol_out": "ETH", "chain": ""}]"#,
        )
        .unwrap();

        let count = repository.import_file(&Scope::chain("bsc"), &path).await.unwrap();

        assert_eq!(count, 1);
        let tokens = repository.load(&Scope::chain("bsc")).await.unwrap();
        assert_eq!(tokens[0].chain, "bsc");
    }

    #[test]
    fn test_multichain_import_requires_chain() {
        let content = r#"[{"id": "t1", "symbol_in": "USDT", "symbol_out": "ETH", "chain": ""}]"#;
        assert!(matches!(
            parse_catalog(&Scope::Multichain, content),
            Err(CatalogError::ParseError { .. })
        ));
        assert!(parse_catalog(&Scope::Multichain, "not json").is_err());
    }

    #[tokio::test]
    async fn test_settings_and_wallets() {
        let (_store, repository) = repository();
        assert_eq!(repository.load_settings().await.unwrap(), ScannerSettings::default());

        let settings = ScannerSettings {
            chains: vec!["bsc".to_string()],
            exchanges: vec!["BINANCE".to_string()],
            extra: Map::new(),
        };
        repository.save_settings(&settings).await.unwrap();
        assert_eq!(repository.load_settings().await.unwrap(), settings);

        let mut wallets = WalletCapabilityStore::new();
        wallets.insert("BINANCE", "BSC", "USDT", WalletCapability::new(true, true));
        repository.save_wallet_store(&wallets).await.unwrap();
        assert_eq!(repository.load_wallet_store().await.unwrap(), wallets);
    }

    #[tokio::test]
    async fn test_import_wallet_file() {
        let (_store, repository) = repository();
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallets.json");
        fs::write(
            &path,
            r#"{"BINANCE": {"BSC": {"USDT": {"depositEnabled": true, "withdrawEnabled": false}}}}"#,
        )
        .unwrap();

        let wallets = repository.import_wallet_file(&path).await.unwrap();

        assert_eq!(wallets.exchange_count(), 1);
        assert_eq!(repository.load_wallet_store().await.unwrap(), wallets);
    }
}
