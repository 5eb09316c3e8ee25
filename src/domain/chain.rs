//! Chain Configuration
//!
//! Static mapping from canonical chain id to display label and the chain
//! label each exchange uses for it. Resolution is an explicit per-exchange
//! table lookup; no fuzzy normalization beyond case.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One canonical chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainEntry {
    /// Human label for banners (falls back to the chain id)
    #[serde(default)]
    pub display_name: Option<String>,
    /// Exchange id -> chain label that exchange reports
    #[serde(default, rename = "cex")]
    pub cex_labels: BTreeMap<String, String>,
}

impl ChainEntry {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: Some(display_name.into()),
            cex_labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, exchange: impl Into<String>, label: impl Into<String>) -> Self {
        self.cex_labels.insert(exchange.into(), label.into());
        self
    }
}

/// Canonical chain id -> entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainConfig {
    chains: BTreeMap<String, ChainEntry>,
}

impl ChainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chain(mut self, chain: &str, entry: ChainEntry) -> Self {
        self.insert(chain, entry);
        self
    }

    pub fn insert(&mut self, chain: &str, entry: ChainEntry) {
        self.chains.insert(chain.trim().to_lowercase(), entry);
    }

    pub fn get(&self, chain: &str) -> Option<&ChainEntry> {
        self.chains.get(&chain.trim().to_lowercase())
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Label for banners; raw id when no display name is configured
    pub fn display_label(&self, chain: &str) -> String {
        self.get(chain)
            .and_then(|entry| entry.display_name.clone())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| chain.to_string())
    }

    /// Exchanges configured for a chain, in table order
    pub fn exchanges_for(&self, chain: &str) -> Vec<&str> {
        self.get(chain)
            .map(|entry| entry.cex_labels.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Upper-cased label an exchange uses for a canonical chain
    pub fn resolve_label(&self, chain: &str, exchange: &str) -> Option<String> {
        self.get(chain)?
            .cex_labels
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(exchange))
            .map(|(_, label)| label.trim().to_uppercase())
            .filter(|label| !label.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChainConfig {
        ChainConfig::new()
            .with_chain(
                "bsc",
                ChainEntry::new("BNB Chain")
                    .with_label("BINANCE", "bsc")
                    .with_label("GATE", "BSC"),
            )
            .with_chain("Polygon", ChainEntry::default().with_label("BINANCE", "MATIC"))
    }

    #[test]
    fn test_resolve_label_is_exchange_scoped() {
        let chains = sample();
        assert_eq!(chains.resolve_label("bsc", "binance"), Some("BSC".to_string()));
        assert_eq!(chains.resolve_label("BSC", "GATE"), Some("BSC".to_string()));
        assert_eq!(chains.resolve_label("polygon", "BINANCE"), Some("MATIC".to_string()));
        assert_eq!(chains.resolve_label("polygon", "GATE"), None);
        assert_eq!(chains.resolve_label("arbitrum", "BINANCE"), None);
    }

    #[test]
    fn test_display_label_fallback() {
        let chains = sample();
        assert_eq!(chains.display_label("bsc"), "BNB Chain");
        assert_eq!(chains.display_label("polygon"), "polygon");
        assert_eq!(chains.display_label("solana"), "solana");
    }

    #[test]
    fn test_exchanges_for() {
        let chains = sample();
        assert_eq!(chains.exchanges_for("bsc"), vec!["BINANCE", "GATE"]);
        assert!(chains.exchanges_for("solana").is_empty());
    }
}
