//! Wallet Label Resolver
//!
//! Exchanges name chains with their own labels. This pass maps each token's
//! canonical chain to the exchange-scoped label, looks the token up in the
//! wallet capability store and merges the deposit/withdraw flags into
//! `dataCexs`. Prices are never touched. A second pass over an already
//! merged catalog changes nothing.

use crate::domain::{CapabilityLookup, ChainConfig, TokenRecord, WalletCapabilityStore};

/// Why a (token, exchange) pair got no capability flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    /// The chain has no label for this exchange
    NoLabel,
    /// The capability store has nothing for this exchange
    NoExchange,
    /// No record under the resolved label
    NoRecord,
    /// Several distinct records matched
    Ambiguous(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeMatch {
    pub token_id: String,
    pub chain: String,
    pub exchange: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeMiss {
    pub token_id: String,
    pub chain: String,
    pub exchange: String,
    pub reason: MissReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub matched: Vec<MergeMatch>,
    pub missed: Vec<MergeMiss>,
}

impl MergeReport {
    pub fn matched_count(&self) -> usize {
        self.matched.len()
    }

    pub fn missed_count(&self) -> usize {
        self.missed.len()
    }

    pub fn merge(&mut self, other: MergeReport) {
        self.matched.extend(other.matched);
        self.missed.extend(other.missed);
    }
}

/// Merge capability flags into every token of `catalog`.
///
/// Every exchange configured for the token's chain is considered. A token
/// on an unconfigured chain reports `NoLabel` for each exchange it selected.
/// Existing flags are overwritten on a match and left alone otherwise.
pub fn apply(
    store: &WalletCapabilityStore,
    catalog: &mut [TokenRecord],
    chains: &ChainConfig,
) -> MergeReport {
    let mut report = MergeReport::default();

    for token in catalog.iter_mut() {
        let chain = token.chain.trim().to_lowercase();
        let token_key = token.wallet_key();
        let exchanges: Vec<String> = if chains.get(&chain).is_some() {
            chains
                .exchanges_for(&chain)
                .into_iter()
                .map(str::to_uppercase)
                .collect()
        } else {
            token
                .selected_cexs
                .iter()
                .map(|e| e.trim().to_uppercase())
                .filter(|e| !e.is_empty())
                .collect()
        };

        for exchange in exchanges {
            let miss = |reason| MergeMiss {
                token_id: token.id.clone(),
                chain: chain.clone(),
                exchange: exchange.clone(),
                reason,
            };

            let Some(label) = chains.resolve_label(&chain, &exchange) else {
                report.missed.push(miss(MissReason::NoLabel));
                continue;
            };

            let capability = match store.lookup(&exchange, &label, &token_key) {
                CapabilityLookup::Found(capability) => *capability,
                CapabilityLookup::NoExchange => {
                    report.missed.push(miss(MissReason::NoExchange));
                    continue;
                }
                CapabilityLookup::Missing => {
                    report.missed.push(miss(MissReason::NoRecord));
                    continue;
                }
                CapabilityLookup::Ambiguous(n) => {
                    tracing::warn!(
                        "{} records for {} under {}/{}, not applying",
                        n,
                        token_key,
                        exchange,
                        label
                    );
                    report.missed.push(miss(MissReason::Ambiguous(n)));
                    continue;
                }
            };

            report.matched.push(MergeMatch {
                token_id: token.id.clone(),
                chain: chain.clone(),
                exchange: exchange.clone(),
                label,
            });
            token.cex_entry(&exchange).apply_capability(&capability);
        }
    }

    tracing::debug!(
        "Wallet merge: {} matched, {} missed",
        report.matched_count(),
        report.missed_count()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChainEntry, WalletCapability};

    fn chains() -> ChainConfig {
        ChainConfig::new()
            .with_chain(
                "bsc",
                ChainEntry::new("BSC")
                    .with_label("BINANCE", "BSC")
                    .with_label("MEXC", "BEP20"),
            )
            .with_chain("polygon", ChainEntry::new("Polygon").with_label("BINANCE", "MATIC"))
    }

    fn store() -> WalletCapabilityStore {
        let mut store = WalletCapabilityStore::new();
        store.insert("BINANCE", "BSC", "USDT", WalletCapability::new(true, false));
        store.insert("MEXC", "BSC", "USDT", WalletCapability::new(false, false));
        store.insert("MEXC", "BEP20", "USDT", WalletCapability::new(true, true));
        store
    }

    #[test]
    fn test_label_match_sets_flags() {
        let mut catalog =
            vec![TokenRecord::new("t1", "usdt", "ETH", "bsc").with_cexs(["BINANCE"])];

        let report = apply(&store(), &mut catalog, &chains());

        assert_eq!(report.matched_count(), 2);
        assert_eq!(report.matched[0].exchange, "BINANCE");
        assert_eq!(report.matched[0].label, "BSC");
        let data = catalog[0].cex("BINANCE").unwrap();
        assert_eq!(data.deposit_token, Some(true));
        assert_eq!(data.withdraw_token, Some(false));
        assert!(data.price_buy_token.is_none());
    }

    #[test]
    fn test_label_is_exchange_scoped() {
        // MEXC lists BSC under BEP20; the record under "BSC" must not be used
        let mut catalog = vec![TokenRecord::new("t1", "USDT", "ETH", "bsc").with_cexs(["MEXC"])];

        apply(&store(), &mut catalog, &chains());

        let data = catalog[0].cex("MEXC").unwrap();
        assert_eq!(data.deposit_token, Some(true));
        assert_eq!(data.withdraw_token, Some(true));
    }

    #[test]
    fn test_record_under_other_exchange_label_is_a_miss() {
        // Only MEXC's "BSC" record exists; MEXC calls the chain BEP20
        let mut wallets = WalletCapabilityStore::new();
        wallets.insert("MEXC", "BSC", "USDT", WalletCapability::new(true, true));
        let mut catalog = vec![TokenRecord::new("t1", "USDT", "ETH", "bsc").with_cexs(["MEXC"])];

        let report = apply(&wallets, &mut catalog, &chains());

        assert!(catalog[0].cex("MEXC").is_none());
        assert!(report.matched.iter().all(|m| m.exchange != "MEXC"));
        assert!(report.missed.contains(&MergeMiss {
            token_id: "t1".to_string(),
            chain: "bsc".to_string(),
            exchange: "MEXC".to_string(),
            reason: MissReason::NoRecord,
        }));
    }

    #[test]
    fn test_misses_are_reported() {
        let mut catalog = vec![
            TokenRecord::new("t1", "USDT", "ETH", "polygon").with_cexs(["BINANCE"]),
            TokenRecord::new("t2", "USDT", "ETH", "solana").with_cexs(["GATE"]),
            TokenRecord::new("t3", "DOGE", "USDT", "bsc").with_cexs(["BINANCE"]),
        ];

        let report = apply(&store(), &mut catalog, &chains());

        assert!(report.matched.is_empty());
        let reasons: Vec<(&str, &str, &MissReason)> = report
            .missed
            .iter()
            .map(|m| (m.token_id.as_str(), m.exchange.as_str(), &m.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("t1", "BINANCE", &MissReason::NoRecord),
                ("t2", "GATE", &MissReason::NoLabel),
                ("t3", "BINANCE", &MissReason::NoRecord),
                ("t3", "MEXC", &MissReason::NoRecord),
            ]
        );
        assert!(catalog[0].cex("BINANCE").is_none());
    }

    #[test]
    fn test_unknown_exchange() {
        let mut chains = chains();
        chains.insert("bsc", ChainEntry::new("BSC").with_label("KUCOIN", "BEP20"));
        let mut catalog = vec![TokenRecord::new("t1", "USDT", "ETH", "bsc").with_cexs(["KUCOIN"])];

        let report = apply(&store(), &mut catalog, &chains);

        assert_eq!(report.missed[0].reason, MissReason::NoExchange);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut catalog = vec![
            TokenRecord::new("t1", "USDT", "ETH", "bsc").with_cexs(["BINANCE", "MEXC"]),
            TokenRecord::new("t2", "USDT", "ETH", "polygon").with_cexs(["BINANCE"]),
        ];
        catalog[0].cex_entry("BINANCE").price_sell_token = Some(3.5);

        apply(&store(), &mut catalog, &chains());
        let once = catalog.clone();
        apply(&store(), &mut catalog, &chains());

        assert_eq!(catalog, once);
        assert_eq!(catalog[0].cex("BINANCE").unwrap().price_sell_token, Some(3.5));
    }

    #[test]
    fn test_ambiguous_records_not_applied() {
        let mut store = WalletCapabilityStore::new();
        store.insert("BINANCE", "BSC", "USDT", WalletCapability::new(true, true));
        store.insert("BINANCE", "bsc", "USDT", WalletCapability::new(false, false));
        let mut catalog =
            vec![TokenRecord::new("t1", "USDT", "ETH", "bsc").with_cexs(["BINANCE"])];

        let report = apply(&store, &mut catalog, &chains());

        let binance = report.missed.iter().find(|m| m.exchange == "BINANCE").unwrap();
        assert_eq!(binance.reason, MissReason::Ambiguous(2));
        assert!(report.matched.is_empty());
        assert!(catalog[0].cex("BINANCE").is_none());
    }
}
