//! Exchange Wallet Capabilities
//!
//! Deposit/withdraw capability records produced by the "update wallets"
//! action, keyed `exchange -> chain label -> token key`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Capability flags for one (exchange, chain label, token)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletCapability {
    pub deposit_enabled: bool,
    pub withdraw_enabled: bool,
    #[serde(default)]
    pub deposit_pair_enabled: bool,
    #[serde(default)]
    pub withdraw_pair_enabled: bool,
}

impl WalletCapability {
    pub fn new(deposit_enabled: bool, withdraw_enabled: bool) -> Self {
        Self {
            deposit_enabled,
            withdraw_enabled,
            deposit_pair_enabled: false,
            withdraw_pair_enabled: false,
        }
    }

    pub fn with_pair(mut self, deposit_pair_enabled: bool, withdraw_pair_enabled: bool) -> Self {
        self.deposit_pair_enabled = deposit_pair_enabled;
        self.withdraw_pair_enabled = withdraw_pair_enabled;
        self
    }
}

/// Wallet capability store as persisted by the update action.
///
/// Labels and token keys are kept exactly as the exchange reported them;
/// normalization happens at lookup time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletCapabilityStore {
    exchanges: BTreeMap<String, BTreeMap<String, BTreeMap<String, WalletCapability>>>,
}

/// Result of looking up one token under one exchange and label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityLookup<'a> {
    Found(&'a WalletCapability),
    /// The exchange has no records at all
    NoExchange,
    /// No label/token pair matched
    Missing,
    /// More than one distinct record matched after normalization
    Ambiguous(usize),
}

impl WalletCapabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        exchange: impl Into<String>,
        label: impl Into<String>,
        token_key: impl Into<String>,
        capability: WalletCapability,
    ) {
        self.exchanges
            .entry(exchange.into())
            .or_default()
            .entry(label.into())
            .or_default()
            .insert(token_key.into(), capability);
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.len()
    }

    /// Look up a token under an exchange-scoped label.
    ///
    /// Exchange, label and token key all match case-insensitively. Two
    /// spellings of the same label (e.g. `bsc` and `BSC`) that both carry the
    /// token with different flags are reported as ambiguous.
    pub fn lookup(&self, exchange: &str, label: &str, token_key: &str) -> CapabilityLookup<'_> {
        let labels = self
            .exchanges
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(exchange))
            .flat_map(|(_, labels)| labels.iter())
            .collect::<Vec<_>>();

        if labels.is_empty() {
            return CapabilityLookup::NoExchange;
        }

        let mut hits: Vec<&WalletCapability> = Vec::new();
        for (record_label, tokens) in labels {
            if !record_label.trim().eq_ignore_ascii_case(label) {
                continue;
            }
            for (key, capability) in tokens {
                if key.trim().eq_ignore_ascii_case(token_key) && !hits.contains(&capability) {
                    hits.push(capability);
                }
            }
        }

        match hits.len() {
            0 => CapabilityLookup::Missing,
            1 => CapabilityLookup::Found(hits[0]),
            n => CapabilityLookup::Ambiguous(n),
        }
    }
}
