//! Token Catalog Records
//!
//! One record per tradable pair per chain. Per-exchange price and wallet
//! capability data live in `dataCexs`, keyed by exchange id.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::wallet::WalletCapability;

/// Quote returned by a price source for one (token, exchange) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    /// Price to buy the token on the exchange
    pub price_buy_token: f64,
    /// Price to sell the token on the exchange
    pub price_sell_token: f64,
    /// Price to buy the pair (output) token
    pub price_buy_pair: f64,
    /// Price to sell the pair (output) token
    pub price_sell_pair: f64,
    /// Any additional fields the source reports (volumes, depth, ...)
    #[serde(flatten, default)]
    pub extra: Map<String, Value>,
}

impl PriceQuote {
    pub fn new(
        price_buy_token: f64,
        price_sell_token: f64,
        price_buy_pair: f64,
        price_sell_pair: f64,
    ) -> Self {
        Self {
            price_buy_token,
            price_sell_token,
            price_buy_pair,
            price_sell_pair,
            extra: Map::new(),
        }
    }

    /// All four prices must be finite and strictly positive
    pub fn is_valid(&self) -> bool {
        [
            self.price_buy_token,
            self.price_sell_token,
            self.price_buy_pair,
            self.price_sell_pair,
        ]
        .iter()
        .all(|p| p.is_finite() && *p > 0.0)
    }
}

/// Per-exchange sub-record of a token (`dataCexs[exchange]`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CexData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_buy_token: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_sell_token: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_buy_pair: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_sell_pair: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_token: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdraw_token: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_pair: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdraw_pair: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CexData {
    /// Overwrite the price fields only; capability fields are left alone
    pub fn apply_quote(&mut self, quote: &PriceQuote, at: DateTime<Utc>) {
        self.price_buy_token = Some(quote.price_buy_token);
        self.price_sell_token = Some(quote.price_sell_token);
        self.price_buy_pair = Some(quote.price_buy_pair);
        self.price_sell_pair = Some(quote.price_sell_pair);
        self.updated_at = Some(at);
    }

    /// Overwrite the capability fields only; prices are left alone
    pub fn apply_capability(&mut self, capability: &WalletCapability) {
        self.deposit_token = Some(capability.deposit_enabled);
        self.withdraw_token = Some(capability.withdraw_enabled);
        self.deposit_pair = Some(capability.deposit_pair_enabled);
        self.withdraw_pair = Some(capability.withdraw_pair_enabled);
    }

    /// Take the price fields of `other` when they are newer than ours
    pub fn merge_prices(&mut self, other: &CexData) {
        if !other.has_prices() || other.updated_at <= self.updated_at {
            return;
        }
        self.price_buy_token = other.price_buy_token;
        self.price_sell_token = other.price_sell_token;
        self.price_buy_pair = other.price_buy_pair;
        self.price_sell_pair = other.price_sell_pair;
        self.updated_at = other.updated_at;
    }

    pub fn has_prices(&self) -> bool {
        self.price_buy_token.is_some()
            && self.price_sell_token.is_some()
            && self.price_buy_pair.is_some()
            && self.price_sell_pair.is_some()
    }
}

/// A tradable pair on one chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub id: String,
    pub symbol_in: String,
    pub symbol_out: String,
    pub chain: String,
    /// Exchanges this pair is scanned on
    #[serde(default, rename = "selectedCexs")]
    pub selected_cexs: Vec<String>,
    #[serde(default, rename = "dataCexs")]
    pub data_cexs: BTreeMap<String, CexData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Derived fields owned by downstream consumers (profit, spreads, ...)
    #[serde(flatten, default)]
    pub derived: Map<String, Value>,
}

impl TokenRecord {
    pub fn new(
        id: impl Into<String>,
        symbol_in: impl Into<String>,
        symbol_out: impl Into<String>,
        chain: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            symbol_in: symbol_in.into(),
            symbol_out: symbol_out.into(),
            chain: chain.into(),
            selected_cexs: Vec::new(),
            data_cexs: BTreeMap::new(),
            updated_at: None,
            derived: Map::new(),
        }
    }

    pub fn with_cexs<I, S>(mut self, cexs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_cexs = cexs.into_iter().map(Into::into).collect();
        self
    }

    /// Key used to look the token up in the wallet capability store
    pub fn wallet_key(&self) -> String {
        self.symbol_in.trim().to_uppercase()
    }

    pub fn scans_on(&self, exchange: &str) -> bool {
        self.selected_cexs
            .iter()
            .any(|c| c.eq_ignore_ascii_case(exchange))
    }

    /// Element id the UI renders this (token, exchange) cell into
    pub fn render_target(&self, exchange: &str) -> String {
        format!(
            "{}_{}_{}",
            self.chain.to_lowercase(),
            exchange.to_uppercase(),
            self.id
        )
    }

    /// Mutable `dataCexs` entry for an exchange, created empty when absent
    pub fn cex_entry(&mut self, exchange: &str) -> &mut CexData {
        self.data_cexs.entry(exchange.to_uppercase()).or_default()
    }

    pub fn cex(&self, exchange: &str) -> Option<&CexData> {
        self.data_cexs.get(&exchange.to_uppercase())
    }
}
