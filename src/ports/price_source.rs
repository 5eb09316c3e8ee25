//! Price Source Port
//!
//! One opaque price-fetch capability per exchange. The orchestration layer
//! never looks at exchange payloads, only at the returned [`PriceQuote`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{PriceQuote, TokenRecord};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Request timed out")]
    Timeout,

    #[error("Data parsing error: {0}")]
    ParseError(String),

    #[error("Unsupported pair {symbol_in}/{symbol_out} on {exchange}")]
    Unsupported {
        exchange: String,
        symbol_in: String,
        symbol_out: String,
    },
}

/// Arguments of one price fetch
#[derive(Debug, Clone)]
pub struct PriceRequest<'a> {
    pub token: &'a TokenRecord,
    pub symbol_in: &'a str,
    pub symbol_out: &'a str,
    pub exchange: &'a str,
    /// UI element the result is rendered into
    pub render_target: String,
}

impl<'a> PriceRequest<'a> {
    pub fn for_token(token: &'a TokenRecord, exchange: &'a str) -> Self {
        Self {
            token,
            symbol_in: &token.symbol_in,
            symbol_out: &token.symbol_out,
            exchange,
            render_target: token.render_target(exchange),
        }
    }
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Exchange id this source serves
    fn exchange(&self) -> &str;

    async fn fetch_prices(&self, request: &PriceRequest<'_>) -> Result<PriceQuote, SourceError>;
}

/// Exchange id (upper-case) -> source
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn PriceSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn PriceSource>) {
        self.sources.insert(source.exchange().to_uppercase(), source);
    }

    pub fn with_source(mut self, source: Arc<dyn PriceSource>) -> Self {
        self.register(source);
        self
    }

    pub fn get(&self, exchange: &str) -> Option<&Arc<dyn PriceSource>> {
        self.sources.get(&exchange.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.sources.keys().collect();
        names.sort();
        f.debug_struct("SourceRegistry").field("sources", &names).finish()
    }
}
