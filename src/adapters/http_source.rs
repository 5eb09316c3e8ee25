//! HTTP Price Source
//!
//! Client for a JSON price gateway that fronts one exchange. The gateway
//! answers `GET {base_url}/prices` with the generic four-price quote.
//! Retries are left to the retry fetcher, so every request is sent once.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::domain::PriceQuote;
use crate::ports::price_source::{PriceRequest, PriceSource, SourceError};

#[derive(Debug, Error)]
pub enum HttpSourceError {
    #[error("Failed to create HTTP client: {0}")]
    ClientError(#[from] reqwest::Error),

    #[error("Invalid source configuration: {0}")]
    ConfigError(String),
}

/// Price gateway configuration for one exchange
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// Exchange id this source serves (e.g. `BINANCE`)
    pub exchange: String,
    /// Gateway base URL
    pub base_url: String,
    /// Optional API key sent as `x-api-key`
    pub api_key: Option<String>,
    /// Request timeout
    pub timeout: Duration,
}

impl HttpSourceConfig {
    pub fn new(exchange: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpPriceSource {
    config: HttpSourceConfig,
    http: Client,
}

impl HttpPriceSource {
    pub fn new(mut config: HttpSourceConfig) -> Result<Self, HttpSourceError> {
        config.exchange = config.exchange.trim().to_uppercase();
        if config.exchange.is_empty() {
            return Err(HttpSourceError::ConfigError("exchange is empty".to_string()));
        }
        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(HttpSourceError::ConfigError(format!(
                "base_url for {} must be http(s): {}",
                config.exchange, config.base_url
            )));
        }
        config.base_url = config.base_url.trim_end_matches('/').to_string();

        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn prices_url(&self) -> String {
        format!("{}/prices", self.config.base_url)
    }
}

/// Map a non-success gateway status onto the source error taxonomy
fn status_error(status: StatusCode, body: &str) -> SourceError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => SourceError::RateLimited,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => SourceError::Timeout,
        _ => SourceError::HttpError(format!("status {}: {}", status, body.trim())),
    }
}

fn transport_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout
    } else if e.is_decode() {
        SourceError::ParseError(e.to_string())
    } else {
        SourceError::HttpError(e.to_string())
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    fn exchange(&self) -> &str {
        &self.config.exchange
    }

    async fn fetch_prices(&self, request: &PriceRequest<'_>) -> Result<PriceQuote, SourceError> {
        let mut req = self.http.get(self.prices_url()).query(&[
            ("exchange", request.exchange),
            ("chain", request.token.chain.as_str()),
            ("symbolIn", request.symbol_in),
            ("symbolOut", request.symbol_out),
            ("target", request.render_target.as_str()),
        ]);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("x-api-key", api_key);
        }

        let response = req.send().await.map_err(transport_error)?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::Unsupported {
                exchange: request.exchange.to_string(),
                symbol_in: request.symbol_in.to_string(),
                symbol_out: request.symbol_out.to_string(),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        response.json::<PriceQuote>().await.map_err(transport_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_creation() {
        let source =
            HttpPriceSource::new(HttpSourceConfig::new(" binance ", "http://localhost:8080/"))
                .unwrap();
        assert_eq!(source.exchange(), "BINANCE");
        assert_eq!(source.base_url(), "http://localhost:8080");
        assert_eq!(source.prices_url(), "http://localhost:8080/prices");
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            HttpPriceSource::new(HttpSourceConfig::new("", "http://localhost")),
            Err(HttpSourceError::ConfigError(_))
        ));
        assert!(matches!(
            HttpPriceSource::new(HttpSourceConfig::new("GATE", "localhost:8080")),
            Err(HttpSourceError::ConfigError(_))
        ));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            SourceError::RateLimited
        );
        assert_eq!(status_error(StatusCode::GATEWAY_TIMEOUT, ""), SourceError::Timeout);
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY, " upstream down\n"),
            SourceError::HttpError("status 502 Bad Gateway: upstream down".to_string())
        );
    }

    #[test]
    fn test_gateway_payload() {
        let body = r#"{
            "priceBuyToken": 1.0,
            "priceSellToken": 1.01,
            "priceBuyPair": 2500.0,
            "priceSellPair": 2501.5,
            "volume": 120000
        }"#;
        let quote: PriceQuote = serde_json::from_str(body).unwrap();
        assert!(quote.is_valid());
        assert_eq!(quote.extra["volume"], 120000);
    }
}
