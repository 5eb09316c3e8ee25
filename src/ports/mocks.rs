use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::application::retry_fetcher::FetchOutcome;
use crate::domain::{PriceQuote, TokenRecord};
use crate::ports::price_source::{PriceRequest, PriceSource, SourceError};
use crate::ports::sink::{NotifyLevel, ScanSink};

/// One scripted response of a [`MockPriceSource`]
#[derive(Debug, Clone)]
pub enum MockStep {
    Quote(PriceQuote),
    Error(SourceError),
}

impl MockStep {
    pub fn valid() -> Self {
        MockStep::Quote(PriceQuote::new(1.0, 1.01, 2.0, 2.02))
    }

    pub fn invalid() -> Self {
        MockStep::Quote(PriceQuote::new(0.0, 1.01, 2.0, 2.02))
    }

    pub fn error() -> Self {
        MockStep::Error(SourceError::Timeout)
    }
}

/// Mock price source that records calls and replays scripted responses.
///
/// Scripts are per token id; once a script runs out its last step repeats.
/// Tokens without a script get the default step.
#[derive(Debug)]
pub struct MockPriceSource {
    exchange: String,
    calls: Arc<Mutex<Vec<String>>>,
    scripts: Arc<Mutex<HashMap<String, Vec<MockStep>>>>,
    default_step: MockStep,
}

impl MockPriceSource {
    pub fn new(exchange: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            calls: Arc::new(Mutex::new(Vec::new())),
            scripts: Arc::new(Mutex::new(HashMap::new())),
            default_step: MockStep::valid(),
        }
    }

    /// Builder method to script the responses for a token id
    pub fn with_script(self, token_id: &str, steps: Vec<MockStep>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(token_id.to_string(), steps);
        self
    }

    /// Builder method to set the response for unscripted tokens
    pub fn with_default(mut self, step: MockStep) -> Self {
        self.default_step = step;
        self
    }

    /// Token ids of all recorded calls, in order
    pub fn get_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_step(&self, token_id: &str) -> MockStep {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(token_id) {
            Some(steps) if steps.len() > 1 => steps.remove(0),
            Some(steps) if steps.len() == 1 => steps[0].clone(),
            _ => self.default_step.clone(),
        }
    }
}

#[async_trait]
impl PriceSource for MockPriceSource {
    fn exchange(&self) -> &str {
        &self.exchange
    }

    async fn fetch_prices(&self, request: &PriceRequest<'_>) -> Result<PriceQuote, SourceError> {
        self.calls.lock().unwrap().push(request.token.id.clone());
        match self.next_step(&request.token.id) {
            MockStep::Quote(quote) => Ok(quote),
            MockStep::Error(e) => Err(e),
        }
    }
}

/// Everything a [`RecordingSink`] saw
#[derive(Debug, Default, Clone)]
pub struct SinkRecord {
    pub banners: Vec<String>,
    pub indicators: Vec<bool>,
    pub notifications: Vec<(NotifyLevel, String)>,
    /// (token id, exchange, ok)
    pub results: Vec<(String, String, bool)>,
    pub reloads: usize,
}

/// Sink that records every call for assertions
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    record: Arc<Mutex<SinkRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SinkRecord {
        self.record.lock().unwrap().clone()
    }

    pub fn last_banner(&self) -> Option<String> {
        self.record.lock().unwrap().banners.last().cloned()
    }

    pub fn last_indicator(&self) -> Option<bool> {
        self.record.lock().unwrap().indicators.last().copied()
    }
}

impl ScanSink for RecordingSink {
    fn banner(&self, text: &str) {
        self.record.lock().unwrap().banners.push(text.to_string());
    }

    fn run_indicator(&self, running: bool) {
        self.record.lock().unwrap().indicators.push(running);
    }

    fn notify(&self, level: NotifyLevel, message: &str) {
        self.record
            .lock()
            .unwrap()
            .notifications
            .push((level, message.to_string()));
    }

    fn token_result(&self, token: &TokenRecord, exchange: &str, outcome: &FetchOutcome) {
        self.record.lock().unwrap().results.push((
            token.id.clone(),
            exchange.to_string(),
            outcome.is_ok(),
        ));
    }

    fn reload_requested(&self) {
        self.record.lock().unwrap().reloads += 1;
    }
}
