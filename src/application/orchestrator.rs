//! Batch Scan Orchestrator
//!
//! Walks a token catalog in batches, fetching prices per (token, exchange)
//! through the retry fetcher. The run-state controller gates the loop: it is
//! consulted before every token, and a stop from any context ends the pass
//! at that checkpoint. Fetches within a scope are strictly sequential.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;

use crate::application::retry_fetcher::{fetch_with_retry_until, FetchError, FetchOutcome, RetryPolicy};
use crate::application::run_state::{RunStateController, RunStateError, RunTicket};
use crate::domain::{Scope, TokenRecord};
use crate::ports::price_source::{PriceRequest, SourceRegistry};
use crate::ports::sink::{NotifyLevel, ScanSink};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No price sources configured for scope {0}")]
    NoSources(String),

    #[error(transparent)]
    RunState(#[from] RunStateError),
}

/// Per-scope scan pacing and source selection
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Tokens per batch
    pub batch_size: usize,
    /// Pause between batches
    pub batch_delay: Duration,
    /// Pause between two source dispatches
    pub dispatch_delay: Duration,
    /// Exchanges to query, in dispatch order
    pub exchanges: Vec<String>,
    pub retry: RetryPolicy,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay: Duration::from_millis(1000),
            dispatch_delay: Duration::from_millis(200),
            exchanges: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Completed,
    Cancelled,
}

/// Scope-level result of one pass
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub scope: Scope,
    pub status: ScanStatus,
    pub tokens_total: usize,
    pub tokens_processed: usize,
    pub fetch_ok: usize,
    pub fetch_failed: usize,
    pub elapsed: Duration,
}

impl ScanOutcome {
    pub fn summary(&self) -> String {
        let status = match self.status {
            ScanStatus::Completed => "completed",
            ScanStatus::Cancelled => "cancelled",
        };
        format!(
            "Scan {} for {}: {}/{} tokens, {} fetched, {} failed in {:.1}s",
            status,
            self.scope,
            self.tokens_processed,
            self.tokens_total,
            self.fetch_ok,
            self.fetch_failed,
            self.elapsed.as_secs_f64()
        )
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct TokenTally {
    ok: usize,
    failed: usize,
}

pub struct BatchScanOrchestrator {
    controller: Arc<RunStateController>,
    sources: SourceRegistry,
    sink: Arc<dyn ScanSink>,
}

impl BatchScanOrchestrator {
    pub fn new(
        controller: Arc<RunStateController>,
        sources: SourceRegistry,
        sink: Arc<dyn ScanSink>,
    ) -> Self {
        Self {
            controller,
            sources,
            sink,
        }
    }

    pub fn controller(&self) -> &Arc<RunStateController> {
        &self.controller
    }

    /// Run one pass over `tokens` for `scope`.
    ///
    /// Only a rejected start is an error. Per-token failures are absorbed
    /// and a stop ends the pass with [`ScanStatus::Cancelled`].
    pub async fn run(
        &self,
        scope: &Scope,
        tokens: &mut [TokenRecord],
        settings: &ScanSettings,
    ) -> Result<ScanOutcome, OrchestratorError> {
        if let Err(e) = self.validate(scope, settings) {
            self.sink.notify(NotifyLevel::Error, &e.to_string());
            return Err(e);
        }

        let ticket = match self.controller.start(scope).await {
            Ok(ticket) => ticket,
            Err(e) => {
                self.sink.notify(NotifyLevel::Error, &e.to_string());
                return Err(e.into());
            }
        };

        tracing::info!(
            "Scanning {} tokens for {} - batch size: {}, exchanges: {:?}",
            tokens.len(),
            scope,
            settings.batch_size,
            settings.exchanges
        );

        let started = Instant::now();
        let tokens_total = tokens.len();
        let mut tokens_processed = 0;
        let mut tally = TokenTally::default();
        let mut status = ScanStatus::Completed;

        'batches: for (index, batch) in tokens.chunks_mut(settings.batch_size).enumerate() {
            if index > 0 && !self.pause(&ticket, settings.batch_delay).await {
                status = ScanStatus::Cancelled;
                break;
            }

            tracing::debug!("Batch {} of {} ({} tokens)", index + 1, scope, batch.len());

            for token in batch.iter_mut() {
                if !self.controller.is_running(&ticket).await {
                    status = ScanStatus::Cancelled;
                    break 'batches;
                }

                let result = self.scan_token(&ticket, token, settings).await;
                tally.ok += result.ok;
                tally.failed += result.failed;
                tokens_processed += 1;
            }
        }

        self.controller.finish(&ticket).await;

        let outcome = ScanOutcome {
            scope: scope.clone(),
            status,
            tokens_total,
            tokens_processed,
            fetch_ok: tally.ok,
            fetch_failed: tally.failed,
            elapsed: started.elapsed(),
        };

        let summary = outcome.summary();
        tracing::info!("{}", summary);
        let level = match outcome.status {
            ScanStatus::Completed if outcome.fetch_failed == 0 => NotifyLevel::Success,
            ScanStatus::Completed => NotifyLevel::Warning,
            ScanStatus::Cancelled => NotifyLevel::Info,
        };
        self.sink.notify(level, &summary);

        Ok(outcome)
    }

    fn validate(&self, scope: &Scope, settings: &ScanSettings) -> Result<(), OrchestratorError> {
        if settings.batch_size == 0 {
            return Err(OrchestratorError::ConfigError(
                "batch_size must be > 0".to_string(),
            ));
        }

        let has_source = settings
            .exchanges
            .iter()
            .any(|exchange| self.sources.get(exchange).is_some());
        if !has_source {
            return Err(OrchestratorError::NoSources(scope.to_string()));
        }

        Ok(())
    }

    /// Query every selected exchange for one token, in configured order
    async fn scan_token(
        &self,
        ticket: &RunTicket,
        token: &mut TokenRecord,
        settings: &ScanSettings,
    ) -> TokenTally {
        let mut tally = TokenTally::default();
        let mut dispatched = 0usize;

        for exchange in &settings.exchanges {
            if !token.scans_on(exchange) {
                continue;
            }
            let Some(source) = self.sources.get(exchange) else {
                continue;
            };

            if dispatched > 0 && !self.pause(ticket, settings.dispatch_delay).await {
                break;
            }
            dispatched += 1;

            let outcome = {
                let request = PriceRequest::for_token(token, exchange);
                fetch_with_retry_until(source.as_ref(), &request, &settings.retry, ticket.cancelled())
                    .await
            };

            match &outcome {
                FetchOutcome::Ok { data, .. } => {
                    let now = Utc::now();
                    token.cex_entry(exchange).apply_quote(data, now);
                    token.updated_at = Some(now);
                    tally.ok += 1;
                }
                FetchOutcome::Failed {
                    error: FetchError::Cancelled(_),
                    ..
                } => {
                    tracing::debug!(
                        "Fetch of {} on {} cut short by stop",
                        token.id,
                        exchange
                    );
                    tally.failed += 1;
                }
                FetchOutcome::Failed {
                    error, attempts, ..
                } => {
                    tracing::warn!(
                        "Skipping {} {}/{} on {} after {} attempts: {}",
                        token.chain,
                        token.symbol_in,
                        token.symbol_out,
                        exchange,
                        attempts,
                        error
                    );
                    tally.failed += 1;
                }
            }

            self.sink.token_result(token, exchange, &outcome);
        }

        tally
    }

    /// Sleep unless cancelled first; returns whether to keep going
    async fn pause(&self, ticket: &RunTicket, delay: Duration) -> bool {
        if ticket.is_cancelled() {
            return false;
        }
        if delay.is_zero() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = ticket.cancelled() => false,
        }
    }
}
