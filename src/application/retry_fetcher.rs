//! Retry Fetcher
//!
//! Bounded retry around one price source with a fixed inter-attempt delay.
//! Every failure mode is reported through [`FetchOutcome`]; nothing here
//! returns an error or panics on bad input.

use std::future::{self, Future};
use std::time::Duration;

use thiserror::Error;

use crate::domain::PriceQuote;
use crate::ports::price_source::{PriceRequest, PriceSource, SourceError};

/// Default number of attempts per (token, source)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between attempts in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 400;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Invalid quote: {0}")]
    InvalidQuote(String),

    #[error("Invalid retry policy: {0}")]
    InvalidPolicy(String),

    #[error("Cancelled after {0} attempts")]
    Cancelled(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Result<Self, FetchError> {
        if max_attempts == 0 {
            return Err(FetchError::InvalidPolicy(
                "max_attempts must be > 0".to_string(),
            ));
        }
        Ok(Self {
            max_attempts,
            delay,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Result of a retried fetch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Ok {
        data: PriceQuote,
        attempts: u32,
    },
    Failed {
        /// Last quote the source returned, if any
        data: Option<PriceQuote>,
        error: FetchError,
        attempts: u32,
    },
}

impl FetchOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, FetchOutcome::Ok { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            FetchOutcome::Ok { attempts, .. } | FetchOutcome::Failed { attempts, .. } => *attempts,
        }
    }

    pub fn quote(&self) -> Option<&PriceQuote> {
        match self {
            FetchOutcome::Ok { data, .. } => Some(data),
            FetchOutcome::Failed { data, .. } => data.as_ref(),
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            FetchOutcome::Ok { .. } => None,
            FetchOutcome::Failed { error, .. } => Some(error),
        }
    }
}

/// Fetch with the default validity rule (four finite, positive prices)
pub async fn fetch_with_retry(
    source: &dyn PriceSource,
    request: &PriceRequest<'_>,
    policy: &RetryPolicy,
) -> FetchOutcome {
    retry_loop(source, request, policy, PriceQuote::is_valid, future::pending()).await
}

/// Fetch with a caller-supplied validity predicate
pub async fn fetch_with_retry_by<F>(
    source: &dyn PriceSource,
    request: &PriceRequest<'_>,
    policy: &RetryPolicy,
    is_valid: F,
) -> FetchOutcome
where
    F: Fn(&PriceQuote) -> bool,
{
    retry_loop(source, request, policy, is_valid, future::pending()).await
}

/// Fetch that gives up once `cancelled` resolves.
///
/// Cancellation is honored between attempts; an attempt already in flight
/// is allowed to finish.
pub async fn fetch_with_retry_until<C>(
    source: &dyn PriceSource,
    request: &PriceRequest<'_>,
    policy: &RetryPolicy,
    cancelled: C,
) -> FetchOutcome
where
    C: Future<Output = ()>,
{
    retry_loop(source, request, policy, PriceQuote::is_valid, cancelled).await
}

async fn retry_loop<F, C>(
    source: &dyn PriceSource,
    request: &PriceRequest<'_>,
    policy: &RetryPolicy,
    is_valid: F,
    cancelled: C,
) -> FetchOutcome
where
    F: Fn(&PriceQuote) -> bool,
    C: Future<Output = ()>,
{
    tokio::pin!(cancelled);

    let max_attempts = policy.max_attempts();
    let mut last_data: Option<PriceQuote> = None;
    let mut last_error: Option<FetchError> = None;

    for attempt in 1..=max_attempts {
        match source.fetch_prices(request).await {
            Ok(quote) if is_valid(&quote) => {
                return FetchOutcome::Ok {
                    data: quote,
                    attempts: attempt,
                };
            }
            Ok(quote) => {
                tracing::debug!(
                    "Invalid quote for {} on {} (attempt {}/{})",
                    request.token.id,
                    request.exchange,
                    attempt,
                    max_attempts
                );
                last_data = Some(quote);
            }
            Err(e) => {
                tracing::debug!(
                    "Fetch failed for {} on {} (attempt {}/{}): {}",
                    request.token.id,
                    request.exchange,
                    attempt,
                    max_attempts,
                    e
                );
                last_error = Some(FetchError::Source(e));
            }
        }

        // Don't sleep after the last attempt
        if attempt == max_attempts {
            break;
        }

        let stop = tokio::select! {
            biased;
            _ = &mut cancelled => true,
            _ = tokio::time::sleep(policy.delay()) => false,
        };
        if stop {
            tracing::debug!(
                "Retries for {} on {} cancelled after attempt {}",
                request.token.id,
                request.exchange,
                attempt
            );
            return FetchOutcome::Failed {
                data: last_data,
                error: FetchError::Cancelled(attempt),
                attempts: attempt,
            };
        }
    }

    let error = last_error.unwrap_or_else(|| {
        FetchError::InvalidQuote(format!(
            "no valid quote after {} attempts",
            max_attempts
        ))
    });

    FetchOutcome::Failed {
        data: last_data,
        error,
        attempts: max_attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TokenRecord;
    use crate::ports::mocks::{MockPriceSource, MockStep};

    fn token() -> TokenRecord {
        TokenRecord::new("t1", "USDT", "ETH", "bsc")
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1)).unwrap()
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_millis(400));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(matches!(
            RetryPolicy::new(0, Duration::ZERO),
            Err(FetchError::InvalidPolicy(_))
        ));
    }

    #[tokio::test]
    async fn test_always_invalid_uses_every_attempt() {
        for n in 1..=4 {
            let source = MockPriceSource::new("BINANCE").with_default(MockStep::invalid());
            let token = token();
            let request = PriceRequest::for_token(&token, "BINANCE");

            let outcome = fetch_with_retry(&source, &request, &fast_policy(n)).await;

            assert!(!outcome.is_ok());
            assert_eq!(source.call_count(), n as usize);
            assert_eq!(outcome.attempts(), n);
            assert!(matches!(outcome.error(), Some(FetchError::InvalidQuote(_))));
            assert!(outcome.quote().is_some());
        }
    }

    #[tokio::test]
    async fn test_valid_on_attempt_k_stops_early() {
        for k in 1..=3usize {
            let mut steps = vec![MockStep::invalid(); k - 1];
            steps.push(MockStep::valid());
            let source = MockPriceSource::new("BINANCE").with_script("t1", steps);
            let token = token();
            let request = PriceRequest::for_token(&token, "BINANCE");

            let outcome = fetch_with_retry(&source, &request, &fast_policy(3)).await;

            assert!(outcome.is_ok());
            assert_eq!(source.call_count(), k);
            assert_eq!(outcome.attempts(), k as u32);
        }
    }

    #[tokio::test]
    async fn test_source_errors_are_absorbed() {
        let source = MockPriceSource::new("BINANCE").with_default(MockStep::error());
        let token = token();
        let request = PriceRequest::for_token(&token, "BINANCE");

        let outcome = fetch_with_retry(&source, &request, &fast_policy(2)).await;

        match outcome {
            FetchOutcome::Failed { data, error, attempts } => {
                assert!(data.is_none());
                assert_eq!(error, FetchError::Source(SourceError::Timeout));
                assert_eq!(attempts, 2);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_last_error_wins_over_invalid_data() {
        let source = MockPriceSource::new("BINANCE")
            .with_script("t1", vec![MockStep::invalid(), MockStep::error()]);
        let token = token();
        let request = PriceRequest::for_token(&token, "BINANCE");

        let outcome = fetch_with_retry(&source, &request, &fast_policy(2)).await;

        assert!(matches!(outcome.error(), Some(FetchError::Source(_))));
        // the invalid quote from attempt 1 is still reported
        assert!(outcome.quote().is_some());
    }

    #[tokio::test]
    async fn test_custom_predicate() {
        let source = MockPriceSource::new("BINANCE").with_default(MockStep::valid());
        let token = token();
        let request = PriceRequest::for_token(&token, "BINANCE");

        let outcome =
            fetch_with_retry_by(&source, &request, &fast_policy(2), |q| q.price_buy_token > 10.0)
                .await;

        assert!(!outcome.is_ok());
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cancel_ends_retries_early() {
        let source = MockPriceSource::new("BINANCE").with_default(MockStep::error());
        let token = token();
        let request = PriceRequest::for_token(&token, "BINANCE");
        let policy = RetryPolicy::new(5, Duration::from_secs(30)).unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            fetch_with_retry_until(&source, &request, &policy, async {}),
        )
        .await
        .expect("cancelled fetch should not wait out the retry delay");

        assert_eq!(source.call_count(), 1);
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(outcome.error(), Some(&FetchError::Cancelled(1)));
    }

    #[tokio::test]
    async fn test_cancel_after_success_is_ignored() {
        let source = MockPriceSource::new("BINANCE").with_default(MockStep::valid());
        let token = token();
        let request = PriceRequest::for_token(&token, "BINANCE");

        let outcome =
            fetch_with_retry_until(&source, &request, &fast_policy(3), async {}).await;

        assert!(outcome.is_ok());
        assert_eq!(source.call_count(), 1);
    }
}
