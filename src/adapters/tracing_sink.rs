//! Sink that turns UI hooks into tracing events for headless runs

use std::sync::Mutex;

use crate::application::retry_fetcher::FetchOutcome;
use crate::domain::TokenRecord;
use crate::ports::sink::{NotifyLevel, ScanSink};

#[derive(Debug, Default)]
pub struct TracingSink {
    /// Last banner emitted, to skip repeats
    last_banner: Mutex<Option<String>>,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScanSink for TracingSink {
    fn banner(&self, text: &str) {
        let mut last = match self.last_banner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.as_deref() == Some(text) {
            return;
        }
        *last = Some(text.to_string());

        if text.is_empty() {
            tracing::info!("No scans running");
        } else {
            tracing::info!("{}", text);
        }
    }

    fn run_indicator(&self, running: bool) {
        tracing::debug!(running, "Run indicator");
    }

    fn notify(&self, level: NotifyLevel, message: &str) {
        match level {
            NotifyLevel::Success | NotifyLevel::Info => tracing::info!("{}", message),
            NotifyLevel::Warning => tracing::warn!("{}", message),
            NotifyLevel::Error => tracing::error!("{}", message),
        }
    }

    fn token_result(&self, token: &TokenRecord, exchange: &str, outcome: &FetchOutcome) {
        let target = token.render_target(exchange);
        match outcome {
            FetchOutcome::Ok { data, attempts } => tracing::debug!(
                target_id = %target,
                attempts,
                "{}/{} on {}: buy {:.6} sell {:.6}",
                token.symbol_in,
                token.symbol_out,
                exchange,
                data.price_buy_token,
                data.price_sell_token
            ),
            FetchOutcome::Failed { error, attempts, .. } => tracing::debug!(
                target_id = %target,
                attempts,
                "{}/{} on {} failed: {}",
                token.symbol_in,
                token.symbol_out,
                exchange,
                error
            ),
        }
    }

    fn reload_requested(&self) {
        tracing::info!("Context reinitialized after hard stop");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_dedup() {
        let sink = TracingSink::new();
        sink.banner("Scanning: BSC");
        sink.banner("Scanning: BSC");
        assert_eq!(
            sink.last_banner.lock().unwrap().as_deref(),
            Some("Scanning: BSC")
        );
        sink.banner("");
        assert_eq!(sink.last_banner.lock().unwrap().as_deref(), Some(""));
    }
}
