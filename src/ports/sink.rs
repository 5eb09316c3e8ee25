//! UI / Notification Sink Port
//!
//! The engine calls these hooks; rendering belongs to the host.

use crate::application::retry_fetcher::FetchOutcome;
use crate::domain::TokenRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Success,
    Info,
    Warning,
    Error,
}

pub trait ScanSink: Send + Sync {
    /// Running-chains banner text (empty when nothing runs)
    fn banner(&self, text: &str);

    /// Toolbar indicator: is any scope of this context running
    fn run_indicator(&self, running: bool);

    fn notify(&self, level: NotifyLevel, message: &str);

    /// Result of one (token, exchange) fetch
    fn token_result(&self, _token: &TokenRecord, _exchange: &str, _outcome: &FetchOutcome) {}

    /// The context was reinitialized by a hard stop
    fn reload_requested(&self) {}
}
