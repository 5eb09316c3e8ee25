pub mod catalog;
pub mod orchestrator;
pub mod retry_fetcher;
pub mod run_state;
pub mod wallet_resolver;
pub mod wallet_update;

pub use catalog::{CatalogError, CatalogRepository, ScannerSettings, SETTINGS_KEY, WALLET_STATUS_KEY};
pub use orchestrator::{
    BatchScanOrchestrator, OrchestratorError, ScanOutcome, ScanSettings, ScanStatus,
};
pub use retry_fetcher::{
    fetch_with_retry, fetch_with_retry_by, fetch_with_retry_until, FetchError, FetchOutcome,
    RetryPolicy,
};
pub use run_state::{RunStateController, RunStateError, RunTicket, MULTICHAIN_LABEL};
pub use wallet_resolver::{MergeMatch, MergeMiss, MergeReport, MissReason};
pub use wallet_update::{update_wallets, WalletUpdateReport};
