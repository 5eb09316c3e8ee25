//! Domain Layer - Core types of the spread scanner
//!
//! Pure data and rules with no I/O. Persistence, price sources and the UI
//! are reached through the ports layer.
//!
//! - `token`: token catalog records and per-exchange price/capability data
//! - `wallet`: exchange wallet capability records
//! - `chain`: canonical chains and their per-exchange labels
//! - `run_state`: scan scopes and their persisted run flag

pub mod chain;
pub mod run_state;
pub mod token;
pub mod wallet;

pub use chain::{ChainConfig, ChainEntry};
pub use run_state::{RunFlag, RunState, Scope, MULTICHAIN};
pub use token::{CexData, PriceQuote, TokenRecord};
pub use wallet::{CapabilityLookup, WalletCapability, WalletCapabilityStore};
