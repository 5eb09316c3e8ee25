//! Ports Layer - Trait definitions for external dependencies
//!
//! Following hexagonal architecture, these traits abstract:
//! - The shared key-value store every execution context reads and writes
//! - Price sources (one per exchange)
//! - The UI / notification sink

pub mod mocks;
pub mod price_source;
pub mod sink;
pub mod state_store;

// Re-export main traits and types
pub use price_source::{PriceRequest, PriceSource, SourceError, SourceRegistry};
pub use sink::{NotifyLevel, ScanSink};
pub use state_store::{get_or, put, SharedStateStore, StoreChange, StoreError};
