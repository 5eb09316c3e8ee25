//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Store: in-memory and JSON-file shared state stores
//! - HTTP source: price gateway client per exchange
//! - Tracing sink: UI hooks rendered as log events
//! - CLI: Command-line interface definitions

pub mod cli;
pub mod http_source;
pub mod store;
pub mod tracing_sink;

pub use cli::CliApp;
pub use http_source::{HttpPriceSource, HttpSourceConfig, HttpSourceError};
pub use store::{InMemoryStateStore, JsonFileStore};
pub use tracing_sink::TracingSink;
