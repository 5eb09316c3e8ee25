//! Spread Scanner - Scan Orchestration Engine Library
//!
//! Walks token catalogs in batches, fetching prices from CEX/DEX sources
//! with bounded retries. Scans are started and stopped per scope, and a
//! stop issued from any execution context sharing the store is honored.
//!
//! # Modules
//!
//! - `domain`: Core types (TokenRecord, Scope, RunState, WalletCapability, ChainConfig)
//! - `ports`: Trait abstractions (SharedStateStore, PriceSource, ScanSink)
//! - `adapters`: External implementations (JSON store, HTTP source, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Run-state controller, orchestrator and use cases

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod config;
pub mod application;
