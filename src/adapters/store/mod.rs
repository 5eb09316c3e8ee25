//! Shared State Store Adapters
//!
//! - `memory`: process-local store shared by cloning (tests, in-process contexts)
//! - `file`: JSON document on disk shared by every process pointed at it

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::InMemoryStateStore;
