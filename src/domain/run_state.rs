//! Run-State Types
//!
//! Scan scopes and the persisted `{ run: YES | NO }` marker per scope.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Scope id of the aggregate cross-chain scan
pub const MULTICHAIN: &str = "multichain";

/// Run-state granularity: a single chain or the aggregate multichain scan
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Multichain,
    /// Chain id, always lower-case
    Chain(String),
}

impl Scope {
    /// Build a chain scope; ids are normalized so scopes compare case-insensitively
    pub fn chain(id: &str) -> Self {
        let id = id.trim().to_lowercase();
        if id == MULTICHAIN {
            Scope::Multichain
        } else {
            Scope::Chain(id)
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Scope::Multichain => MULTICHAIN,
            Scope::Chain(id) => id,
        }
    }

    /// Store key of this scope's run-state (`FILTER_<CHAIN>`)
    pub fn run_state_key(&self) -> String {
        format!("FILTER_{}", self.id().to_uppercase())
    }

    /// Store key of this scope's token catalog (`TOKEN_<CHAIN>`)
    pub fn catalog_key(&self) -> String {
        format!("TOKEN_{}", self.id().to_uppercase())
    }

    /// Inverse of [`Scope::run_state_key`]
    pub fn from_run_state_key(key: &str) -> Option<Self> {
        key.strip_prefix("FILTER_")
            .filter(|rest| !rest.is_empty())
            .map(Scope::chain)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err("scope cannot be empty".to_string());
        }
        Ok(Scope::chain(s))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunFlag {
    #[serde(rename = "YES")]
    Yes,
    #[default]
    #[serde(rename = "NO")]
    No,
}

impl RunFlag {
    pub fn is_running(&self) -> bool {
        matches!(self, RunFlag::Yes)
    }
}

/// Persisted run-state of one scope
///
/// Other fields stored alongside `run` (filters the UI keeps in the same
/// entry) are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    #[serde(default)]
    pub run: RunFlag,
    #[serde(flatten, default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RunState {
    pub fn running() -> Self {
        Self {
            run: RunFlag::Yes,
            ..Self::default()
        }
    }

    pub fn idle() -> Self {
        Self::default()
    }

    pub fn with_run(mut self, run: RunFlag) -> Self {
        self.run = run;
        self
    }

    pub fn is_running(&self) -> bool {
        self.run.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_keys() {
        assert_eq!(Scope::chain("bsc").run_state_key(), "FILTER_BSC");
        assert_eq!(Scope::chain("BSC").catalog_key(), "TOKEN_BSC");
        assert_eq!(Scope::Multichain.run_state_key(), "FILTER_MULTICHAIN");
        assert_eq!(Scope::chain("MultiChain"), Scope::Multichain);
    }

    #[test]
    fn test_scope_from_key() {
        assert_eq!(Scope::from_run_state_key("FILTER_POLYGON"), Some(Scope::chain("polygon")));
        assert_eq!(Scope::from_run_state_key("FILTER_MULTICHAIN"), Some(Scope::Multichain));
        assert_eq!(Scope::from_run_state_key("TOKEN_BSC"), None);
        assert_eq!(Scope::from_run_state_key("FILTER_"), None);
    }

    #[test]
    fn test_scope_case_insensitive_equality() {
        assert_eq!(Scope::chain("Bsc"), Scope::chain("bsc"));
        assert_eq!("ETHEREUM".parse::<Scope>().unwrap(), Scope::chain("ethereum"));
        assert!("  ".parse::<Scope>().is_err());
    }

    #[test]
    fn test_run_state_serialization() {
        let json = serde_json::to_value(RunState::running()).unwrap();
        assert_eq!(json, serde_json::json!({ "run": "YES" }));

        let state: RunState =
            serde_json::from_value(serde_json::json!({ "run": "NO", "minPnl": 2 })).unwrap();
        assert!(!state.is_running());
        assert_eq!(state.extra["minPnl"], 2);

        let empty: RunState = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(empty.run, RunFlag::No);
    }
}
