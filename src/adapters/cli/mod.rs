//! CLI Adapter
//!
//! Command-line interface for the spread scanner.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{
    CliApp, Command, ForceStopCmd, ImportCmd, ScanCmd, StatusCmd, StopCmd, WalletsCmd,
};
