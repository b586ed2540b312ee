//! Command-line front end for fleet reconciliation, imports and maintenance.

pub mod commands;
pub mod config;

pub use commands::{run, Cli, Command, Completion};
pub use config::{ConfigError, FleetConfig};
