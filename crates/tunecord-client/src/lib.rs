//! CLI, config file, stdin feed and runtime wiring
//!
//! This crate provides the `tunecord` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod feed;
pub mod signals;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
