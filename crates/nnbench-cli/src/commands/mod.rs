//! Subcommands.

pub mod config;
pub mod run;
