//! Subcommand implementations.

pub mod config;
pub mod health;
pub mod info;
pub mod serve;
