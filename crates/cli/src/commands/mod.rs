//! Subcommand implementations

pub mod devices;
pub mod health;
pub mod settings;
