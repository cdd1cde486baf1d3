//! Telemetry daemon library
//!
//! Exposes the HTTP API, configuration and task supervision so integration
//! tests and the binary entrypoint can both use them.

pub mod api;
pub mod config;
pub mod supervisor;
