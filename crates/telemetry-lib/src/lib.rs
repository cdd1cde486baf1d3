//! Device registry and telemetry simulator for municipal parking infrastructure
//!
//! This crate provides the core functionality for:
//! - Device and sensor registration with geo lookup
//! - Periodic reading synthesis with bounded history
//! - Threshold and rolling z-score screening
//! - Per-device health checks
//! - Alert dispatch and a hash-chained event ledger
//! - Prometheus metrics and structured logging

pub mod anomaly;
pub mod error;
pub mod events;
pub mod health;
pub mod ledger;
pub mod models;
pub mod observability;
pub mod registry;
pub mod service;
pub mod simulator;

pub use anomaly::{AlertDispatcher, Severity};
pub use error::RegistryError;
pub use events::{EventBus, TelemetryEvent};
pub use health::{
    ComponentHealth, ComponentStatus, HealthMonitor, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use ledger::{InMemoryLedger, Ledger, LedgerReceipt};
pub use models::*;
pub use observability::{StructuredLogger, TelemetryMetrics};
pub use registry::{DeviceFilter, DeviceRegistry};
pub use service::DeviceService;
pub use simulator::{PollLoop, PollLoopBuilder, RandomReadingSource, ReadingSource};
