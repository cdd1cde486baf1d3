//! Telemetry daemon - simulated IoT device layer for municipal parking
//!
//! Registers devices, synthesizes their readings on a fixed cadence,
//! runs per-device health checks and serves the registry over HTTP.

use anyhow::{Context, Result};
use std::sync::Arc;
use telemetry_lib::{
    anomaly::AlertDispatcher,
    events::EventBus,
    health::{components, HealthMonitor, HealthRegistry, RandomHealthProbe},
    ledger::InMemoryLedger,
    observability::{StructuredLogger, TelemetryMetrics},
    registry::DeviceRegistry,
    service::DeviceService,
    simulator::{PollLoopBuilder, RandomReadingSource},
};
use telemetryd::{api, config, supervisor::supervise};
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DAEMON_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting telemetryd");

    // Load configuration
    let config = config::TelemetryConfig::load()?;
    info!(
        instance = %config.instance_name,
        poll_interval_secs = config.poll_interval_secs,
        health_check_interval_secs = config.health_check_interval_secs,
        "Daemon configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::SIMULATOR).await;
    health_registry.register(components::HEALTH_MONITOR).await;
    health_registry.register(components::DISPATCHER).await;

    // Initialize metrics and structured logger
    let metrics = TelemetryMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    let bus = EventBus::default();
    let registry = Arc::new(DeviceRegistry::with_history_capacity(
        config.history_capacity,
    ));
    let monitor = HealthMonitor::new(registry.clone(), bus.clone())
        .with_probe(Arc::new(RandomHealthProbe::new(config.probe_success_rate)))
        .with_interval(config.health_check_interval());
    let service = Arc::new(DeviceService::new(
        registry.clone(),
        monitor,
        logger.clone(),
    ));

    if let Some(path) = &config.seed_file {
        let specs = config::load_seed_file(path)?;
        info!(path = %path.display(), devices = specs.len(), "Seeding registry");
        for spec in specs {
            service.register(spec);
        }
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Alert dispatch
    let ledger = Arc::new(InMemoryLedger::with_retention(config.ledger_retention));
    let dispatcher = Arc::new(
        AlertDispatcher::new(ledger, logger.clone())
            .with_dedup_window(config.dedup_window())
            .with_health(health_registry.clone()),
    );
    let dispatcher_task = {
        let events = bus.subscribe();
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move { dispatcher.run(events, shutdown).await })
    };
    let dispatcher_handle = tokio::spawn(supervise(
        health_registry.clone(),
        components::DISPATCHER,
        dispatcher_task,
        shutdown_tx.subscribe(),
    ));

    // Reading synthesis
    let poll_loop = PollLoopBuilder::new()
        .registry(registry.clone())
        .bus(bus.clone())
        .source(Arc::new(RandomReadingSource::new(config.noise_ratio)))
        .interval(config.poll_interval())
        .build()
        .context("Failed to build poll loop")?;
    let poll_task = tokio::spawn(poll_loop.run(shutdown_tx.subscribe()));
    let poll_handle = tokio::spawn(supervise(
        health_registry.clone(),
        components::SIMULATOR,
        poll_task,
        shutdown_tx.subscribe(),
    ));

    metrics.set_devices(registry.len() as i64, registry.online_count() as i64);

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        service.clone(),
    ));

    // Mark daemon as ready after initialization
    health_registry.set_ready(true).await;
    logger.log_startup(DAEMON_VERSION, registry.len());

    // Start API server
    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal or an API failure
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = &mut api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    logger.log_shutdown("API server failed");
                }
                Err(e) => {
                    error!(error = %e, "API server task panicked");
                    logger.log_shutdown("API server task panicked");
                }
            }
        }
    }

    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());
    service.shutdown();
    api_handle.abort();

    if let Err(e) = poll_handle.await {
        error!(error = %e, "Poll loop supervisor failed");
    }
    if let Err(e) = dispatcher_handle.await {
        error!(error = %e, "Alert dispatcher supervisor failed");
    }

    info!("Shutdown complete");
    Ok(())
}
