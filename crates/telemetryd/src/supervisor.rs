//! Background task supervision
//!
//! A task that stops before shutdown is signalled leaves its component
//! unhealthy, so `/healthz` and `/readyz` report it.

use telemetry_lib::health::HealthRegistry;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::error;

/// Wait for `task` to finish, marking `component` unhealthy if it ends
/// before a shutdown signal arrives
pub async fn supervise(
    health: HealthRegistry,
    component: &'static str,
    mut task: JoinHandle<()>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tokio::select! {
        biased;

        _ = shutdown.recv() => {
            if let Err(e) = task.await {
                error!(component, error = %e, "Background task failed during shutdown");
            }
        }
        result = &mut task => {
            let reason = match result {
                Ok(()) => "Task exited before shutdown".to_string(),
                Err(e) if e.is_panic() => "Task panicked".to_string(),
                Err(e) => format!("Task failed: {}", e),
            };
            error!(component, reason = %reason, "Background task stopped");
            health.set_unhealthy(component, reason).await;
        }
    }
}
