//! Observability module for centralized metrics, tracing, and logging setup.
//!
//! This module provides:
//! - Metrics collection and Prometheus export
//! - Distributed tracing with OpenTelemetry
//! - Structured logging with configurable levels
//! - Health check endpoints for monitoring
//! - Environment-specific configuration support

use std::time::Instant;

use anyhow::Result;
use opentelemetry_sdk::trace::SdkTracerProvider;

use crate::config::ServerConfig;
use crate::observability_config::ObservabilityConfig;

pub mod health_checks;
pub mod metrics;
pub mod system_monitoring;
pub mod tracing_mod;

pub use health_checks::{
    check_bot_token_health, check_download_root_health, check_ytdlp_health,
    start_health_metrics_recorder, ReadinessProbe,
};
pub use metrics::{
    init_metrics_with_config, record_active_downloads, record_download_metrics,
    record_error_metrics, record_health_check_metrics, record_request_metrics,
    record_startup_metrics, record_telegram_duplicate_message, record_telegram_message,
    record_telegram_performance_metrics, record_upload_metrics, record_uptime, route_request,
    start_metrics_server, update_circuit_breaker_state, DownloadMetricsParams,
    MetricsServerContext, RateLimiter,
};
pub use system_monitoring::{record_memory_usage, record_system_resources, start_system_metrics_recorder};
pub use tracing_mod::{
    download_span, init_opentelemetry_tracing_with_config, init_tracing_with_config, telegram_span,
};

/// Handles owned by the running observability stack
#[derive(Default)]
pub struct ObservabilityGuard {
    tracer_provider: Option<SdkTracerProvider>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl ObservabilityGuard {
    /// Stop background recorders and flush pending spans
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }

        if let Some(provider) = self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "Failed to flush OpenTelemetry spans");
            }
        }

        tracing::info!("Observability stack shut down");
    }
}

impl std::fmt::Debug for ObservabilityGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservabilityGuard")
            .field("tracing_exporter", &self.tracer_provider.is_some())
            .field("background_tasks", &self.tasks.len())
            .finish()
    }
}

/// Initialize logging only; used before the full configuration is known to be valid
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    init_tracing_with_config(config)
}

/// Initialize metrics, OpenTelemetry and the metrics server
///
/// Logging must already be set up with [`init_logging`].
pub async fn init_observability(
    config: &ObservabilityConfig,
    server: &ServerConfig,
    readiness: ReadinessProbe,
) -> Result<ObservabilityGuard> {
    let started_at = Instant::now();

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    let tracer_provider = init_opentelemetry_tracing_with_config(config)?;
    let mut guard = ObservabilityGuard {
        tracer_provider,
        tasks: Vec::new(),
    };

    if config.enable_metrics_export {
        let metrics_handle = init_metrics_with_config(config)?;
        let ctx = MetricsServerContext::new(
            metrics_handle,
            config.metrics_auth_token.clone(),
            readiness.clone(),
        );
        let server_task =
            start_metrics_server(ctx, server.metrics_port, server.metrics_bind_all_interfaces).await?;
        guard.tasks.push(server_task);
        guard.tasks.push(start_health_metrics_recorder(readiness));
        guard.tasks.push(start_system_metrics_recorder(started_at));
    } else {
        tracing::info!("Metrics export disabled; metrics server not started");
    }

    tracing::info!(
        environment = %config.environment,
        otlp_endpoint = ?config.otlp_endpoint,
        metrics_port = %server.metrics_port,
        metrics_enabled = %config.enable_metrics_export,
        "Observability stack initialized successfully"
    );
    Ok(guard)
}
