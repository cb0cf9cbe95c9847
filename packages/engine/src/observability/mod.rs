// packages/engine/src/observability/mod.rs
//! Logging and metrics setup
//!
//! Library code only emits through `tracing` and `metrics` macros; without
//! an installed subscriber/recorder those are no-ops, so tests and embedders
//! pay nothing unless the binary calls the `init_*` functions.

use crate::utils::config::{LoggingConfig, MetricsConfig};
use crate::utils::errors::{EngineError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Metric names
pub mod names {
    pub const ATTACH_TOTAL: &str = "sensorguard_attach_total";
    pub const DETACH_TOTAL: &str = "sensorguard_detach_total";
    pub const PROXIES_CREATED: &str = "sensorguard_proxies_created_total";
    pub const PROXIES_EVICTED: &str = "sensorguard_proxies_evicted_total";
    pub const LIVE_PROXIES: &str = "sensorguard_live_proxies";
    pub const EVENTS_DELIVERED: &str = "sensorguard_events_delivered_total";
    pub const TRANSFORM_FAILURES: &str = "sensorguard_transform_failures_total";
    pub const CALIBRATIONS: &str = "sensorguard_calibrations_total";
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| EngineError::ObservabilityError(format!("Invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };

    result.map_err(|e| EngineError::ObservabilityError(e.to_string()))
}

/// Install the Prometheus exporter when enabled
///
/// Must be called from within a Tokio runtime: the exporter serves its
/// scrape endpoint on a background task.
pub fn init_metrics(config: &MetricsConfig) -> Result<bool> {
    if !config.enabled {
        return Ok(false);
    }

    let addr: SocketAddr = config.listen_addr.parse().map_err(|e| {
        EngineError::ConfigError(format!(
            "Invalid metrics listen address {}: {}",
            config.listen_addr, e
        ))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| EngineError::ObservabilityError(e.to_string()))?;

    info!("Prometheus exporter listening on {}", addr);
    Ok(true)
}
