// src/telemetry.rs
//! Logging and metrics setup shared by the binaries.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const ENV_LOG_FORMAT: &str = "SPECIAL_FINDER_LOG_FORMAT";

/// Install the global subscriber. `RUST_LOG` wins over the configured level;
/// `SPECIAL_FINDER_LOG_FORMAT=json` switches to JSON lines.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.trim().to_ascii_lowercase()));
    let json = std::env::var(ENV_LOG_FORMAT)
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    // try_init: a second call (tests, re-entry) keeps the first subscriber.
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

/// Expose Prometheus metrics on `listen`. Without an address the `metrics`
/// macros stay no-ops.
pub fn init_metrics(listen: Option<SocketAddr>) {
    let Some(addr) = listen else {
        return;
    };
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(%addr, "metrics listener started"),
        Err(e) => tracing::warn!(%addr, error = %e, "metrics listener not started"),
    }
}
