// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod config;
pub mod model;
pub mod telemetry;

// Storage and index seams
pub mod index;
pub mod store;

// Ingestion consumer and batch jobs
pub mod ingest;
pub mod specials;
pub mod tracker;
pub mod transmit;

pub mod notify;

// ---- Re-exports for stable public API ----
pub use crate::config::Settings;
pub use crate::ingest::Dumper;
pub use crate::notify::NotifierMux;
pub use crate::specials::SpecialFinder;
pub use crate::tracker::LowestPriceTracker;

/// Load settings and start logging/metrics. Call first thing in every binary.
///
/// The configured log level is only known after loading, so a config error
/// is reported through a fallback `error`-level subscriber.
pub fn bootstrap() -> anyhow::Result<Settings> {
    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            telemetry::init_logging("error");
            tracing::error!(error = %e, "incomplete configuration");
            return Err(e.into());
        }
    };
    telemetry::init_logging(&settings.log_level);
    telemetry::init_metrics(settings.metrics.as_ref().map(|m| m.listen));
    Ok(settings)
}
