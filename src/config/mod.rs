// src/config/mod.rs
pub mod settings;

pub use settings::{
    ConfigError, ElasticSettings, IngestConfig, NotificationSettings, QueueSettings,
    SearchBackend, SearchSource, Settings, SmtpSettings, SpecialsConfig, TrackerConfig,
    TransmitterConfig,
};
