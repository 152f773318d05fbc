use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::AppConfig;
use crate::stream::SessionRegistry;
use crate::telemetry::{HostSampler, TelemetryError, TelemetrySource};

/// Opens a fresh telemetry source for each new session.
pub type SourceFactory =
    Arc<dyn Fn() -> Result<Box<dyn TelemetrySource>, TelemetryError> + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: SessionRegistry,
    pub sources: SourceFactory,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, registry: SessionRegistry, sources: SourceFactory) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            sources,
            started_at: Utc::now(),
        }
    }

    /// State whose sessions sample the local host.
    pub fn with_host_sources(config: AppConfig, registry: SessionRegistry) -> Self {
        let sources: SourceFactory =
            Arc::new(|| Ok(Box::new(HostSampler::new()) as Box<dyn TelemetrySource>));
        Self::new(config, registry, sources)
    }
}
